//! Mail gateway: provider dispatch, token refresh, and bounded message fetching.
//!
//! Flow per credential:
//! 1. `TokenSource::valid_tokens()`: refresh if close to expiry (failure aborts)
//! 2. `MailProvider::list_message_ids()`: sender/date filtered search (failure aborts)
//! 3. `MailProvider::fetch_message()` per id, concurrently: failures are collected

pub mod gmail;
pub mod headers;
pub mod outlook;
pub mod token;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MailError;
use crate::ids::IdGenerator;

pub use gmail::GmailProvider;
pub use outlook::OutlookProvider;
pub use token::{OAuthTokenSource, TokenSource, Tokens};

// ── Messages ────────────────────────────────────────────────────────

/// A file attached to a mail message. `content` is standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAttachment {
    pub name: String,
    pub content_type: String,
    pub content: String,
}

/// A normalized mail message. Never mutated after it is fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Internal identifier assigned at fetch time.
    pub id: Uuid,
    /// Provider-native message id.
    pub external_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Raw body, HTML or plain text.
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub attachments: Vec<MailAttachment>,
}

/// A message as returned by a provider, before it gets an internal id.
#[derive(Debug, Clone)]
pub struct FetchedMail {
    pub external_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub attachments: Vec<MailAttachment>,
}

impl FetchedMail {
    pub fn into_message(self, id: Uuid) -> MailMessage {
        MailMessage {
            id,
            external_id: self.external_id,
            from: self.from,
            to: self.to,
            subject: self.subject,
            body: self.body,
            received_at: self.received_at,
            attachments: self.attachments,
        }
    }
}

/// A single message that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub message_id: String,
    pub reason: String,
}

/// Result of a search: everything that was fetched plus everything that wasn't.
#[derive(Debug, Clone, Default)]
pub struct MailSearch {
    pub messages: Vec<MailMessage>,
    pub failures: Vec<FetchFailure>,
}

/// Search outcome together with the tokens that were actually used.
#[derive(Debug, Clone)]
pub struct GatewaySearch {
    pub search: MailSearch,
    pub tokens: Tokens,
    /// True when the tokens were refreshed and should be written back.
    pub refreshed: bool,
}

// ── Provider trait ──────────────────────────────────────────────────

/// A provider-specific mail client.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Provider name, e.g. "google" or "microsoft".
    fn name(&self) -> &str;

    /// Ids of messages received on/after `start_date` from any of `senders`,
    /// spam and trash included.
    async fn list_message_ids(
        &self,
        access_token: &SecretString,
        start_date: DateTime<Utc>,
        senders: &[String],
    ) -> Result<Vec<String>, MailError>;

    /// Full message: headers, body, and attachments.
    async fn fetch_message(
        &self,
        access_token: &SecretString,
        message_id: &str,
    ) -> Result<FetchedMail, MailError>;
}

struct ProviderEntry {
    client: Arc<dyn MailProvider>,
    tokens: Arc<dyn TokenSource>,
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Dispatches searches to the provider registered under a name.
pub struct MailGateway {
    providers: HashMap<String, ProviderEntry>,
    ids: Arc<dyn IdGenerator>,
    fetch_concurrency: usize,
}

impl MailGateway {
    pub fn new(ids: Arc<dyn IdGenerator>, fetch_concurrency: usize) -> Self {
        Self {
            providers: HashMap::new(),
            ids,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Register a provider under its own name, replacing any previous one.
    pub fn register(&mut self, client: Arc<dyn MailProvider>, tokens: Arc<dyn TokenSource>) {
        let name = client.name().to_string();
        info!(provider = %name, "Registered mail provider");
        self.providers.insert(name, ProviderEntry { client, tokens });
    }

    pub fn supports(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Search `provider` for messages from `senders` since `start_date`.
    ///
    /// Token refresh and listing failures abort the search; individual message
    /// fetch failures are returned in `MailSearch::failures`.
    pub async fn search_from_date_and_senders(
        &self,
        provider: &str,
        tokens: &Tokens,
        start_date: DateTime<Utc>,
        senders: &[String],
    ) -> Result<GatewaySearch, MailError> {
        let entry = self
            .providers
            .get(provider)
            .ok_or_else(|| MailError::UnsupportedProvider(provider.to_string()))?;

        let valid = entry.tokens.valid_tokens(tokens).await?;
        let refreshed = valid.expires_at != tokens.expires_at;

        let ids = entry
            .client
            .list_message_ids(&valid.access_token, start_date, senders)
            .await?;

        debug!(provider, count = ids.len(), "Listed matching messages");

        let access_token = &valid.access_token;
        let client = &entry.client;
        let results: Vec<(String, Result<FetchedMail, MailError>)> = stream::iter(ids)
            .map(|id| async move {
                let result = client.fetch_message(access_token, &id).await;
                (id, result)
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await;

        let mut search = MailSearch::default();
        for (id, result) in results {
            match result {
                Ok(fetched) => {
                    if fetched.received_at < start_date {
                        debug!(provider, message_id = %id, "Skipping message older than start date");
                        continue;
                    }
                    search.messages.push(fetched.into_message(self.ids.new_id()));
                }
                Err(e) => {
                    warn!(provider, message_id = %id, error = %e, "Failed to fetch message");
                    search.failures.push(FetchFailure {
                        message_id: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(GatewaySearch {
            search,
            tokens: valid,
            refreshed,
        })
    }
}


#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::testing::*;
    use super::*;
    use crate::ids::UuidV7Generator;

    fn gateway(provider: FakeProvider, tokens: FakeTokenSource) -> MailGateway {
        let mut gw = MailGateway::new(Arc::new(UuidV7Generator), 4);
        gw.register(Arc::new(provider), Arc::new(tokens));
        gw
    }

    fn senders() -> Vec<String> {
        vec!["nu@nu.com.co".to_string()]
    }

    #[tokio::test]
    async fn unknown_provider_is_unsupported() {
        let gw = MailGateway::new(Arc::new(UuidV7Generator), 4);
        let err = gw
            .search_from_date_and_senders("yahoo", &tokens("a"), Utc::now(), &senders())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::UnsupportedProvider(p) if p == "yahoo"));
    }

    #[tokio::test]
    async fn fetches_matching_messages_and_assigns_ids() {
        let provider = FakeProvider::new(
            "google",
            vec![
                fetched("m1", "Nu <nu@nu.com.co>", "a", "body"),
                fetched("m2", "other@bank.co", "b", "body"),
                fetched("m3", "nu@nu.com.co", "c", "body"),
            ],
        );
        let gw = gateway(provider, FakeTokenSource::Passthrough);
        let start = Utc::now() - chrono::Duration::days(1);

        let result = gw
            .search_from_date_and_senders("google", &tokens("a"), start, &senders())
            .await
            .unwrap();

        let ext: Vec<_> = result.search.messages.iter().map(|m| m.external_id.as_str()).collect();
        assert_eq!(ext, vec!["m1", "m3"]);
        assert_ne!(result.search.messages[0].id, result.search.messages[1].id);
        assert!(result.search.failures.is_empty());
        assert!(!result.refreshed);
    }

    #[tokio::test]
    async fn single_fetch_failure_does_not_abort_siblings() {
        let mut provider = FakeProvider::new(
            "google",
            vec![
                fetched("m1", "nu@nu.com.co", "a", "body"),
                fetched("m2", "nu@nu.com.co", "b", "body"),
            ],
        );
        provider.failing_ids = vec!["m1".to_string()];
        let gw = gateway(provider, FakeTokenSource::Passthrough);

        let result = gw
            .search_from_date_and_senders(
                "google",
                &tokens("a"),
                Utc::now() - chrono::Duration::days(1),
                &senders(),
            )
            .await
            .unwrap();

        assert_eq!(result.search.messages.len(), 1);
        assert_eq!(result.search.messages[0].external_id, "m2");
        assert_eq!(result.search.failures.len(), 1);
        assert_eq!(result.search.failures[0].message_id, "m1");
    }

    #[tokio::test]
    async fn refresh_failure_aborts_search() {
        let provider = FakeProvider::new("google", vec![fetched("m1", "nu@nu.com.co", "a", "b")]);
        let gw = gateway(provider, FakeTokenSource::Fail);

        let err = gw
            .search_from_date_and_senders("google", &tokens("a"), Utc::now(), &senders())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::AuthFailed { .. }));
    }

    #[tokio::test]
    async fn refreshed_token_is_used_and_reported() {
        let provider = Arc::new(FakeProvider::new("google", vec![]));
        let mut gw = MailGateway::new(Arc::new(UuidV7Generator), 4);
        gw.register(provider.clone(), Arc::new(FakeTokenSource::Refresh("fresh".into())));

        let result = gw
            .search_from_date_and_senders("google", &tokens("stale"), Utc::now(), &senders())
            .await
            .unwrap();

        assert!(result.refreshed);
        assert_eq!(result.tokens.access_token.expose_secret(), "fresh");
        assert_eq!(provider.seen_tokens.lock().unwrap().as_slice(), ["fresh".to_string()]);
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let mut provider = FakeProvider::new("google", vec![]);
        provider.fail_listing = true;
        let gw = gateway(provider, FakeTokenSource::Passthrough);

        let err = gw
            .search_from_date_and_senders("google", &tokens("a"), Utc::now(), &senders())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::SearchFailed { .. }));
    }

    #[tokio::test]
    async fn drops_messages_older_than_start() {
        let mut old = fetched("m1", "nu@nu.com.co", "a", "b");
        old.received_at = Utc::now() - chrono::Duration::days(10);
        let provider = FakeProvider::new("google", vec![old]);
        let gw = gateway(provider, FakeTokenSource::Passthrough);

        let result = gw
            .search_from_date_and_senders(
                "google",
                &tokens("a"),
                Utc::now() - chrono::Duration::days(1),
                &senders(),
            )
            .await
            .unwrap();
        assert!(result.search.messages.is_empty());
    }
}
