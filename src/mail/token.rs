//! OAuth token source: hands out access tokens that are not about to expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::OAuthClientConfig;
use crate::error::MailError;

/// Tokens are refreshed when they expire within this window.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Plaintext OAuth tokens for one mail credential.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// True if the access token is expired or will be within the skew window.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) <= now
    }
}

/// Supplies currently valid tokens, refreshing transparently when needed.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn valid_tokens(&self, tokens: &Tokens) -> Result<Tokens, MailError>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Standard `refresh_token` grant against a provider's token endpoint.
pub struct OAuthTokenSource {
    provider: String,
    config: OAuthClientConfig,
    http: reqwest::Client,
}

impl OAuthTokenSource {
    pub fn new(provider: impl Into<String>, config: OAuthClientConfig, http: reqwest::Client) -> Self {
        Self {
            provider: provider.into(),
            config,
            http,
        }
    }

    fn auth_error(&self, reason: impl Into<String>) -> MailError {
        MailError::AuthFailed {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }

    async fn refresh(&self, tokens: &Tokens) -> Result<Tokens, MailError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh_token.expose_secret()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.auth_error(format!("token request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.auth_error(format!("token response unreadable: {e}")))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<OAuthErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {desc}", e.error),
                    None => e.error,
                })
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(self.auth_error(reason));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| self.auth_error(format!("invalid token response: {e}")))?;

        Ok(apply_refresh(tokens, parsed, Utc::now()))
    }
}

fn apply_refresh(previous: &Tokens, resp: RefreshResponse, now: DateTime<Utc>) -> Tokens {
    Tokens {
        access_token: SecretString::from(resp.access_token),
        refresh_token: resp
            .refresh_token
            .map(SecretString::from)
            .unwrap_or_else(|| previous.refresh_token.clone()),
        expires_at: now + Duration::seconds(resp.expires_in.unwrap_or(3600)),
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn valid_tokens(&self, tokens: &Tokens) -> Result<Tokens, MailError> {
        if !tokens.needs_refresh(Utc::now()) {
            debug!(provider = %self.provider, "Access token still valid");
            return Ok(tokens.clone());
        }

        if tokens.refresh_token.expose_secret().is_empty() {
            return Err(self.auth_error("access token expired and no refresh token stored"));
        }

        let fresh = self.refresh(tokens).await?;
        info!(provider = %self.provider, expires_at = %fresh.expires_at, "Refreshed access token");
        Ok(fresh)
    }
}
