//! Microsoft Graph mail client (`/v1.0/me/messages`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::MailError;
use crate::mail::{FetchedMail, MailAttachment, MailProvider};

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0/me";
const PROVIDER_NAME: &str = "microsoft";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    value: Vec<MessageRef>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    to_recipients: Vec<Recipient>,
    #[serde(default)]
    body: Option<ItemBody>,
    received_date_time: DateTime<Utc>,
    #[serde(default)]
    has_attachments: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentList {
    #[serde(default)]
    value: Vec<GraphAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    #[serde(default)]
    name: String,
    #[serde(default)]
    content_type: String,
    /// Already standard base64 for file attachments.
    #[serde(default)]
    content_bytes: Option<String>,
}

/// Graph client authenticated per call with a bearer access token.
pub struct OutlookProvider {
    http: reqwest::Client,
    base_url: String,
}

impl OutlookProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &SecretString,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MailError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token.expose_secret())
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MailError::AuthFailed {
                provider: PROVIDER_NAME.into(),
                reason: "access token rejected".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Http(format!("{url}: HTTP {status}: {body}")));
        }

        Ok(resp.json::<T>().await?)
    }

    async fn fetch_pdf_attachments(
        &self,
        access_token: &SecretString,
        message_id: &str,
    ) -> Result<Vec<MailAttachment>, MailError> {
        let url = format!("{}/messages/{message_id}/attachments", self.base_url);
        let list: AttachmentList = self.get_json(access_token, &url, &[]).await?;
        Ok(pdf_attachments(list))
    }
}

#[async_trait]
impl MailProvider for OutlookProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_message_ids(
        &self,
        access_token: &SecretString,
        start_date: DateTime<Utc>,
        senders: &[String],
    ) -> Result<Vec<String>, MailError> {
        let filter = build_filter(start_date, senders);
        let first_url = format!("{}/messages", self.base_url);
        let mut ids = Vec::new();

        let first_query = [("$filter", filter.as_str()), ("$top", PAGE_SIZE), ("$select", "id")];
        let mut page: ListResponse = self
            .get_json(access_token, &first_url, &first_query)
            .await
            .map_err(search_error)?;

        loop {
            ids.extend(page.value.into_iter().map(|m| m.id));
            let Some(next) = page.next_link.filter(|l| !l.is_empty()) else {
                break;
            };
            // nextLink carries the full query string.
            page = self
                .get_json(access_token, &next, &[])
                .await
                .map_err(search_error)?;
        }

        debug!(filter = %filter, count = ids.len(), "Graph search complete");
        Ok(ids)
    }

    async fn fetch_message(
        &self,
        access_token: &SecretString,
        message_id: &str,
    ) -> Result<FetchedMail, MailError> {
        let url = format!("{}/messages/{message_id}", self.base_url);
        let msg: GraphMessage = self
            .get_json(access_token, &url, &[])
            .await
            .map_err(|e| MailError::Fetch {
                message_id: message_id.to_string(),
                reason: e.to_string(),
            })?;

        let has_attachments = msg.has_attachments;
        let mut fetched = message_to_fetched(msg);

        if has_attachments {
            match self.fetch_pdf_attachments(access_token, message_id).await {
                Ok(attachments) => fetched.attachments = attachments,
                Err(e) => warn!(message_id, error = %e, "Failed to fetch attachments"),
            }
        }

        Ok(fetched)
    }
}

fn search_error(e: MailError) -> MailError {
    match e {
        MailError::AuthFailed { .. } => e,
        other => MailError::SearchFailed {
            provider: PROVIDER_NAME.into(),
            reason: other.to_string(),
        },
    }
}

/// OData filter: any of the senders, received on or after `start_date`.
fn build_filter(start_date: DateTime<Utc>, senders: &[String]) -> String {
    let from = senders
        .iter()
        .map(|s| format!("from/emailAddress/address eq '{}'", s.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(" or ");
    format!(
        "({from}) and receivedDateTime ge {}",
        start_date.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn format_address(r: &Recipient) -> String {
    let address = r.email_address.address.clone().unwrap_or_default();
    match r.email_address.name.as_deref() {
        Some(name) if !name.is_empty() && name != address => format!("{name} <{address}>"),
        _ => address,
    }
}

fn message_to_fetched(msg: GraphMessage) -> FetchedMail {
    FetchedMail {
        external_id: msg.id,
        from: msg.from.as_ref().map(format_address).unwrap_or_default(),
        to: msg
            .to_recipients
            .iter()
            .map(format_address)
            .collect::<Vec<_>>()
            .join(", "),
        subject: msg.subject.unwrap_or_default(),
        body: msg.body.map(|b| b.content).unwrap_or_default(),
        received_at: msg.received_date_time,
        attachments: Vec::new(),
    }
}

fn pdf_attachments(list: AttachmentList) -> Vec<MailAttachment> {
    list.value
        .into_iter()
        .filter(|a| a.content_type.to_ascii_lowercase().starts_with("application/pdf"))
        .filter_map(|a| {
            let content = a.content_bytes?;
            Some(MailAttachment {
                name: a.name,
                content_type: a.content_type,
                content,
            })
        })
        .collect()
}
