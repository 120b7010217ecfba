//! Gmail REST client (`gmail/v1`).

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::MailError;
use crate::mail::headers::{header_value, parse_date_header};
use crate::mail::{FetchedMail, MailAttachment, MailProvider};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const PROVIDER_NAME: &str = "google";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    data: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail client authenticated per call with a bearer access token.
pub struct GmailProvider {
    http: reqwest::Client,
    base_url: String,
}

impl GmailProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, tests).
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

    async fn fetch_attachment(
        &self,
        access_token: &SecretString,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<String, MailError> {
        let url = format!("{}/messages/{message_id}/attachments/{attachment_id}", self.base_url);
        let resp: AttachmentResponse = self.get_json(access_token, &url, &[]).await?;
        reencode_standard(&resp.data)
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_message_ids(
        &self,
        access_token: &SecretString,
        start_date: DateTime<Utc>,
        senders: &[String],
    ) -> Result<Vec<String>, MailError> {
        let query = build_search_query(start_date, senders);
        let url = format!("{}/messages", self.base_url);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query.as_str()), ("includeSpamTrash", "true")];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.as_str()));
            }

            let page: ListResponse = self
                .get_json(access_token, &url, &params)
                .await
                .map_err(|e| match e {
                    MailError::AuthFailed { .. } => e,
                    other => MailError::SearchFailed {
                        provider: PROVIDER_NAME.into(),
                        reason: other.to_string(),
                    },
                })?;

            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(query = %query, count = ids.len(), "Gmail search complete");
        Ok(ids)
    }

    async fn fetch_message(
        &self,
        access_token: &SecretString,
        message_id: &str,
    ) -> Result<FetchedMail, MailError> {
        let url = format!("{}/messages/{message_id}", self.base_url);
        let msg: GmailMessage = self
            .get_json(access_token, &url, &[("format", "full")])
            .await
            .map_err(|e| MailError::Fetch {
                message_id: message_id.to_string(),
                reason: e.to_string(),
            })?;

        let mut fetched = message_to_fetched(&msg).map_err(|e| MailError::Fetch {
            message_id: message_id.to_string(),
            reason: e.to_string(),
        })?;

        let payload = msg.payload.unwrap_or_default();
        for (name, content_type, attachment_id) in pdf_attachment_refs(&payload) {
            match self.fetch_attachment(access_token, message_id, &attachment_id).await {
                Ok(content) => fetched.attachments.push(MailAttachment {
                    name,
                    content_type,
                    content,
                }),
                Err(e) => {
                    warn!(message_id, attachment = %name, error = %e, "Failed to fetch attachment");
                }
            }
        }

        Ok(fetched)
    }
}

// ── Pure helpers ────────────────────────────────────────────────────

/// `after:<unix-seconds> {from:a from:b}`; braces are Gmail's OR group.
fn build_search_query(start_date: DateTime<Utc>, senders: &[String]) -> String {
    // `after:` is exclusive; step back one second so `start_date` itself matches.
    let after = start_date.timestamp() - 1;
    let from = senders
        .iter()
        .map(|s| format!("from:{s}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("after:{after} {{{from}}}")
}

fn message_to_fetched(msg: &GmailMessage) -> Result<FetchedMail, MailError> {
    let empty = MessagePart::default();
    let payload = msg.payload.as_ref().unwrap_or(&empty);
    let headers = || payload.headers.iter().map(|h| (h.name.as_str(), h.value.as_str()));

    let date = header_value(headers(), "Date");
    let received_at = parse_date_header(&date)?;

    let body = find_body(payload, "text/html")
        .or_else(|| find_body(payload, "text/plain"))
        .or_else(|| payload.body.as_ref().and_then(|b| b.data.as_deref()).map(str::to_string))
        .map(|data| decode_body(&data))
        .transpose()?
        .unwrap_or_default();

    let attachments = inline_pdf_attachments(payload)?;

    Ok(FetchedMail {
        external_id: msg.id.clone(),
        from: header_value(headers(), "From"),
        to: header_value(headers(), "To"),
        subject: header_value(headers(), "Subject"),
        body,
        received_at,
        attachments,
    })
}

/// Depth-first search for the first part of `mime_type` with inline data.
fn find_body(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case(mime_type) && part.filename.is_empty() {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            return Some(data.clone());
        }
    }
    part.parts.iter().find_map(|p| find_body(p, mime_type))
}

fn walk_parts<'a>(part: &'a MessagePart, out: &mut Vec<&'a MessagePart>) {
    out.push(part);
    for child in &part.parts {
        walk_parts(child, out);
    }
}

fn is_pdf(part: &MessagePart) -> bool {
    !part.filename.is_empty() && part.mime_type.to_ascii_lowercase().starts_with("application/pdf")
}

fn inline_pdf_attachments(payload: &MessagePart) -> Result<Vec<MailAttachment>, MailError> {
    let mut parts = Vec::new();
    walk_parts(payload, &mut parts);
    parts
        .into_iter()
        .filter(|p| is_pdf(p))
        .filter_map(|p| {
            let data = p.body.as_ref()?.data.as_ref()?;
            Some((p, data))
        })
        .map(|(p, data)| {
            Ok(MailAttachment {
                name: p.filename.clone(),
                content_type: p.mime_type.clone(),
                content: reencode_standard(data)?,
            })
        })
        .collect()
}

/// PDF parts whose content must be fetched separately: (name, content type, attachment id).
fn pdf_attachment_refs(payload: &MessagePart) -> Vec<(String, String, String)> {
    let mut parts = Vec::new();
    walk_parts(payload, &mut parts);
    parts
        .into_iter()
        .filter(|p| is_pdf(p))
        .filter_map(|p| {
            let body = p.body.as_ref()?;
            if body.data.is_some() {
                return None;
            }
            let id = body.attachment_id.clone()?;
            Some((p.filename.clone(), p.mime_type.clone(), id))
        })
        .collect()
}

fn decode_base64url(data: &str) -> Result<Vec<u8>, MailError> {
    let trimmed = data.trim();
    URL_SAFE
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .map_err(|e| MailError::Http(format!("invalid base64url body: {e}")))
}

fn decode_body(data: &str) -> Result<String, MailError> {
    let bytes = decode_base64url(data)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn reencode_standard(data: &str) -> Result<String, MailError> {
    Ok(STANDARD.encode(decode_base64url(data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn b64url(s: &str) -> String {
        URL_SAFE.encode(s.as_bytes())
    }

    fn sample_message() -> GmailMessage {
        let json = serde_json::json!({
            "id": "18d4f0a",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "From", "value": "Nu Colombia <nu@nu.com.co>"},
                    {"name": "to", "value": "jhon.doe@gmail.com"},
                    {"name": "SUBJECT", "value": "El dinero que enviaste ya está del otro lado"},
                    {"name": "Date", "value": "Wed, 29 Jan 2025 15:20:41 -0500 (COT)"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": b64url("plain body")}},
                            {"mimeType": "text/html", "body": {"data": b64url("<p>html body</p>")}}
                        ]
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "extracto.pdf",
                        "body": {"data": b64url("%PDF-1.4")}
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "grande.pdf",
                        "body": {"attachmentId": "att-1"}
                    }
                ]
            }
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn query_ors_senders_and_includes_start() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let q = build_search_query(start, &["nu@nu.com.co".into(), "alertas@bank.co".into()]);
        assert_eq!(
            q,
            format!("after:{} {{from:nu@nu.com.co from:alertas@bank.co}}", start.timestamp() - 1)
        );
    }

    #[test]
    fn converts_full_message() {
        let fetched = message_to_fetched(&sample_message()).unwrap();
        assert_eq!(fetched.external_id, "18d4f0a");
        assert_eq!(fetched.from, "Nu Colombia <nu@nu.com.co>");
        assert_eq!(fetched.to, "jhon.doe@gmail.com");
        assert_eq!(fetched.subject, "El dinero que enviaste ya está del otro lado");
        assert_eq!(fetched.body, "<p>html body</p>");
        assert_eq!(
            fetched.received_at,
            Utc.with_ymd_and_hms(2025, 1, 29, 20, 20, 41).unwrap()
        );
    }

    #[test]
    fn collects_inline_pdf_and_defers_remote_pdf() {
        let msg = sample_message();
        let fetched = message_to_fetched(&msg).unwrap();
        assert_eq!(fetched.attachments.len(), 1);
        assert_eq!(fetched.attachments[0].name, "extracto.pdf");
        assert_eq!(fetched.attachments[0].content, STANDARD.encode("%PDF-1.4"));

        let refs = pdf_attachment_refs(msg.payload.as_ref().unwrap());
        assert_eq!(
            refs,
            vec![("grande.pdf".to_string(), "application/pdf".to_string(), "att-1".to_string())]
        );
    }

    #[test]
    fn missing_headers_are_empty_not_errors() {
        let json = serde_json::json!({
            "id": "x",
            "payload": {
                "mimeType": "text/html",
                "headers": [{"name": "Date", "value": "Mon, 3 Feb 2025 08:00:00 +0000"}],
                "body": {"data": b64url("hola")}
            }
        });
        let msg: GmailMessage = serde_json::from_value(json).unwrap();
        let fetched = message_to_fetched(&msg).unwrap();
        assert_eq!(fetched.subject, "");
        assert_eq!(fetched.from, "");
        assert_eq!(fetched.body, "hola");
    }

    #[test]
    fn bad_date_fails_the_message() {
        let json = serde_json::json!({
            "id": "x",
            "payload": {"headers": [{"name": "Date", "value": "not a date"}]}
        });
        let msg: GmailMessage = serde_json::from_value(json).unwrap();
        assert!(matches!(
            message_to_fetched(&msg),
            Err(MailError::InvalidDate { .. })
        ));
    }

    #[test]
    fn decodes_unpadded_base64url() {
        let unpadded = URL_SAFE_NO_PAD.encode("¿Tienes preguntas?");
        assert_eq!(decode_body(&unpadded).unwrap(), "¿Tienes preguntas?");
    }

    #[test]
    fn list_response_tolerates_empty_result() {
        let page: ListResponse = serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
