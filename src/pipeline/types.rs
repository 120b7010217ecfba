//! Sync report types.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{MailError, PipelineError};
use crate::mail::FetchFailure;

/// Why a credential's run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFailureKind {
    /// Stored tokens could not be decrypted.
    Decrypt,
    /// Refresh was rejected; the user has to reconnect the mailbox.
    Auth,
    UnsupportedProvider,
    /// Listing messages failed; usually transient.
    Search,
    Other,
}

impl CredentialFailureKind {
    pub fn of(error: &PipelineError) -> Self {
        match error {
            PipelineError::CredentialDecrypt { .. } => Self::Decrypt,
            PipelineError::Mail(MailError::AuthFailed { .. }) => Self::Auth,
            PipelineError::Mail(MailError::UnsupportedProvider(_)) => Self::UnsupportedProvider,
            PipelineError::Mail(MailError::SearchFailed { .. } | MailError::Http(_)) => Self::Search,
            _ => Self::Other,
        }
    }
}

/// A credential whose run was aborted (decrypt, refresh, or search failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialFailure {
    pub credential_id: Uuid,
    pub provider: String,
    pub mail_address: String,
    pub kind: CredentialFailureKind,
    pub reason: String,
}

/// A message that failed to fetch, or whose statement could not be read,
/// tagged with the credential it belonged to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFailure {
    pub credential_id: Uuid,
    pub message_id: String,
    pub reason: String,
}

impl MessageFailure {
    pub fn from_fetch(credential_id: Uuid, failure: FetchFailure) -> Self {
        Self {
            credential_id,
            message_id: failure.message_id,
            reason: failure.reason,
        }
    }
}

/// Outcome of one wallet sync. Partial success is normal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub wallet_id: Uuid,
    pub messages_fetched: usize,
    /// Messages no parser handles.
    pub messages_skipped: usize,
    pub transactions_upserted: usize,
    pub credential_failures: Vec<CredentialFailure>,
    pub fetch_failures: Vec<MessageFailure>,
    /// Statement attachments that could not be opened or read.
    pub statement_failures: Vec<MessageFailure>,
}

impl SyncReport {
    pub fn new(wallet_id: Uuid) -> Self {
        Self {
            wallet_id,
            ..Self::default()
        }
    }

    /// True when every credential and message went through.
    pub fn is_clean(&self) -> bool {
        self.credential_failures.is_empty()
            && self.fetch_failures.is_empty()
            && self.statement_failures.is_empty()
    }
}
