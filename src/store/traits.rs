//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::ledger::{CategoryRule, Transaction};
use crate::mail::MailMessage;

/// A connected mailbox. Token fields hold ciphertext, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    /// Gateway provider name, e.g. "google".
    pub provider: String,
    pub mail_address: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering credentials, mail, and the ledger.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Credentials ─────────────────────────────────────────────────

    /// Insert a credential, or replace tokens and expiry of the one already
    /// stored for the same `(user_id, mail_address)`.
    async fn save_credential(&self, credential: &MailCredential) -> Result<(), DatabaseError>;

    async fn find_credentials_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> Result<Vec<MailCredential>, DatabaseError>;

    async fn find_credentials_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<MailCredential>, DatabaseError>;

    /// Every wallet with at least one connected mailbox.
    async fn list_credential_wallets(&self) -> Result<Vec<Uuid>, DatabaseError>;

    /// Write back refreshed (encrypted) tokens.
    async fn update_credential_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Mail messages ───────────────────────────────────────────────

    /// Archive fetched messages; already archived `(external_id, user_id)` pairs
    /// are left untouched. Returns the number of new rows. All or nothing.
    async fn insert_mail_messages(
        &self,
        user_id: Uuid,
        messages: &[MailMessage],
    ) -> Result<usize, DatabaseError>;

    /// Archived messages for a user, most recent first.
    async fn find_mail_messages_by_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MailMessage>, DatabaseError>;

    // ── Transactions ────────────────────────────────────────────────

    /// Merge a batch into the ledger in one database transaction.
    ///
    /// Large batches are written as several multi-row statements; a failure in
    /// any of them rolls back the whole batch.
    ///
    /// Conflicts on `(wallet_id, reference)` keep the stored factual fields,
    /// take the incoming `system_description` only when it is strictly longer,
    /// and take the incoming category only while the stored setter is a sentinel.
    /// Returns the number of distinct rows submitted. Empty batches are a no-op.
    async fn upsert_transactions(&self, transactions: &[Transaction]) -> Result<usize, DatabaseError>;

    async fn get_transaction(
        &self,
        wallet_id: Uuid,
        reference: &str,
    ) -> Result<Option<Transaction>, DatabaseError>;

    /// Most recent first by `processed_at`.
    async fn find_transactions_by_wallet(
        &self,
        wallet_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, DatabaseError>;

    // ── Categories ──────────────────────────────────────────────────

    async fn save_category_rule(&self, rule: &CategoryRule) -> Result<(), DatabaseError>;

    async fn find_category_rules_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> Result<Vec<CategoryRule>, DatabaseError>;

    // ── Statement file passwords ────────────────────────────────────

    /// Store the user's sealed statement password list, replacing any previous one.
    async fn save_file_passwords(&self, user_id: Uuid, sealed: &str) -> Result<(), DatabaseError>;

    async fn find_file_passwords(&self, user_id: Uuid) -> Result<Option<String>, DatabaseError>;
}
