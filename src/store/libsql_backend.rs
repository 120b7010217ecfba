//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::ids::LEGACY_NIL_ULID;
use crate::ledger::{CategoryRule, Transaction, TransactionType};
use crate::mail::{MailAttachment, MailMessage};
use crate::store::migrations;
use crate::store::traits::{Database, MailCredential};

/// Rows per statement in chunked batch writes. Keeps every statement well
/// under SQLite's bound-variable limit (14 values per transaction row).
const BATCH_CHUNK_ROWS: usize = 500;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
/// Writes are serialized through `write_lock` so an open transaction on the
/// shared connection never picks up another task's statements.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `statements` in one transaction. Any failure rolls back every chunk.
    async fn execute_atomically(
        &self,
        context: &str,
        statements: Vec<(String, Vec<libsql::Value>)>,
    ) -> Result<u64, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::from_libsql(context, e))?;

        let mut affected = 0;
        for (sql, values) in statements {
            match tx
                .execute(&sql, libsql::params::Params::Positional(values))
                .await
            {
                Ok(n) => affected += n,
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(context, error = %rollback, "Rollback failed");
                    }
                    return Err(DatabaseError::from_libsql(context, e));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::from_libsql(context, e))?;
        Ok(affected)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(column: &str, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("{column}: invalid timestamp {s:?}: {e}")))
}

fn parse_uuid(column: &str, s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s)
        .map_err(|e| DatabaseError::Serialization(format!("{column}: invalid id {s:?}: {e}")))
}

/// Nullable id column. The legacy zero ULID reads back as the nil id.
fn parse_optional_uuid(column: &str, s: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(LEGACY_NIL_ULID) => Ok(Some(Uuid::nil())),
        Some(v) => parse_uuid(column, v).map(Some),
    }
}

fn opt_uuid(id: Option<Uuid>) -> libsql::Value {
    match id {
        Some(id) => libsql::Value::Text(id.to_string()),
        None => libsql::Value::Null,
    }
}

fn text(s: impl Into<String>) -> libsql::Value {
    libsql::Value::Text(s.into())
}

fn row_to_credential(row: &libsql::Row) -> Result<MailCredential, DatabaseError> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("credential row parse: {e}")))
    };

    Ok(MailCredential {
        id: parse_uuid("id", &get(0)?)?,
        user_id: parse_uuid("user_id", &get(1)?)?,
        wallet_id: parse_uuid("wallet_id", &get(2)?)?,
        provider: get(3)?,
        mail_address: get(4)?,
        access_token: get(5)?,
        refresh_token: get(6)?,
        expires_at: parse_datetime("expires_at", &get(7)?)?,
        created_at: parse_datetime("created_at", &get(8)?)?,
        updated_at: parse_datetime("updated_at", &get(9)?)?,
    })
}

fn row_to_mail_message(row: &libsql::Row) -> Result<MailMessage, DatabaseError> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("mail message row parse: {e}")))
    };

    let attachments: Vec<MailAttachment> = serde_json::from_str(&get(6)?)
        .map_err(|e| DatabaseError::Serialization(format!("attachments: {e}")))?;

    Ok(MailMessage {
        id: parse_uuid("id", &get(0)?)?,
        external_id: get(1)?,
        from: get(2)?,
        to: get(3)?,
        subject: get(4)?,
        body: get(5)?,
        attachments,
        received_at: parse_datetime("received_at", &get(7)?)?,
    })
}

fn row_to_transaction(row: &libsql::Row) -> Result<Transaction, DatabaseError> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("transaction row parse: {e}")))
    };

    let type_str = get(5)?;
    let amount_str = get(6)?;

    Ok(Transaction {
        id: parse_uuid("id", &get(0)?)?,
        wallet_id: parse_uuid("wallet_id", &get(1)?)?,
        user_id: parse_uuid("user_id", &get(2)?)?,
        origin: get(3)?,
        reference: get(4)?,
        uniqueness_count: 0,
        transaction_type: TransactionType::from_str(&type_str)
            .map_err(DatabaseError::Serialization)?,
        amount: Decimal::from_str(&amount_str).map_err(|e| {
            DatabaseError::Serialization(format!("amount {amount_str:?}: {e}"))
        })?,
        user_description: get(7)?,
        system_description: get(8)?,
        category_id: parse_optional_uuid("category_id", row.get::<String>(9).ok())?,
        category_setter_id: parse_optional_uuid("category_setter_id", row.get::<String>(10).ok())?,
        processed_at: parse_datetime("processed_at", &get(11)?)?,
        created_at: parse_datetime("created_at", &get(12)?)?,
    })
}

/// Keep the first occurrence of each `(wallet_id, reference)`, preserving order.
fn dedupe_by_key(transactions: &[Transaction]) -> Vec<&Transaction> {
    let mut seen = HashSet::new();
    transactions
        .iter()
        .filter(|t| seen.insert((t.wallet_id, t.reference())))
        .collect()
}

/// Stored setter values that mean "not confirmed by a real actor".
fn sentinel_setter_sql() -> String {
    let nil = Uuid::nil();
    format!(
        "transactions.category_setter_id IS NULL OR transactions.category_setter_id IN ('', '{}', '{}', '{}')",
        nil.hyphenated(),
        nil.simple(),
        LEGACY_NIL_ULID
    )
}

/// Split `values` into multi-row statements of at most `BATCH_CHUNK_ROWS` rows.
fn chunked_statements(
    values: Vec<libsql::Value>,
    columns_per_row: usize,
    sql_for: impl Fn(usize) -> String,
) -> Vec<(String, Vec<libsql::Value>)> {
    let per_chunk = BATCH_CHUNK_ROWS * columns_per_row;
    let mut out = Vec::with_capacity(values.len().div_ceil(per_chunk));
    let mut rest = values.into_iter().peekable();
    while rest.peek().is_some() {
        let chunk: Vec<libsql::Value> = rest.by_ref().take(per_chunk).collect();
        out.push((sql_for(chunk.len() / columns_per_row), chunk));
    }
    out
}

fn insert_mail_messages_sql(rows: usize) -> String {
    let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; rows].join(", ");
    format!(
        "INSERT INTO mail_messages (id, external_id, user_id, sender, recipient, subject,
            body, attachments, received_at, created_at)
         VALUES {placeholders}
         ON CONFLICT (external_id, user_id) DO NOTHING"
    )
}

/// Multi-row upsert for `rows` transactions.
fn upsert_transactions_sql(rows: usize) -> String {
    let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; rows].join(",\n");
    let unconfirmed = sentinel_setter_sql();
    format!(
        "INSERT INTO transactions ({TRANSACTION_INSERT_COLUMNS})
         VALUES {placeholders}
         ON CONFLICT (wallet_id, reference) DO UPDATE SET
            system_description = CASE
                WHEN length(excluded.system_description) > length(transactions.system_description)
                THEN excluded.system_description
                ELSE transactions.system_description END,
            category_id = CASE
                WHEN ({unconfirmed}) AND excluded.category_id IS NOT NULL
                THEN excluded.category_id
                ELSE transactions.category_id END,
            category_setter_id = CASE
                WHEN ({unconfirmed}) AND excluded.category_id IS NOT NULL
                THEN excluded.category_setter_id
                ELSE transactions.category_setter_id END,
            updated_at = excluded.updated_at"
    )
}

// ── Trait implementation ────────────────────────────────────────────

const CREDENTIAL_COLUMNS: &str = "id, user_id, wallet_id, provider, mail_address, access_token, refresh_token, expires_at, created_at, updated_at";

const MAIL_MESSAGE_COLUMNS: &str =
    "id, external_id, sender, recipient, subject, body, attachments, received_at";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, user_id, origin, reference, type, amount, user_description, system_description, category_id, category_setter_id, processed_at, created_at";

const TRANSACTION_INSERT_COLUMNS: &str = "id, wallet_id, user_id, origin, reference, type, amount, user_description, system_description, category_id, category_setter_id, processed_at, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Credentials ─────────────────────────────────────────────────

    async fn save_credential(&self, credential: &MailCredential) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO mail_credentials (id, user_id, wallet_id, provider, mail_address,
                    access_token, refresh_token, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (user_id, mail_address) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
                params![
                    credential.id.to_string(),
                    credential.user_id.to_string(),
                    credential.wallet_id.to_string(),
                    credential.provider.as_str(),
                    credential.mail_address.as_str(),
                    credential.access_token.as_str(),
                    credential.refresh_token.as_str(),
                    credential.expires_at.to_rfc3339(),
                    credential.created_at.to_rfc3339(),
                    credential.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("save_credential", e))?;

        debug!(credential_id = %credential.id, provider = %credential.provider, "Credential saved");
        Ok(())
    }

    async fn find_credentials_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> Result<Vec<MailCredential>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CREDENTIAL_COLUMNS} FROM mail_credentials WHERE wallet_id = ?1 ORDER BY created_at ASC"
                ),
                params![wallet_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_credentials_by_wallet: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_credentials_by_wallet: {e}")))?
        {
            out.push(row_to_credential(&row)?);
        }
        Ok(out)
    }

    async fn find_credentials_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<MailCredential>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CREDENTIAL_COLUMNS} FROM mail_credentials WHERE user_id = ?1 ORDER BY created_at ASC"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_credentials_by_user: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_credentials_by_user: {e}")))?
        {
            out.push(row_to_credential(&row)?);
        }
        Ok(out)
    }

    async fn list_credential_wallets(&self) -> Result<Vec<Uuid>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT DISTINCT wallet_id FROM mail_credentials ORDER BY wallet_id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_credential_wallets: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_credential_wallets: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_credential_wallets: {e}")))?;
            out.push(parse_uuid("wallet_id", &id)?);
        }
        Ok(out)
    }

    async fn update_credential_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let affected = self
            .conn()
            .execute(
                "UPDATE mail_credentials
                 SET access_token = ?1, refresh_token = ?2, expires_at = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    access_token,
                    refresh_token,
                    expires_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("update_credential_tokens", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "mail_credential".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Mail messages ───────────────────────────────────────────────

    async fn insert_mail_messages(
        &self,
        user_id: Uuid,
        messages: &[MailMessage],
    ) -> Result<usize, DatabaseError> {
        if messages.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let user = user_id.to_string();
        let mut values = Vec::with_capacity(messages.len() * 10);
        for m in messages {
            let attachments = serde_json::to_string(&m.attachments)
                .map_err(|e| DatabaseError::Serialization(format!("attachments: {e}")))?;
            values.extend([
                text(m.id.to_string()),
                text(m.external_id.as_str()),
                text(user.as_str()),
                text(m.from.as_str()),
                text(m.to.as_str()),
                text(m.subject.as_str()),
                text(m.body.as_str()),
                text(attachments),
                text(m.received_at.to_rfc3339()),
                text(now.as_str()),
            ]);
        }

        let statements = chunked_statements(values, 10, insert_mail_messages_sql);
        let inserted = self
            .execute_atomically("insert_mail_messages", statements)
            .await?;

        debug!(user_id = %user_id, submitted = messages.len(), inserted, "Mail messages archived");
        Ok(inserted as usize)
    }

    async fn find_mail_messages_by_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MailMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MAIL_MESSAGE_COLUMNS} FROM mail_messages WHERE user_id = ?1
                     ORDER BY received_at DESC LIMIT ?2"
                ),
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_mail_messages_by_user: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_mail_messages_by_user: {e}")))?
        {
            out.push(row_to_mail_message(&row)?);
        }
        Ok(out)
    }

    // ── Transactions ────────────────────────────────────────────────

    async fn upsert_transactions(&self, transactions: &[Transaction]) -> Result<usize, DatabaseError> {
        let batch = dedupe_by_key(transactions);
        if batch.is_empty() {
            return Ok(0);
        }
        if batch.len() < transactions.len() {
            debug!(
                dropped = transactions.len() - batch.len(),
                "Duplicate references in batch, keeping first occurrence"
            );
        }

        let now = Utc::now().to_rfc3339();
        let mut values = Vec::with_capacity(batch.len() * 14);
        for t in &batch {
            values.extend([
                text(t.id.to_string()),
                text(t.wallet_id.to_string()),
                text(t.user_id.to_string()),
                text(t.origin.as_str()),
                text(t.reference()),
                text(t.transaction_type.as_str()),
                text(t.amount.to_string()),
                text(t.user_description.as_str()),
                text(t.system_description.as_str()),
                opt_uuid(t.category_id),
                opt_uuid(t.category_setter_id),
                text(t.processed_at.to_rfc3339()),
                text(t.created_at.to_rfc3339()),
                text(now.as_str()),
            ]);
        }

        let statements = chunked_statements(values, 14, upsert_transactions_sql);
        let chunks = statements.len();
        self.execute_atomically("upsert_transactions", statements)
            .await?;

        debug!(rows = batch.len(), chunks, "Transactions upserted");
        Ok(batch.len())
    }

    async fn get_transaction(
        &self,
        wallet_id: Uuid,
        reference: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE wallet_id = ?1 AND reference = ?2"
                ),
                params![wallet_id.to_string(), reference],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_transaction: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_transaction(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_transaction: {e}"))),
        }
    }

    async fn find_transactions_by_wallet(
        &self,
        wallet_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE wallet_id = ?1
                     ORDER BY processed_at DESC, reference ASC LIMIT ?2"
                ),
                params![wallet_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_transactions_by_wallet: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_transactions_by_wallet: {e}")))?
        {
            out.push(row_to_transaction(&row)?);
        }
        Ok(out)
    }

    // ── Categories ──────────────────────────────────────────────────

    async fn save_category_rule(&self, rule: &CategoryRule) -> Result<(), DatabaseError> {
        let patterns = serde_json::to_string(&rule.patterns)
            .map_err(|e| DatabaseError::Serialization(format!("patterns: {e}")))?;

        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO categories (id, wallet_id, name, patterns, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (id) DO UPDATE SET name = excluded.name, patterns = excluded.patterns",
                params![
                    rule.category_id.to_string(),
                    rule.wallet_id.to_string(),
                    rule.name.as_str(),
                    patterns,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("save_category_rule", e))?;
        Ok(())
    }

    async fn find_category_rules_by_wallet(
        &self,
        wallet_id: Uuid,
    ) -> Result<Vec<CategoryRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, wallet_id, name, patterns FROM categories WHERE wallet_id = ?1
                 ORDER BY created_at ASC, id ASC",
                params![wallet_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_category_rules_by_wallet: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_category_rules_by_wallet: {e}")))?
        {
            let get = |i: i32| {
                row.get::<String>(i)
                    .map_err(|e| DatabaseError::Query(format!("category row parse: {e}")))
            };
            out.push(CategoryRule {
                category_id: parse_uuid("id", &get(0)?)?,
                wallet_id: parse_uuid("wallet_id", &get(1)?)?,
                name: get(2)?,
                patterns: serde_json::from_str(&get(3)?)
                    .map_err(|e| DatabaseError::Serialization(format!("patterns: {e}")))?,
            });
        }
        Ok(out)
    }

    // ── Statement file passwords ────────────────────────────────────

    async fn save_file_passwords(&self, user_id: Uuid, sealed: &str) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO file_passwords (user_id, passwords, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                    passwords = excluded.passwords,
                    updated_at = excluded.updated_at",
                params![user_id.to_string(), sealed, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("save_file_passwords", e))?;
        Ok(())
    }

    async fn find_file_passwords(&self, user_id: Uuid) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT passwords FROM file_passwords WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_file_passwords: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_file_passwords: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_file_passwords: {e}"))),
        }
    }
}
