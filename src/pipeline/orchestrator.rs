//! Wallet sync: credentials → mail gateway → parsers → ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::crypto::Cipher;
use crate::error::{DatabaseError, PipelineError};
use crate::extract::pdf::decode_attachment;
use crate::extract::{ParserRegistry, StatementTextExtractor, TransactionParser};
use crate::ids::IdGenerator;
use crate::ledger::{Transaction, apply_category_rules, resolve_references};
use crate::mail::{GatewaySearch, MailGateway, MailMessage, Tokens};
use crate::pipeline::types::{CredentialFailure, CredentialFailureKind, MessageFailure, SyncReport};
use crate::store::{Database, MailCredential};

/// Runs the ingestion pipeline for wallets.
///
/// One wallet's credentials are processed in order and their candidates are
/// reconciled in a single batch; separate wallets run concurrently.
pub struct SyncOrchestrator {
    db: Arc<dyn Database>,
    cipher: Arc<dyn Cipher>,
    gateway: Arc<MailGateway>,
    parsers: ParserRegistry,
    ids: Arc<dyn IdGenerator>,
    senders: Vec<String>,
    statements: Option<Arc<dyn StatementTextExtractor>>,
}

impl SyncOrchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        cipher: Arc<dyn Cipher>,
        gateway: Arc<MailGateway>,
        parsers: ParserRegistry,
        ids: Arc<dyn IdGenerator>,
        senders: Vec<String>,
    ) -> Self {
        Self {
            db,
            cipher,
            gateway,
            parsers,
            ids,
            senders,
            statements: None,
        }
    }

    /// Read PDF statement attachments with `extractor`. Without one they are skipped.
    pub fn with_statement_extractor(mut self, extractor: Arc<dyn StatementTextExtractor>) -> Self {
        self.statements = Some(extractor);
        self
    }

    /// Seal and store the passwords tried on a user's statement PDFs.
    pub async fn save_statement_passwords(
        &self,
        user_id: Uuid,
        passwords: &[String],
    ) -> crate::error::Result<()> {
        let sealed = self.cipher.encrypt(&passwords.join("\n"))?;
        self.db.save_file_passwords(user_id, &sealed).await?;
        debug!(user_id = %user_id, count = passwords.len(), "Statement passwords saved");
        Ok(())
    }

    /// Sync every wallet that has a connected mailbox.
    ///
    /// One result per wallet, in the order the store lists them. Only failing
    /// to list the wallets is an `Err`.
    pub async fn sync_all(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Result<SyncReport, PipelineError>>, DatabaseError> {
        let wallets = self.db.list_credential_wallets().await?;
        Ok(self.sync_wallets(&wallets, since).await)
    }

    /// Sync wallets concurrently; one wallet's failure never affects another.
    pub async fn sync_wallets(
        &self,
        wallet_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Vec<Result<SyncReport, PipelineError>> {
        let results = join_all(wallet_ids.iter().map(|w| self.sync_wallet(*w, since))).await;
        for (wallet_id, result) in wallet_ids.iter().zip(&results) {
            if let Err(e) = result {
                error!(wallet_id = %wallet_id, error = %e, "Wallet sync failed");
            }
        }
        results
    }

    /// Fetch, parse, and reconcile everything received since `since` for one wallet.
    ///
    /// Credential-level failures are recorded in the report. Only loading
    /// credentials and persisting the batch abort the wallet.
    pub async fn sync_wallet(
        &self,
        wallet_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<SyncReport, PipelineError> {
        let credentials = self
            .db
            .find_credentials_by_wallet(wallet_id)
            .await
            .map_err(|source| PipelineError::Credentials { wallet_id, source })?;

        info!(wallet_id = %wallet_id, credentials = credentials.len(), since = %since, "Syncing wallet");

        let mut report = SyncReport::new(wallet_id);
        let mut candidates: Vec<Transaction> = Vec::new();

        for credential in &credentials {
            let search = match self.search_credential(credential, since).await {
                Ok(search) => search,
                Err(e) => {
                    let kind = CredentialFailureKind::of(&e);
                    warn!(
                        wallet_id = %wallet_id,
                        credential_id = %credential.id,
                        provider = %credential.provider,
                        ?kind,
                        error = %e,
                        "Credential skipped"
                    );
                    report.credential_failures.push(CredentialFailure {
                        credential_id: credential.id,
                        provider: credential.provider.clone(),
                        mail_address: credential.mail_address.clone(),
                        kind,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if search.refreshed {
                self.store_refreshed_tokens(credential, &search.tokens).await;
            }

            let messages = search.search.messages;
            report.messages_fetched += messages.len();
            report.fetch_failures.extend(
                search
                    .search
                    .failures
                    .into_iter()
                    .map(|f| MessageFailure::from_fetch(credential.id, f)),
            );

            self.db
                .insert_mail_messages(credential.user_id, &messages)
                .await
                .map_err(|source| PipelineError::Persistence { wallet_id, source })?;

            let mut passwords = None;
            for message in &messages {
                match self
                    .parse_message(credential, message, &mut passwords, &mut report)
                    .await
                {
                    Some(parsed) => candidates.extend(parsed),
                    None => report.messages_skipped += 1,
                }
            }
        }

        report.transactions_upserted = self.reconcile(wallet_id, candidates).await?;

        info!(
            wallet_id = %wallet_id,
            fetched = report.messages_fetched,
            skipped = report.messages_skipped,
            upserted = report.transactions_upserted,
            credential_failures = report.credential_failures.len(),
            fetch_failures = report.fetch_failures.len(),
            statement_failures = report.statement_failures.len(),
            "Wallet sync complete"
        );
        Ok(report)
    }

    /// Decrypt tokens and search the mailbox.
    async fn search_credential(
        &self,
        credential: &MailCredential,
        since: DateTime<Utc>,
    ) -> Result<GatewaySearch, PipelineError> {
        let tokens = self.decrypt_tokens(credential)?;
        Ok(self
            .gateway
            .search_from_date_and_senders(&credential.provider, &tokens, since, &self.senders)
            .await?)
    }

    fn decrypt_tokens(&self, credential: &MailCredential) -> Result<Tokens, PipelineError> {
        let decrypt = |ciphertext: &str| {
            self.cipher
                .decrypt(ciphertext)
                .map_err(|source| PipelineError::CredentialDecrypt {
                    credential_id: credential.id,
                    source,
                })
        };

        Ok(Tokens {
            access_token: SecretString::from(decrypt(&credential.access_token)?),
            refresh_token: SecretString::from(decrypt(&credential.refresh_token)?),
            expires_at: credential.expires_at,
        })
    }

    /// Re-encrypt and persist refreshed tokens. Failure only costs a refresh next run.
    async fn store_refreshed_tokens(&self, credential: &MailCredential, tokens: &Tokens) {
        let sealed = self
            .cipher
            .encrypt(tokens.access_token.expose_secret())
            .and_then(|access| {
                self.cipher
                    .encrypt(tokens.refresh_token.expose_secret())
                    .map(|refresh| (access, refresh))
            });

        let result = match sealed {
            Ok((access, refresh)) => self
                .db
                .update_credential_tokens(credential.id, &access, &refresh, tokens.expires_at)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => debug!(credential_id = %credential.id, "Stored refreshed tokens"),
            Err(e) => warn!(credential_id = %credential.id, error = %e, "Failed to store refreshed tokens"),
        }
    }

    /// Parse one message, plus its statement attachments, and stamp ownership
    /// on the candidates. `None` when no parser handles the sender.
    async fn parse_message(
        &self,
        credential: &MailCredential,
        message: &MailMessage,
        passwords: &mut Option<Vec<String>>,
        report: &mut SyncReport,
    ) -> Option<Vec<Transaction>> {
        let Some(parser) = self.parsers.parser_for(message) else {
            debug!(message_id = %message.external_id, from = %message.from, "No parser for sender");
            return None;
        };

        let mut parsed = parser.parse(message);
        if parser.reads_statements(message) {
            parsed.extend(
                self.read_statements(parser, credential, message, passwords, report)
                    .await,
            );
        }

        let now = Utc::now();
        for t in &mut parsed {
            t.id = self.ids.new_id();
            t.wallet_id = credential.wallet_id;
            t.user_id = credential.user_id;
            t.created_at = now;
        }
        Some(parsed)
    }

    /// Run each PDF attachment through the extractor and the parser's statement reader.
    ///
    /// A statement that cannot be opened is reported and skipped.
    async fn read_statements(
        &self,
        parser: &dyn TransactionParser,
        credential: &MailCredential,
        message: &MailMessage,
        passwords: &mut Option<Vec<String>>,
        report: &mut SyncReport,
    ) -> Vec<Transaction> {
        let pdfs: Vec<_> = message
            .attachments
            .iter()
            .filter(|a| a.content_type.to_lowercase().starts_with("application/pdf"))
            .collect();
        if pdfs.is_empty() {
            return Vec::new();
        }
        let Some(extractor) = &self.statements else {
            debug!(message_id = %message.external_id, "No statement extractor configured, skipping attachments");
            return Vec::new();
        };

        if passwords.is_none() {
            *passwords = Some(self.statement_passwords(credential.user_id).await);
        }
        let passwords = passwords.as_deref().unwrap_or_default();

        let mut out = Vec::new();
        for attachment in pdfs {
            let tsv = match decode_attachment(&attachment.content) {
                Ok(pdf) => extractor.to_tsv(&pdf, passwords).await,
                Err(e) => Err(e),
            };
            match tsv {
                Ok(tsv) => {
                    let rows = parser.parse_statement(&tsv);
                    info!(
                        message_id = %message.external_id,
                        attachment = %attachment.name,
                        rows = rows.len(),
                        "Statement read"
                    );
                    out.extend(rows);
                }
                Err(e) => {
                    warn!(
                        message_id = %message.external_id,
                        attachment = %attachment.name,
                        error = %e,
                        "Statement could not be read"
                    );
                    report.statement_failures.push(MessageFailure {
                        credential_id: credential.id,
                        message_id: message.external_id.clone(),
                        reason: format!("{}: {e}", attachment.name),
                    });
                }
            }
        }
        out
    }

    /// The user's statement passwords, or none when unset or unreadable.
    async fn statement_passwords(&self, user_id: Uuid) -> Vec<String> {
        let sealed = match self.db.find_file_passwords(user_id).await {
            Ok(Some(sealed)) => sealed,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load statement passwords");
                return Vec::new();
            }
        };
        match self.cipher.decrypt(&sealed) {
            Ok(plain) => plain
                .lines()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Statement passwords could not be decrypted");
                Vec::new()
            }
        }
    }

    /// Categorize and submit the wallet's candidates as one batch.
    async fn reconcile(
        &self,
        wallet_id: Uuid,
        mut candidates: Vec<Transaction>,
    ) -> Result<usize, PipelineError> {
        if candidates.is_empty() {
            debug!(wallet_id = %wallet_id, "No candidates to reconcile");
            return Ok(0);
        }

        resolve_references(&mut candidates);

        let rules = self
            .db
            .find_category_rules_by_wallet(wallet_id)
            .await
            .map_err(|source| PipelineError::Persistence { wallet_id, source })?;
        let tagged = apply_category_rules(&rules, &mut candidates);
        debug!(wallet_id = %wallet_id, candidates = candidates.len(), tagged, "Reconciling");

        self.db
            .upsert_transactions(&candidates)
            .await
            .map_err(|source| PipelineError::Persistence { wallet_id, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCipher;
    use crate::error::ExtractError;
    use crate::extract::nu_statement::sample_statement_tsv;
    use crate::ids::UuidV7Generator;
    use crate::ledger::TransactionType;
    use crate::mail::MailAttachment;
    use crate::mail::testing::{FakeProvider, FakeTokenSource, fetched};
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    const NU: &str = "Nu Colombia <nu@nu.com.co>";
    const TRANSFER_SUBJECT: &str = "El dinero que enviaste ya está del otro lado";
    const TRANSFER_BODY: &str = "Recibe\nDiana E. Nu\nMonto\n$300.000,00\nImpuesto del 4x1.000\n$1.200,00\n";

    struct Harness {
        db: Arc<LibSqlBackend>,
        cipher: Arc<AesGcmCipher>,
        orchestrator: SyncOrchestrator,
    }

    /// Hands out the same id every time.
    struct FixedIds(Uuid);

    impl IdGenerator for FixedIds {
        fn new_id(&self) -> Uuid {
            self.0
        }

        fn new_id_from(&self, _at: DateTime<Utc>) -> Uuid {
            self.0
        }
    }

    /// Opens only statements protected by "secret".
    struct LockedStatements;

    #[async_trait]
    impl StatementTextExtractor for LockedStatements {
        async fn to_tsv(&self, pdf: &[u8], passwords: &[String]) -> Result<String, ExtractError> {
            assert!(pdf.starts_with(b"%PDF"));
            if passwords.iter().any(|p| p == "secret") {
                Ok(sample_statement_tsv())
            } else {
                Err(ExtractError::Tool {
                    status: Some(1),
                    stderr: "Incorrect password".into(),
                })
            }
        }
    }

    fn statement_mail(id: &str) -> crate::mail::FetchedMail {
        let mut mail = fetched(id, NU, "El extracto de tu cuenta Nu ya está aquí", "<p>Hola</p>");
        mail.attachments = vec![MailAttachment {
            name: "CuentaNu_2025-02.pdf".into(),
            content_type: "application/pdf".into(),
            content: STANDARD.encode(b"%PDF-1.4 statement"),
        }];
        mail
    }

    async fn harness(provider: FakeProvider, tokens: FakeTokenSource) -> Harness {
        harness_with_ids(provider, tokens, Arc::new(UuidV7Generator)).await
    }

    async fn harness_with_ids(
        provider: FakeProvider,
        tokens: FakeTokenSource,
        ids: Arc<dyn IdGenerator>,
    ) -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let cipher = Arc::new(
            AesGcmCipher::new(&SecretString::from("0123456789abcdef0123456789abcdef")).unwrap(),
        );
        let mut gateway = MailGateway::new(ids.clone(), 4);
        gateway.register(Arc::new(provider), Arc::new(tokens));

        let orchestrator = SyncOrchestrator::new(
            db.clone(),
            cipher.clone(),
            Arc::new(gateway),
            ParserRegistry::with_defaults(),
            ids,
            vec!["nu@nu.com.co".into(), "alertas@bank.co".into()],
        );
        Harness {
            db,
            cipher,
            orchestrator,
        }
    }

    async fn connect(h: &Harness, wallet: Uuid, provider: &str, address: &str) -> MailCredential {
        let now = Utc::now();
        let credential = MailCredential {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            wallet_id: wallet,
            provider: provider.into(),
            mail_address: address.into(),
            access_token: h.cipher.encrypt("access").unwrap(),
            refresh_token: h.cipher.encrypt("refresh").unwrap(),
            expires_at: now + Duration::hours(1),
            created_at: now,
            updated_at: now,
        };
        h.db.save_credential(&credential).await.unwrap();
        credential
    }

    fn since() -> DateTime<Utc> {
        Utc::now() - Duration::days(1)
    }

    #[tokio::test]
    async fn syncs_transfer_email_into_ledger() {
        let provider = FakeProvider::new(
            "google",
            vec![
                fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY),
                fetched("m2", "alertas@bank.co", "Compra aprobada", "x"),
            ],
        );
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        let cred = connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert_eq!(report.messages_fetched, 2);
        assert_eq!(report.messages_skipped, 1);
        assert_eq!(report.transactions_upserted, 2);
        assert!(report.is_clean());

        let principal = h.db.get_transaction(wallet, "m1").await.unwrap().unwrap();
        assert_eq!(principal.amount, dec!(-300000));
        assert_eq!(principal.system_description, "Envío a Diana E.");
        assert_eq!(principal.user_id, cred.user_id);

        let tax = h.db.get_transaction(wallet, "m1_tax").await.unwrap().unwrap();
        assert_eq!(tax.amount, dec!(-1200));
        assert_eq!(tax.processed_at, principal.processed_at);

        let archived = h.db.find_mail_messages_by_user(cred.user_id, 10).await.unwrap();
        assert_eq!(archived.len(), 2);
    }

    #[tokio::test]
    async fn rerun_is_side_effect_free() {
        let provider = FakeProvider::new("google", vec![fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY)]);
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        h.orchestrator.sync_wallet(wallet, since()).await.unwrap();
        let first = h.db.find_transactions_by_wallet(wallet, 100).await.unwrap();
        h.orchestrator.sync_wallet(wallet, since()).await.unwrap();
        let second = h.db.find_transactions_by_wallet(wallet, 100).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failing_credential_does_not_block_siblings() {
        let provider = FakeProvider::new("google", vec![fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY)]);
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        let yahoo = connect(&h, wallet, "yahoo", "jhon.doe@yahoo.com").await;
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert_eq!(report.credential_failures.len(), 1);
        assert_eq!(report.credential_failures[0].credential_id, yahoo.id);
        assert!(report.credential_failures[0].reason.contains("yahoo"));
        assert_eq!(
            report.credential_failures[0].kind,
            CredentialFailureKind::UnsupportedProvider
        );
        assert_eq!(report.transactions_upserted, 2);
        // Never deleted.
        assert_eq!(h.db.find_credentials_by_wallet(wallet).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn revoked_token_is_reported_and_credential_kept() {
        let provider = FakeProvider::new("google", vec![fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY)]);
        let h = harness(provider, FakeTokenSource::Fail).await;
        let wallet = Uuid::now_v7();
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert_eq!(report.credential_failures.len(), 1);
        assert!(report.credential_failures[0].reason.contains("expired or revoked"));
        assert_eq!(report.credential_failures[0].kind, CredentialFailureKind::Auth);
        assert_eq!(report.transactions_upserted, 0);
        assert_eq!(h.db.find_credentials_by_wallet(wallet).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn undecryptable_credential_is_a_credential_failure() {
        let h = harness(FakeProvider::new("google", vec![]), FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        let mut cred = connect(&h, wallet, "google", "jhon.doe@gmail.com").await;
        cred.access_token = "not-a-ciphertext".into();
        h.db.save_credential(&cred).await.unwrap();

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();
        assert_eq!(report.credential_failures.len(), 1);
        assert!(report.credential_failures[0].reason.contains("decrypted"));
        assert_eq!(report.credential_failures[0].kind, CredentialFailureKind::Decrypt);
    }

    #[tokio::test]
    async fn refreshed_tokens_are_written_back_encrypted() {
        let provider = FakeProvider::new("google", vec![]);
        let h = harness(provider, FakeTokenSource::Refresh("fresh-access".into())).await;
        let wallet = Uuid::now_v7();
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        let stored = &h.db.find_credentials_by_wallet(wallet).await.unwrap()[0];
        assert_ne!(stored.access_token, "fresh-access");
        assert_eq!(h.cipher.decrypt(&stored.access_token).unwrap(), "fresh-access");
        assert_eq!(h.cipher.decrypt(&stored.refresh_token).unwrap(), "refresh");
    }

    #[tokio::test]
    async fn fetch_failures_are_reported_alongside_successes() {
        let mut provider = FakeProvider::new(
            "google",
            vec![
                fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY),
                fetched("m2", NU, TRANSFER_SUBJECT, TRANSFER_BODY),
            ],
        );
        provider.failing_ids = vec!["m2".into()];
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        let cred = connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert_eq!(report.fetch_failures.len(), 1);
        assert_eq!(report.fetch_failures[0].message_id, "m2");
        assert_eq!(report.fetch_failures[0].credential_id, cred.id);
        assert_eq!(report.transactions_upserted, 2);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn category_rules_tag_candidates() {
        let provider = FakeProvider::new("google", vec![fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY)]);
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;
        let taxes = crate::ledger::CategoryRule {
            category_id: Uuid::now_v7(),
            wallet_id: wallet,
            name: "Impuestos".into(),
            patterns: vec!["4x1.000".into()],
        };
        h.db.save_category_rule(&taxes).await.unwrap();

        h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        let tax = h.db.get_transaction(wallet, "m1_tax").await.unwrap().unwrap();
        assert_eq!(tax.category_id, Some(taxes.category_id));
        assert_eq!(tax.category_setter_id, Some(Uuid::nil()));
        let principal = h.db.get_transaction(wallet, "m1").await.unwrap().unwrap();
        assert_eq!(principal.category_id, None);
    }

    #[tokio::test]
    async fn wallet_without_credentials_is_empty_report() {
        let h = harness(FakeProvider::new("google", vec![]), FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();
        assert_eq!(report, SyncReport::new(wallet));
    }

    #[tokio::test]
    async fn sync_all_covers_every_connected_wallet() {
        let provider = FakeProvider::new("google", vec![fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY)]);
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let (w1, w2) = (Uuid::now_v7(), Uuid::now_v7());
        connect(&h, w1, "google", "a@gmail.com").await;
        connect(&h, w2, "google", "b@gmail.com").await;

        let reports = h.orchestrator.sync_all(since()).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.as_ref().is_ok_and(SyncReport::is_clean)));
        assert!(h.db.get_transaction(w1, "m1").await.unwrap().is_some());
        assert!(h.db.get_transaction(w2, "m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sync_all_surfaces_wallet_failures() {
        let provider = FakeProvider::new("google", vec![fetched("m1", NU, TRANSFER_SUBJECT, TRANSFER_BODY)]);
        // Principal and tax rows collide on the primary key.
        let h = harness_with_ids(
            provider,
            FakeTokenSource::Passthrough,
            Arc::new(FixedIds(Uuid::now_v7())),
        )
        .await;
        let wallet = Uuid::now_v7();
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let results = h.orchestrator.sync_all(since()).await.unwrap();

        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(PipelineError::Persistence { wallet_id, .. }) => assert_eq!(*wallet_id, wallet),
            other => panic!("expected persistence failure, got {other:?}"),
        }
        assert!(h.db.find_transactions_by_wallet(wallet, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn statement_attachment_rows_are_ingested() {
        let provider = FakeProvider::new("google", vec![statement_mail("st-1")]);
        let mut h = harness(provider, FakeTokenSource::Passthrough).await;
        h.orchestrator = h.orchestrator.with_statement_extractor(Arc::new(LockedStatements));
        let wallet = Uuid::now_v7();
        let cred = connect(&h, wallet, "google", "jhon.doe@gmail.com").await;
        h.orchestrator
            .save_statement_passwords(cred.user_id, &["1234".into(), "secret".into()])
            .await
            .unwrap();

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.transactions_upserted, 3);
        let ledger = h.db.find_transactions_by_wallet(wallet, 10).await.unwrap();
        let income = ledger
            .iter()
            .find(|t| t.transaction_type == TransactionType::Income)
            .unwrap();
        assert_eq!(income.amount, dec!(50000));
        assert_eq!(income.reference, "2025-02-15T00:00:00Z/nu/savings/Recibiste de Carlos/50000/0");
        assert!(ledger.iter().all(|t| t.user_id == cred.user_id));

        // Re-reading the same statement changes nothing.
        h.orchestrator.sync_wallet(wallet, since()).await.unwrap();
        assert_eq!(h.db.find_transactions_by_wallet(wallet, 10).await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn locked_statement_is_reported() {
        let provider = FakeProvider::new("google", vec![statement_mail("st-1")]);
        let mut h = harness(provider, FakeTokenSource::Passthrough).await;
        h.orchestrator = h.orchestrator.with_statement_extractor(Arc::new(LockedStatements));
        let wallet = Uuid::now_v7();
        let cred = connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert_eq!(report.transactions_upserted, 0);
        assert_eq!(report.statement_failures.len(), 1);
        assert_eq!(report.statement_failures[0].credential_id, cred.id);
        assert_eq!(report.statement_failures[0].message_id, "st-1");
        assert!(report.statement_failures[0].reason.contains("Incorrect password"));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn statements_are_skipped_without_an_extractor() {
        let provider = FakeProvider::new("google", vec![statement_mail("st-1")]);
        let h = harness(provider, FakeTokenSource::Passthrough).await;
        let wallet = Uuid::now_v7();
        connect(&h, wallet, "google", "jhon.doe@gmail.com").await;

        let report = h.orchestrator.sync_wallet(wallet, since()).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.messages_skipped, 0);
        assert_eq!(report.transactions_upserted, 0);
    }
}
