use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;

use mail_ledger::config::{OAuthClientConfig, SyncConfig};
use mail_ledger::crypto::{AesGcmCipher, Cipher};
use mail_ledger::extract::{ParserRegistry, PdfToText};
use mail_ledger::ids::{IdGenerator, UuidV7Generator};
use mail_ledger::mail::{GmailProvider, MailGateway, OAuthTokenSource, OutlookProvider};
use mail_ledger::pipeline::{SyncOrchestrator, run_once, spawn_sync_loop};
use mail_ledger::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let once = std::env::args().skip(1).any(|a| a == "--once");
    let config = SyncConfig::from_env().context("invalid configuration")?;

    eprintln!("📬 Mail Ledger v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Senders: {}", config.senders.join(", "));

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    let cipher: Arc<dyn Cipher> =
        Arc::new(AesGcmCipher::new(&config.crypt_secret).context("invalid credential secret")?);

    // ── Mail providers ───────────────────────────────────────────────────
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let ids: Arc<dyn IdGenerator> = Arc::new(UuidV7Generator);
    let mut gateway = MailGateway::new(ids.clone(), config.fetch_concurrency);

    if let Some(google) = OAuthClientConfig::google_from_env() {
        gateway.register(
            Arc::new(GmailProvider::new(http.clone())),
            Arc::new(OAuthTokenSource::new("google", google, http.clone())),
        );
        eprintln!("   Google: enabled");
    }
    if let Some(microsoft) = OAuthClientConfig::microsoft_from_env() {
        gateway.register(
            Arc::new(OutlookProvider::new(http.clone())),
            Arc::new(OAuthTokenSource::new("microsoft", microsoft, http.clone())),
        );
        eprintln!("   Microsoft: enabled");
    }
    if !gateway.supports("google") && !gateway.supports("microsoft") {
        tracing::warn!("No mail provider configured; every credential will be skipped");
    }

    eprintln!("   Statements: {}", config.pdftotext.display());
    let orchestrator = Arc::new(
        SyncOrchestrator::new(
            db,
            cipher,
            Arc::new(gateway),
            ParserRegistry::with_defaults(),
            ids,
            config.senders.clone(),
        )
        .with_statement_extractor(Arc::new(PdfToText::new(config.pdftotext.clone()))),
    );

    // ── Run ──────────────────────────────────────────────────────────────
    if once {
        run_once(&orchestrator, config.lookback_days).await;
        return Ok(());
    }

    eprintln!("   Interval: {}s\n", config.sync_interval.as_secs());
    let (handle, shutdown) =
        spawn_sync_loop(orchestrator, config.sync_interval, config.lookback_days);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested");
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();
    let _ = handle.await;

    Ok(())
}
