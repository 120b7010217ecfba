//! Background sync loop: re-runs `SyncOrchestrator::sync_all` on a timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::pipeline::orchestrator::SyncOrchestrator;

/// Start of the search window.
///
/// With no lookback the window opens at midnight UTC on the first of the
/// current month, so a monthly budget always sees the whole month.
pub fn window_start(lookback_days: Option<u32>, now: DateTime<Utc>) -> DateTime<Utc> {
    match lookback_days {
        Some(days) => now - chrono::Duration::days(i64::from(days)),
        None => Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now),
    }
}

/// Spawn a task that syncs every connected wallet each `interval`.
///
/// The first run happens immediately. Returns a `JoinHandle` and shutdown flag.
pub fn spawn_sync_loop(
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    lookback_days: Option<u32>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Sync loop started");

        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Sync loop shutting down");
                return;
            }

            run_once(&orchestrator, lookback_days).await;
        }
    });

    (handle, shutdown_flag)
}

/// One pass over every wallet. Errors are logged; the loop keeps going.
pub async fn run_once(orchestrator: &SyncOrchestrator, lookback_days: Option<u32>) {
    let since = window_start(lookback_days, Utc::now());
    match orchestrator.sync_all(since).await {
        Ok(results) => {
            let wallets = results.len();
            let failed = results.iter().filter(|r| r.is_err()).count();
            let reports: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            let upserted: usize = reports.iter().map(|r| r.transactions_upserted).sum();
            let degraded = reports.iter().filter(|r| !r.is_clean()).count();
            if failed > 0 || degraded > 0 {
                warn!(wallets, failed, degraded, upserted, "Sync pass finished with failures");
            } else {
                info!(wallets, upserted, "Sync pass finished");
            }
        }
        Err(e) => error!(error = %e, "Failed to list wallets to sync"),
    }
}
