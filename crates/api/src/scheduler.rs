//! Periodic vendor order batch.

use std::sync::Arc;
use std::time::Duration;

use store::Store;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::AppState;

/// Spawns a task that runs the vendor order batch every `period`.
///
/// A tick that finds a run still in progress (scheduled or triggered
/// manually) is skipped.
pub fn spawn<S: Store>(state: Arc<AppState<S>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;
        tracing::info!(period_secs = period.as_secs(), "vendor batch scheduler started");

        loop {
            ticker.tick().await;
            match state.run_vendor_batch().await {
                Some(Ok(report)) => tracing::info!(
                    orders_processed = report.orders_processed,
                    errors = report.errors.len(),
                    "scheduled vendor batch finished"
                ),
                Some(Err(e)) => tracing::error!(error = %e, "scheduled vendor batch failed"),
                None => tracing::debug!("vendor batch already running, tick skipped"),
            }
        }
    })
}
