//! Background reconciliation loop.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::desk::EscrowDesk;

/// Run [`EscrowDesk::reconcile_once`] every poll interval until `shutdown`
/// flips to `true` or its sender is dropped.
///
/// The first tick fires immediately and records the balance baseline. A
/// failed cycle is logged and retried on the next tick.
pub fn spawn_reconciliation(desk: Arc<EscrowDesk>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(desk.config().poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = desk.config().poll_interval_secs, "reconciliation loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match desk.reconcile_once().await {
                        Ok(report) => tracing::debug!(
                            expired = report.expired.len(),
                            delta = ?report.delta,
                            outcome = ?report.outcome,
                            "reconciliation cycle done"
                        ),
                        Err(e) => tracing::warn!(error = %e, retryable = e.is_retryable(), "reconciliation cycle failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("reconciliation loop stopped");
    })
}
