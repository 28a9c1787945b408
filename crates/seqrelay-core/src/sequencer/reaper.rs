//! Background expiry of items whose stage never signals.
//!
//! The reaper sleeps until the earliest pending deadline, sweeps overdue
//! items into timeout tombstones, and repeats. An admission into an empty
//! deadline queue wakes it through the buffer's `Notify`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::reorder::ReorderBuffer;

/// Spawn the expiry loop for `buffer` on the current tokio runtime.
pub fn spawn_reaper<R: Send + 'static>(
    buffer: Arc<ReorderBuffer<R>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_reaper(buffer, cancel))
}

/// Run the expiry loop until `cancel` fires.
pub async fn run_reaper<R: Send + 'static>(buffer: Arc<ReorderBuffer<R>>, cancel: CancellationToken) {
    debug!(deadline_ms = buffer.deadline().as_millis() as u64, "expiry reaper started");
    loop {
        let next = buffer.next_deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("expiry reaper shutting down");
                return;
            }
            _ = buffer.admitted().notified() => {}
            _ = sleep_until(next) => {
                let expired = buffer.expire_overdue(Instant::now());
                if expired > 0 {
                    info!(expired, next_expected = buffer.next_expected(), "expired overdue items");
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
