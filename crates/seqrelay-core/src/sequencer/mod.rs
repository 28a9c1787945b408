//! The ordering sequencer: tagger, reorder buffer and expiry reaper.
//!
//! [`Sequencer`] owns one [`ReorderBuffer`], hands out [`Tagger`] handles
//! for ingress, and runs the expiry reaper for as long as it is alive.

pub mod reaper;
pub mod reorder;
pub mod tagger;

pub use reaper::{run_reaper, spawn_reaper};
pub use reorder::{ReorderBuffer, SequencerStats};
pub use tagger::{Tagged, Tagger};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use seqrelay_types::config::SequencerConfig;
use seqrelay_types::sequence::FailureReason;

use crate::sink::Sink;

/// Reorder buffer plus its tagger and expiry reaper.
pub struct Sequencer<R> {
    buffer: Arc<ReorderBuffer<R>>,
    tagger: Tagger<R>,
    cancel: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Send + 'static> Sequencer<R> {
    /// Build the buffer and start the expiry reaper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &SequencerConfig, sink: Arc<dyn Sink<R>>) -> Self {
        let buffer = Arc::new(ReorderBuffer::new(config, sink));
        let tagger = Tagger::new(Arc::clone(&buffer), config.overflow);
        let cancel = CancellationToken::new();
        let reaper = spawn_reaper(Arc::clone(&buffer), cancel.clone());
        Self {
            buffer,
            tagger,
            cancel,
            reaper: Mutex::new(Some(reaper)),
        }
    }

    /// The shared reorder buffer.
    pub fn buffer(&self) -> &Arc<ReorderBuffer<R>> {
        &self.buffer
    }

    /// An ingress handle.
    pub fn tagger(&self) -> &Tagger<R> {
        &self.tagger
    }

    /// Snapshot of the buffer's state.
    pub fn stats(&self) -> SequencerStats {
        self.buffer.stats()
    }

    /// Close the window to new admissions, resolve what is left and stop
    /// the reaper.
    ///
    /// Every item still pending is released as a
    /// [`FailureReason::Shutdown`] tombstone before the reaper is
    /// cancelled, so the sink sees each issued number exactly once. Call
    /// this after the stages have drained, or their late signals are
    /// reported as duplicates.
    pub async fn shutdown(&self) {
        self.buffer.close();
        self.buffer.abandon_pending(FailureReason::Shutdown);
        self.cancel.cancel();
        let handle = self.reaper.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            debug!(error = %e, "expiry reaper task ended abnormally");
        }
    }
}

impl<R> Drop for Sequencer<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;
    use seqrelay_types::sequence::Delivery;

    #[tokio::test]
    async fn shutdown_resolves_pending_items() {
        let sink = Arc::new(CollectingSink::<u32>::new());
        let config = SequencerConfig {
            max_window: 4,
            per_item_deadline_ms: 60_000,
            ..SequencerConfig::default()
        };
        let sequencer = Sequencer::<u32>::start(&config, sink.clone());
        for _ in 0..3 {
            sequencer.tagger().tag(()).await.unwrap();
        }
        sequencer.buffer().complete(3, 30).unwrap();

        sequencer.shutdown().await;

        assert_eq!(
            sink.snapshot(),
            vec![
                (1, Delivery::Tombstone(FailureReason::Shutdown)),
                (2, Delivery::Tombstone(FailureReason::Shutdown)),
                (3, Delivery::Result(30)),
            ]
        );
        let stats = sequencer.stats();
        assert_eq!(stats.abandoned, 2);
        assert_eq!(stats.resident, 0);
        assert!(sequencer.tagger().try_tag(()).is_err());
    }
}
