//! Relay facade: sequencer plus a chain of stage worker pools.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use seqrelay_types::error::Result;
use seqrelay_types::sequence::{FailureReason, SequenceNumber};

use super::pool::{PoolStats, StageWorkerPool};
use super::traits::StageOutput;
use crate::sequencer::{ReorderBuffer, Sequencer, SequencerStats};

/// Stage name recorded on tombstones for payloads that never left ingress.
const INGRESS: &str = "ingress";

/// Anything that can report [`PoolStats`].
pub trait PoolProbe: Send + Sync {
    /// Current counters.
    fn pool_stats(&self) -> PoolStats;
}

impl<I: Send + 'static, O: Send + 'static> PoolProbe for StageWorkerPool<I, O> {
    fn pool_stats(&self) -> PoolStats {
        self.stats()
    }
}

/// Point-in-time view of the whole relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStats {
    /// Reorder buffer state.
    pub sequencer: SequencerStats,
    /// One entry per stage, head of the chain first.
    pub stages: Vec<PoolStats>,
}

/// An ordered relay taking payloads `P` and releasing results `R`.
///
/// `ingest` tags each payload and hands it to the head of the stage chain;
/// the tail of the chain reports into the sequencer's reorder buffer, which
/// releases to the sink in submission order.
pub struct Relay<P, R> {
    sequencer: Sequencer<R>,
    entry: Arc<dyn StageOutput<P>>,
    probes: Vec<Arc<dyn PoolProbe>>,
}

impl<P: Send + 'static, R: Send + 'static> Relay<P, R> {
    /// Assemble a relay from a started sequencer and the head of a chain
    /// whose tail emits into `sequencer.buffer()`.
    pub fn new(
        sequencer: Sequencer<R>,
        entry: Arc<dyn StageOutput<P>>,
        probes: Vec<Arc<dyn PoolProbe>>,
    ) -> Self {
        Self {
            sequencer,
            entry,
            probes,
        }
    }

    /// Tag `payload` and submit it to the first stage.
    ///
    /// Applies the sequencer's overflow policy: waits for window capacity
    /// or fails with `Overloaded`. Fails with `Closed` after shutdown.
    ///
    /// Cancel-safe: if the future is dropped after the payload was tagged
    /// but before the first stage took it, the number is failed so the
    /// stream does not wait on it.
    pub async fn ingest(&self, payload: P) -> Result<SequenceNumber> {
        let tagged = self.sequencer.tagger().tag(payload).await?;
        let handoff = Handoff::new(self.sequencer.buffer(), tagged.seq);
        self.entry.emit(tagged.seq, tagged.payload).await;
        let seq = handoff.finish();
        debug!(seq, "payload ingested");
        Ok(seq)
    }

    /// Like [`ingest`](Self::ingest) but never waits for window capacity.
    pub async fn try_ingest(&self, payload: P) -> Result<SequenceNumber> {
        let tagged = self.sequencer.tagger().try_tag(payload)?;
        let handoff = Handoff::new(self.sequencer.buffer(), tagged.seq);
        self.entry.emit(tagged.seq, tagged.payload).await;
        Ok(handoff.finish())
    }

    /// The underlying sequencer.
    pub fn sequencer(&self) -> &Sequencer<R> {
        &self.sequencer
    }

    /// Snapshot of the sequencer and every stage pool.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            sequencer: self.sequencer.stats(),
            stages: self.probes.iter().map(|p| p.pool_stats()).collect(),
        }
    }

    /// Drain the stage chain, then close the window and stop the reaper.
    ///
    /// Each pool gets its drain timeout to finish queued and running
    /// work; workers still busy after that are aborted and their items
    /// failed. Anything left pending is then tombstoned by the sequencer,
    /// so every ingested item reaches the sink before this returns.
    pub async fn shutdown(&self) {
        info!("relay shutting down");
        self.entry.close().await;
        self.sequencer.shutdown().await;
        let stats = self.sequencer.stats();
        info!(
            released = stats.released,
            tombstones = stats.tombstones,
            abandoned = stats.abandoned,
            resident = stats.resident,
            "relay stopped"
        );
    }
}

/// Guards the window between tagging a payload and the first stage
/// accepting it.
struct Handoff<'a, R: Send + 'static> {
    buffer: &'a ReorderBuffer<R>,
    seq: SequenceNumber,
    armed: bool,
}

impl<'a, R: Send + 'static> Handoff<'a, R> {
    fn new(buffer: &'a ReorderBuffer<R>, seq: SequenceNumber) -> Self {
        Self {
            buffer,
            seq,
            armed: true,
        }
    }

    fn finish(mut self) -> SequenceNumber {
        self.armed = false;
        self.seq
    }
}

impl<R: Send + 'static> Drop for Handoff<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let seq = self.seq;
        warn!(seq, "ingest cancelled before the first stage took the payload");
        if let Err(e) = self
            .buffer
            .fail(seq, FailureReason::stage(INGRESS, "submission cancelled"))
        {
            debug!(seq, error = %e, "cancelled ingest already resolved");
        }
    }
}
