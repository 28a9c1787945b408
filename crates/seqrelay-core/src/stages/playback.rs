//! Playback sink: the consumer end of the ordered stream.
//!
//! Runs on its own task, draining the [`SinkQueue`] one delivery at a time so
//! that the time spent "playing" never holds the reorder buffer's lock.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use seqrelay_types::event::{Ack, SpeechClip};
use seqrelay_types::sequence::{Delivery, SequenceNumber};

use crate::sink::SinkQueue;

/// Totals from one [`PlaybackSink::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackSummary {
    /// Clips played.
    pub played: u64,
    /// Tombstones acknowledged as failures.
    pub skipped: u64,
    /// Highest sequence number seen.
    pub last_seq: Option<SequenceNumber>,
}

/// Plays clips for a fixed duration each and acknowledges every delivery.
pub struct PlaybackSink {
    delay: Duration,
}

impl PlaybackSink {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Handle one delivery.
    pub async fn play(&self, seq: SequenceNumber, delivery: Delivery<SpeechClip>) -> Ack {
        match delivery {
            Delivery::Result(clip) => {
                tokio::time::sleep(self.delay).await;
                info!(seq, bytes = clip.audio.len(), text = %clip.text, "clip played");
                Ack::ok(seq, format!("played {} bytes", clip.audio.len()))
            }
            Delivery::Tombstone(reason) => {
                warn!(seq, %reason, "skipping tombstone");
                Ack::failed(seq, format!("tombstone: {reason}"))
            }
        }
    }

    /// Consume `queue` until it ends or `cancel` fires, passing every ack to
    /// `on_ack`.
    pub async fn run<F>(
        &self,
        mut queue: SinkQueue<SpeechClip>,
        cancel: CancellationToken,
        mut on_ack: F,
    ) -> PlaybackSummary
    where
        F: FnMut(&Ack) + Send,
    {
        let mut summary = PlaybackSummary::default();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = queue.recv() => next,
            };
            let Some((seq, delivery)) = next else {
                break;
            };
            if let Some(last) = summary.last_seq
                && seq <= last
            {
                error!(seq, last, "ordered stream went backwards");
            }
            summary.last_seq = Some(seq);

            let ack = self.play(seq, delivery).await;
            if ack.success {
                summary.played += 1;
            } else {
                summary.skipped += 1;
            }
            on_ack(&ack);
        }
        info!(
            played = summary.played,
            skipped = summary.skipped,
            "playback stopped"
        );
        summary
    }
}
