//! The speech relay: extraction, commentary, synthesis and playback.
//!
//! [`SpeechRelay::start`] wires an ordered relay out of a [`RelayConfig`]:
//!
//! ```text
//! BurstSource -> tagger -> EventToText pool -> TextToSpeech pool
//!             -> reorder buffer -> handoff queue -> PlaybackSink
//! ```

pub mod extractor;
pub mod latency;
pub mod playback;
pub mod source;
pub mod speech;
pub mod text;

pub use extractor::{EventExtractor, ExtractionStats};
pub use latency::LatencyModel;
pub use playback::{PlaybackSink, PlaybackSummary};
pub use source::{BurstSource, SourceReport};
pub use speech::TextToSpeech;
pub use text::EventToText;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use seqrelay_types::config::RelayConfig;
use seqrelay_types::event::{Ack, RelayEvent, SpeechClip};

use crate::pipeline::{PoolProbe, Relay, RelayStats, Stage, StageOutput, StageWorkerPool};
use crate::sequencer::Sequencer;
use crate::sink::{SinkQueue, handoff};

/// A running speech relay and the consumer end of its ordered stream.
pub struct SpeechRelay {
    relay: Relay<RelayEvent, SpeechClip>,
    queue: Option<SinkQueue<SpeechClip>>,
    text: Arc<EventToText>,
}

/// Outcome of [`SpeechRelay::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoReport {
    pub source: SourceReport,
    pub playback: PlaybackSummary,
    pub relay: RelayStats,
    /// Failures counted by the event-to-text stage.
    pub text_errors: u64,
}

impl SpeechRelay {
    /// Build the relay from `config`. Must be called inside a tokio runtime.
    pub fn start(config: &RelayConfig) -> Self {
        let (sink, queue) = handoff::<SpeechClip>();
        let sequencer = Sequencer::<SpeechClip>::start(&config.sequencer, Arc::new(sink));
        let window = config.sequencer.max_window;
        // A worker still busy a full item deadline into shutdown is hung.
        let drain_timeout = config.sequencer.per_item_deadline();

        let tts = Arc::new(StageWorkerPool::<String, SpeechClip>::from_config(
            Arc::new(TextToSpeech::new(LatencyModel::from_config(
                &config.stages.text_to_speech,
            ))),
            &config.stages.text_to_speech,
            window,
            Arc::clone(sequencer.buffer()) as Arc<dyn StageOutput<SpeechClip>>,
        )
        .with_drain_timeout(drain_timeout));

        let text = Arc::new(EventToText::new(LatencyModel::from_config(
            &config.stages.event_to_text,
        )));
        let e2t = Arc::new(StageWorkerPool::<RelayEvent, String>::from_config(
            Arc::clone(&text) as Arc<dyn Stage<RelayEvent, String>>,
            &config.stages.event_to_text,
            window,
            Arc::clone(&tts) as Arc<dyn StageOutput<String>>,
        )
        .with_drain_timeout(drain_timeout));

        let probes = vec![
            Arc::clone(&e2t) as Arc<dyn PoolProbe>,
            tts as Arc<dyn PoolProbe>,
        ];
        let relay = Relay::new(sequencer, e2t, probes);
        info!(window, "speech relay started");

        Self {
            relay,
            queue: Some(queue),
            text,
        }
    }

    pub fn relay(&self) -> &Relay<RelayEvent, SpeechClip> {
        &self.relay
    }

    /// Take the ordered output queue; `None` if already taken.
    pub fn take_queue(&mut self) -> Option<SinkQueue<SpeechClip>> {
        self.queue.take()
    }

    /// Drive the relay with a [`BurstSource`] and play everything it
    /// releases.
    ///
    /// Stops after `config.source.total_events` (or `limit`, if given) or
    /// when `cancel` fires, then drains the stages so every submitted event
    /// is acknowledged before returning.
    pub async fn run<F>(
        mut self,
        config: &RelayConfig,
        limit: Option<u64>,
        cancel: CancellationToken,
        on_ack: F,
    ) -> DemoReport
    where
        F: FnMut(&Ack) + Send + 'static,
    {
        let queue = self.queue.take().unwrap_or_else(|| {
            // Already taken: give playback an empty, closed stream.
            let (_, queue) = handoff::<SpeechClip>();
            queue
        });
        let playback = PlaybackSink::new(config.playback.delay());
        let playback_task = tokio::spawn(async move {
            playback
                .run(queue, CancellationToken::new(), on_ack)
                .await
        });

        let source = BurstSource::new(config.source.clone(), EventExtractor::new("seqrelay"))
            .with_limit(limit);
        let source = source.run(&self.relay, cancel).await;

        self.relay.shutdown().await;
        let relay = self.relay.stats();
        let text_errors = self.text.error_count();
        // Dropping the relay drops the buffer's sink, which ends the queue.
        drop(self);

        let playback = match playback_task.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "playback task ended abnormally");
                PlaybackSummary::default()
            }
        };

        DemoReport {
            source,
            playback,
            relay,
            text_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use seqrelay_types::config::{OverflowPolicy, StageConfig};

    fn quiet_config(total: u64) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.stages.event_to_text = StageConfig {
            workers: 3,
            min_delay_ms: 100,
            max_delay_ms: 900,
            ..StageConfig::default()
        };
        config.stages.text_to_speech = StageConfig {
            workers: 2,
            min_delay_ms: 50,
            max_delay_ms: 300,
            ..StageConfig::default()
        };
        config.playback.delay_ms = 100;
        config.source.burst_size = 3;
        config.source.spacing_ms = 50;
        config.source.pause_ms = 200;
        config.source.total_events = Some(total);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn demo_plays_every_event_in_order() {
        let config = quiet_config(10);
        let acks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acks);

        let report = SpeechRelay::start(&config)
            .run(&config, None, CancellationToken::new(), move |ack: &Ack| {
                sink.lock().push(ack.seq)
            })
            .await;

        assert_eq!(report.source.submitted, 10);
        assert_eq!(report.playback.played, 10);
        assert_eq!(report.relay.sequencer.released, 10);
        assert_eq!(*acks.lock(), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_become_failed_acks() {
        let mut config = quiet_config(6);
        config.stages.event_to_text.failure_rate = 1.0;
        let acks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acks);

        let report = SpeechRelay::start(&config)
            .run(&config, None, CancellationToken::new(), move |ack: &Ack| {
                sink.lock().push((ack.seq, ack.success))
            })
            .await;

        assert_eq!(report.playback.skipped, 6);
        assert_eq!(report.text_errors, 6);
        assert_eq!(report.relay.sequencer.tombstones, 6);
        assert!(acks.lock().iter().all(|(_, ok)| !ok));
    }

    #[tokio::test(start_paused = true)]
    async fn reject_policy_sheds_excess_events() {
        let mut config = quiet_config(8);
        config.sequencer.max_window = 2;
        config.sequencer.overflow = OverflowPolicy::Reject;
        config.source.burst_size = 8;
        config.source.spacing_ms = 1;

        let report = SpeechRelay::start(&config)
            .run(&config, None, CancellationToken::new(), |_| {})
            .await;

        assert_eq!(report.source.submitted + report.source.shed, 8);
        assert!(report.source.shed > 0);
        assert_eq!(report.playback.played, report.source.submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_overrides_config() {
        let config = quiet_config(100);
        let report = SpeechRelay::start(&config)
            .run(&config, Some(4), CancellationToken::new(), |_| {})
            .await;
        assert_eq!(report.source.submitted, 4);
        assert_eq!(report.playback.played, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_an_unbounded_source() {
        let mut config = quiet_config(0);
        config.source.total_events = None;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let report = SpeechRelay::start(&config)
            .run(&config, None, cancel, |_| {})
            .await;
        assert!(report.source.submitted > 0);
        assert_eq!(
            report.playback.played + report.playback.skipped,
            report.source.submitted
        );
    }
}
