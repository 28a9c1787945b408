//! Bursty event source feeding a relay.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seqrelay_types::config::SourceConfig;
use seqrelay_types::error::RelayError;
use seqrelay_types::event::RelayEvent;

use super::extractor::{EventExtractor, ExtractionStats};
use crate::pipeline::Relay;

/// What a [`BurstSource::run`] accomplished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Events accepted by the relay.
    pub submitted: u64,
    /// Events dropped because the window was full.
    pub shed: u64,
    pub extraction: ExtractionStats,
}

/// Emits `burst_size` events `spacing_ms` apart, then pauses `pause_ms`.
pub struct BurstSource {
    config: SourceConfig,
    extractor: EventExtractor,
}

impl BurstSource {
    pub fn new(config: SourceConfig, extractor: EventExtractor) -> Self {
        Self { config, extractor }
    }

    /// Cap the number of events, overriding the config.
    pub fn with_limit(mut self, total_events: Option<u64>) -> Self {
        if total_events.is_some() {
            self.config.total_events = total_events;
        }
        self
    }

    /// Feed `relay` until the event limit, cancellation, or relay shutdown.
    ///
    /// Under the `reject` overflow policy a full window sheds the event and
    /// the source carries on.
    pub async fn run<R: Send + 'static>(
        mut self,
        relay: &Relay<RelayEvent, R>,
        cancel: CancellationToken,
    ) -> SourceReport {
        let spacing = Duration::from_millis(self.config.spacing_ms);
        let pause = Duration::from_millis(self.config.pause_ms);
        let limit = self.config.total_events;
        let mut submitted = 0u64;
        let mut shed = 0u64;

        'bursts: loop {
            for i in 0..self.config.burst_size {
                if limit.is_some_and(|n| submitted + shed >= n) {
                    break 'bursts;
                }
                if i > 0 && !pause_for(spacing, &cancel).await {
                    break 'bursts;
                }

                let event = self.extractor.extract();
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break 'bursts,
                    outcome = relay.ingest(event) => outcome,
                };
                match outcome {
                    Ok(seq) => {
                        submitted += 1;
                        debug!(seq, "event submitted");
                    }
                    Err(e @ RelayError::Overloaded { .. }) => {
                        shed += 1;
                        warn!(error = %e, "event shed");
                    }
                    Err(e) => {
                        info!(error = %e, "relay stopped accepting events");
                        break 'bursts;
                    }
                }
            }
            if limit.is_some_and(|n| submitted + shed >= n) || !pause_for(pause, &cancel).await {
                break;
            }
        }

        info!(submitted, shed, "source finished");
        SourceReport {
            submitted,
            shed,
            extraction: self.extractor.stats(),
        }
    }
}

/// Sleep unless cancelled first; `false` means cancelled.
async fn pause_for(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
