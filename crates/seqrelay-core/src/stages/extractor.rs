//! Numbered event extraction for the demo source.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use seqrelay_types::event::RelayEvent;

/// Counters reported by [`EventExtractor::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_events: u64,
    /// Seconds since the extractor was created.
    pub runtime_secs: f64,
    /// Mean seconds between consecutive events (0 with fewer than two).
    pub average_interval_secs: f64,
}

/// Produces events `{key_n: value_n, timestamp, status, source, sequence}`.
pub struct EventExtractor {
    source: String,
    count: u64,
    started: Instant,
    first: Option<Instant>,
    last: Option<Instant>,
}

impl EventExtractor {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            count: 0,
            started: Instant::now(),
            first: None,
            last: None,
        }
    }

    /// Extract the next event.
    pub fn extract(&mut self) -> RelayEvent {
        self.count += 1;
        let now = Instant::now();
        if self.first.is_none() {
            self.first = Some(now);
        }
        self.last = Some(now);

        let n = self.count;
        let event = RelayEvent::new(n.to_string());
        let timestamp = event.timestamp.to_rfc3339();
        let event = event
            .with(format!("key_{n}"), format!("value_{n}"))
            .with("timestamp", timestamp)
            .with("status", "active")
            .with("source", self.source.clone())
            .with("sequence", n.to_string());
        debug!(event_id = %event.id, "event extracted");
        event
    }

    pub fn stats(&self) -> ExtractionStats {
        let average_interval_secs = match (self.first, self.last) {
            (Some(first), Some(last)) if self.count > 1 => {
                (last - first).as_secs_f64() / (self.count - 1) as f64
            }
            _ => 0.0,
        };
        ExtractionStats {
            total_events: self.count,
            runtime_secs: self.started.elapsed().as_secs_f64(),
            average_interval_secs,
        }
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new("seqrelay")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn events_are_numbered() {
        let mut extractor = EventExtractor::new("module-a");
        let first = extractor.extract();
        let second = extractor.extract();
        assert_eq!(first.id, "1");
        assert_eq!(first.data["key_1"], "value_1");
        assert_eq!(second.data["sequence"], "2");
        assert_eq!(second.data["source"], "module-a");
        assert_eq!(second.data["status"], "active");
        assert!(second.data.contains_key("timestamp"));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_track_intervals() {
        let mut extractor = EventExtractor::default();
        assert_eq!(extractor.stats().average_interval_secs, 0.0);
        for _ in 0..3 {
            extractor.extract();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        let stats = extractor.stats();
        assert_eq!(stats.total_events, 3);
        assert!((stats.average_interval_secs - 0.5).abs() < 1e-9);
        assert!((stats.runtime_secs - 1.5).abs() < 1e-9);
    }
}
