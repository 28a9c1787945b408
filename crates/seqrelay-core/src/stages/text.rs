//! Event-to-text commentary stage.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use seqrelay_types::error::StageError;
use seqrelay_types::event::RelayEvent;
use seqrelay_types::sequence::SequenceNumber;

use super::latency::LatencyModel;
use crate::pipeline::Stage;

/// Renders an event's attributes as `"k is v, k is v"`.
pub struct EventToText {
    latency: LatencyModel,
    errors: AtomicU64,
}

impl EventToText {
    pub fn new(latency: LatencyModel) -> Self {
        Self {
            latency,
            errors: AtomicU64::new(0),
        }
    }

    /// Items this stage has failed.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn render(event: &RelayEvent) -> String {
        event
            .data
            .iter()
            .map(|(k, v)| format!("{k} is {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl Stage<RelayEvent, String> for EventToText {
    fn name(&self) -> &str {
        "event_to_text"
    }

    async fn process(&self, seq: SequenceNumber, event: RelayEvent) -> Result<String, StageError> {
        if event.data.is_empty() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(StageError::Rejected(format!("event {} has no data", event.id)));
        }
        if self.latency.simulate().await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(StageError::Processing("text generation failed".into()));
        }
        let text = Self::render(&event);
        debug!(seq, chars = text.len(), "event rendered");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn renders_sorted_pairs() {
        let stage = EventToText::new(LatencyModel::fixed(Duration::ZERO));
        let event = RelayEvent::new("1").with("status", "active").with("key_1", "value_1");
        let text = stage.process(1, event).await.unwrap();
        assert_eq!(text, "key_1 is value_1, status is active");
    }

    #[tokio::test]
    async fn empty_event_is_rejected() {
        let stage = EventToText::new(LatencyModel::fixed(Duration::ZERO));
        let err = stage.process(1, RelayEvent::new("7")).await.unwrap_err();
        assert_eq!(err, StageError::Rejected("event 7 has no data".into()));
        assert_eq!(stage.error_count(), 1);
    }

    #[tokio::test]
    async fn injected_failure_counts() {
        let stage = EventToText::new(LatencyModel::new(Duration::ZERO, Duration::ZERO, 1.0));
        let event = RelayEvent::new("1").with("a", "b");
        assert!(stage.process(1, event).await.is_err());
        assert_eq!(stage.error_count(), 1);
    }
}
