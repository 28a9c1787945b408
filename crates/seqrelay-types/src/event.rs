//! Relay payload types.
//!
//! [`RelayEvent`] is what the ingress source produces, [`SpeechClip`] is what
//! the final stage hands to playback, and [`Ack`] is the playback sink's
//! per-item acknowledgement.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sequence::SequenceNumber;

/// An event observed at ingress.
///
/// `data` is an ordered string map so text rendering is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Source-assigned identifier (independent of the relay's sequence).
    pub id: String,

    /// Event attributes.
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// When the event was extracted.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RelayEvent {
    /// Create an event with the given id and no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Synthesized audio for one piece of commentary text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechClip {
    /// The text that was synthesized.
    pub text: String,

    /// Encoded audio bytes.
    #[serde(default)]
    pub audio: Vec<u8>,
}

/// Acknowledgement produced by the playback sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the item was played.
    pub success: bool,

    /// Human-readable outcome.
    pub message: String,

    /// Sequence number this ack refers to.
    pub seq: SequenceNumber,
}

impl Ack {
    /// Successful acknowledgement.
    pub fn ok(seq: SequenceNumber, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            seq,
        }
    }

    /// Failed acknowledgement.
    pub fn failed(seq: SequenceNumber, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_builder_orders_keys() {
        let event = RelayEvent::new("9").with("status", "active").with("key_9", "value_9");
        let keys: Vec<_> = event.data.keys().cloned().collect();
        assert_eq!(keys, vec!["key_9", "status"]);
    }

    #[test]
    fn event_defaults_on_missing_fields() {
        let event: RelayEvent = serde_json::from_str(r#"{"id": "1"}"#).unwrap();
        assert_eq!(event.id, "1");
        assert!(event.data.is_empty());
    }

    #[test]
    fn ack_constructors() {
        let ok = Ack::ok(3, "played");
        assert!(ok.success);
        assert_eq!(ok.seq, 3);

        let failed = Ack::failed(4, "tombstone: timeout");
        assert!(!failed.success);
        assert_eq!(failed.message, "tombstone: timeout");
    }
}
