//! Error types for the seqrelay pipeline.
//!
//! Provides [`RelayError`] as the top-level error type and [`StageError`]
//! for failures raised by an individual stage transformation. Both are
//! non-exhaustive to allow future extension without breaking downstream.

use thiserror::Error;

use crate::sequence::SequenceNumber;

/// Top-level error type for the relay.
///
/// Nothing in the sequencer is fatal to the process. Variants are grouped
/// into reported signals (the call was ignored, state is unchanged),
/// ingress backpressure, and configuration/I/O failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    // ── Reported, state unchanged ────────────────────────────────────

    /// A second terminal signal arrived for an already-resolved number.
    #[error("duplicate completion for sequence {seq}")]
    DuplicateCompletion {
        /// The sequence number that was signalled twice.
        seq: SequenceNumber,
    },

    /// A terminal signal arrived for a number the tagger never issued.
    #[error("unknown sequence {seq}")]
    UnknownSequence {
        /// The unissued sequence number.
        seq: SequenceNumber,
    },

    // ── Resolved as tombstones ───────────────────────────────────────

    /// An item stayed pending past its deadline.
    #[error("sequence {seq} timed out")]
    Timeout {
        /// The expired sequence number.
        seq: SequenceNumber,
    },

    /// A stage worker reported a processing failure.
    #[error("stage {stage} failed on sequence {seq}: {reason}")]
    StageFailure {
        /// The failed sequence number.
        seq: SequenceNumber,
        /// Name of the stage that failed.
        stage: String,
        /// Stage-supplied failure description.
        reason: String,
    },

    // ── Ingress ──────────────────────────────────────────────────────

    /// The in-flight window is full and the overflow policy rejects.
    #[error("overloaded: {in_flight} of {max_window} window slots in use")]
    Overloaded {
        /// Items currently issued but not released.
        in_flight: usize,
        /// Configured window size.
        max_window: usize,
    },

    /// The relay, window or worker pool has been shut down.
    #[error("relay closed")]
    Closed,

    // ── Configuration ────────────────────────────────────────────────

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether this error is a reported-and-ignored signal rather than a
    /// failure the caller must act on.
    pub fn is_reported_only(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCompletion { .. } | Self::UnknownSequence { .. }
        )
    }
}

/// Error returned by a stage transformation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StageError {
    /// The stage refused the input (malformed, unsupported).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The stage accepted the input but processing failed.
    #[error("processing failed: {0}")]
    Processing(String),
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RelayError>;
