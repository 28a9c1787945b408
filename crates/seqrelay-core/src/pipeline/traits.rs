//! Stage and stage-output trait definitions.
//!
//! A relay is a chain of [`Stage`]s, each running on its own bounded worker
//! pool. Every pool reports exactly one terminal signal per item to a
//! [`StageOutput`]: either the next pool (which treats a result as new
//! input) or, at the end of the chain, the reorder buffer.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use seqrelay_types::error::{RelayError, StageError};
use seqrelay_types::sequence::{FailureReason, SequenceNumber};

use crate::sequencer::ReorderBuffer;

/// One variable-latency transformation in the relay.
#[async_trait]
pub trait Stage<I, O>: Send + Sync {
    /// Stable stage name used in logs and failure reasons.
    fn name(&self) -> &str;

    /// Transform `input` for item `seq`.
    async fn process(&self, seq: SequenceNumber, input: I) -> Result<O, StageError>;
}

/// Receiver of a stage's terminal signals.
#[async_trait]
pub trait StageOutput<T>: Send + Sync {
    /// Item `seq` finished with `value`.
    async fn emit(&self, seq: SequenceNumber, value: T);

    /// Item `seq` failed permanently.
    async fn emit_failure(&self, seq: SequenceNumber, reason: FailureReason);

    /// Stop accepting work once everything already accepted is done.
    ///
    /// Pools cascade this to their own output so closing the head of a
    /// chain drains the whole chain.
    async fn close(&self) {}
}

/// Terminal output: signals go straight into the reorder buffer.
///
/// Duplicate and unknown signals are reported (logged) and otherwise
/// ignored, as the buffer leaves its state untouched for them.
#[async_trait]
impl<R: Send + 'static> StageOutput<R> for ReorderBuffer<R> {
    async fn emit(&self, seq: SequenceNumber, value: R) {
        report(seq, self.complete(seq, value));
    }

    async fn emit_failure(&self, seq: SequenceNumber, reason: FailureReason) {
        report(seq, self.fail(seq, reason));
    }
}

fn report(seq: SequenceNumber, outcome: Result<usize, RelayError>) {
    match outcome {
        Ok(released) => {
            if released > 0 {
                debug!(seq, released, "signal released ordered items");
            }
        }
        Err(e) if e.is_reported_only() => {
            warn!(seq, error = %e, "signal ignored by reorder buffer")
        }
        Err(e) => error!(seq, error = %e, "reorder buffer rejected signal"),
    }
}
