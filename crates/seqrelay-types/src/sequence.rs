//! Sequence numbering and delivery types.
//!
//! Every event entering the relay is tagged with a [`SequenceNumber`]. The
//! sink receives one [`Delivery`] per number, either the final stage's
//! result or a tombstone carrying the [`FailureReason`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Submission-order identifier assigned at ingress.
pub type SequenceNumber = u64;

/// Lifecycle state of an item inside the in-flight window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Issued, not yet signalled by its stage.
    Pending,
    /// Completed with a result, waiting for lower numbers to resolve.
    Completed,
    /// Failed or expired, waiting for lower numbers to resolve.
    Failed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why an item was released as a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The item was never signalled before its deadline.
    Timeout,
    /// A stage reported a processing error.
    Stage {
        /// Name of the stage that failed.
        stage: String,
        /// Failure description.
        message: String,
    },
    /// The relay shut down before the item was signalled.
    Shutdown,
}

impl FailureReason {
    /// Build a stage failure reason.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Whether this reason is an expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// The error describing this reason for `seq`.
    pub fn to_error(&self, seq: SequenceNumber) -> RelayError {
        match self {
            Self::Timeout => RelayError::Timeout { seq },
            Self::Stage { stage, message } => RelayError::StageFailure {
                seq,
                stage: stage.clone(),
                reason: message.clone(),
            },
            Self::Shutdown => RelayError::Closed,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Stage { stage, message } => write!(f, "{stage}: {message}"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What the sink receives for one sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery<R> {
    /// The final stage's result.
    Result(R),
    /// Placeholder for a permanently failed or expired item.
    Tombstone(FailureReason),
}

impl<R> Delivery<R> {
    /// Whether this delivery is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone(_))
    }

    /// The result, if this delivery carries one.
    pub fn result(&self) -> Option<&R> {
        match self {
            Self::Result(r) => Some(r),
            Self::Tombstone(_) => None,
        }
    }

    /// Consume the delivery, returning the result if present.
    pub fn into_result(self) -> Option<R> {
        match self {
            Self::Result(r) => Some(r),
            Self::Tombstone(_) => None,
        }
    }

    /// Map the carried result, leaving tombstones untouched.
    pub fn map<T>(self, f: impl FnOnce(R) -> T) -> Delivery<T> {
        match self {
            Self::Result(r) => Delivery::Result(f(r)),
            Self::Tombstone(reason) => Delivery::Tombstone(reason),
        }
    }
}
