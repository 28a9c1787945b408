//! Ingress sequence tagger with window backpressure.
//!
//! [`Tagger::tag`] takes one window permit, then issues and registers the
//! next number inside the reorder buffer's critical section. Because issue
//! and registration are a single step, numbers are unique and strictly
//! increasing under concurrent callers, and the buffer knows about a number
//! before any stage can signal it.

use std::sync::Arc;

use tokio::sync::TryAcquireError;
use tracing::debug;

use seqrelay_types::config::OverflowPolicy;
use seqrelay_types::error::{RelayError, Result};
use seqrelay_types::sequence::SequenceNumber;

use super::reorder::ReorderBuffer;

/// A payload paired with the sequence number it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<P> {
    /// Issued sequence number.
    pub seq: SequenceNumber,
    /// The caller's payload, unchanged.
    pub payload: P,
}

/// Assigns sequence numbers at ingress.
pub struct Tagger<R> {
    buffer: Arc<ReorderBuffer<R>>,
    policy: OverflowPolicy,
}

impl<R> Clone for Tagger<R> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            policy: self.policy,
        }
    }
}

impl<R: Send + 'static> Tagger<R> {
    /// Create a tagger issuing numbers into `buffer`'s window.
    pub fn new(buffer: Arc<ReorderBuffer<R>>, policy: OverflowPolicy) -> Self {
        Self { buffer, policy }
    }

    /// Tag `payload` according to the configured overflow policy.
    ///
    /// Under [`OverflowPolicy::Block`] this waits for window capacity;
    /// under [`OverflowPolicy::Reject`] a full window fails with
    /// [`RelayError::Overloaded`]. Fails with [`RelayError::Closed`] once the
    /// buffer is closed.
    pub async fn tag<P>(&self, payload: P) -> Result<Tagged<P>> {
        match self.policy {
            OverflowPolicy::Block => {
                let permit = self
                    .buffer
                    .window()
                    .acquire()
                    .await
                    .map_err(|_| RelayError::Closed)?;
                permit.forget();
                self.issue(payload)
            }
            OverflowPolicy::Reject => self.try_tag(payload),
        }
    }

    /// Tag `payload` without waiting, regardless of policy.
    pub fn try_tag<P>(&self, payload: P) -> Result<Tagged<P>> {
        match self.buffer.window().try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => {
                let in_flight = self.buffer.in_flight();
                debug!(in_flight, "window full, rejecting ingress");
                return Err(RelayError::Overloaded {
                    in_flight,
                    max_window: self.buffer.max_window(),
                });
            }
            Err(TryAcquireError::Closed) => return Err(RelayError::Closed),
        }
        self.issue(payload)
    }

    fn issue<P>(&self, payload: P) -> Result<Tagged<P>> {
        match self.buffer.admit() {
            Ok(seq) => Ok(Tagged { seq, payload }),
            Err(e) => {
                // Hand the permit back; the number was never issued.
                self.buffer.window().add_permits(1);
                Err(e)
            }
        }
    }

    /// The overflow policy in effect.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}
