//! Sink contract and the single-consumer handoff queue.
//!
//! The reorder buffer calls [`Sink::accept`] synchronously from its drain
//! loop, once per sequence number, in strictly increasing order. Sinks whose
//! own work is slow (playback) should not do it inside `accept`: use
//! [`handoff`] to get a [`ChannelSink`] that forwards deliveries into an
//! unbounded tokio MPSC queue and a [`SinkQueue`] that a single consumer task
//! drains at its own pace. The core's responsibility ends at that handoff.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use seqrelay_types::sequence::{Delivery, SequenceNumber};

/// Consumer of the ordered output stream.
///
/// Implementations must not call back into the reorder buffer: `accept`
/// runs while the buffer's lock is held.
pub trait Sink<R>: Send + Sync {
    /// Receive the delivery for `seq`.
    fn accept(&self, seq: SequenceNumber, delivery: Delivery<R>);
}

/// One ordered delivery as seen by a queue consumer.
pub type Released<R> = (SequenceNumber, Delivery<R>);

/// Create a connected [`ChannelSink`] / [`SinkQueue`] pair.
pub fn handoff<R>() -> (ChannelSink<R>, SinkQueue<R>) {
    let (tx, rx) = mpsc::unbounded_channel();
    debug!("sink handoff queue created");
    (ChannelSink { tx }, SinkQueue { rx })
}

/// Sink that forwards every delivery into the handoff queue.
pub struct ChannelSink<R> {
    tx: mpsc::UnboundedSender<Released<R>>,
}

impl<R: Send> Sink<R> for ChannelSink<R> {
    fn accept(&self, seq: SequenceNumber, delivery: Delivery<R>) {
        if self.tx.send((seq, delivery)).is_err() {
            // The consumer went away; the ordered stream has nowhere to go.
            debug!(seq, "sink queue consumer dropped, delivery discarded");
        }
    }
}

/// Consumer side of the handoff queue.
pub struct SinkQueue<R> {
    rx: mpsc::UnboundedReceiver<Released<R>>,
}

impl<R> SinkQueue<R> {
    /// Wait for the next ordered delivery.
    ///
    /// Returns `None` once the buffer (and with it the [`ChannelSink`]) has
    /// been dropped and every queued delivery has been consumed.
    pub async fn recv(&mut self) -> Option<Released<R>> {
        self.rx.recv().await
    }

    /// Take the next delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<Released<R>> {
        self.rx.try_recv().ok()
    }

    /// Number of deliveries waiting to be consumed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no deliveries are waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// In-memory sink that records every delivery, in order.
pub struct CollectingSink<R> {
    delivered: Mutex<Vec<Released<R>>>,
}

impl<R> CollectingSink<R> {
    /// Create an empty collecting sink.
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Sequence numbers delivered so far, in delivery order.
    pub fn sequence_numbers(&self) -> Vec<SequenceNumber> {
        self.delivered.lock().iter().map(|(seq, _)| *seq).collect()
    }

    /// Number of deliveries so far.
    pub fn len(&self) -> usize {
        self.delivered.lock().len()
    }

    /// Whether nothing has been delivered yet.
    pub fn is_empty(&self) -> bool {
        self.delivered.lock().is_empty()
    }

    /// Take every delivery recorded so far.
    pub fn take(&self) -> Vec<Released<R>> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

impl<R: Clone> CollectingSink<R> {
    /// Copy of every delivery recorded so far.
    pub fn snapshot(&self) -> Vec<Released<R>> {
        self.delivered.lock().clone()
    }
}

impl<R> Default for CollectingSink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send> Sink<R> for CollectingSink<R> {
    fn accept(&self, seq: SequenceNumber, delivery: Delivery<R>) {
        self.delivered.lock().push((seq, delivery));
    }
}
