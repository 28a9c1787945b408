//! Reorder buffer: restores submission order from out-of-order completions.
//!
//! Worker pools signal `complete`/`fail` in whatever order their work
//! finishes. The buffer parks resolved items keyed by sequence number and
//! releases the longest contiguous run starting at the cursor
//! (`next_expected`) to the [`Sink`], one `accept` per number, in order.
//!
//! # Locking
//!
//! All state (issue counter, cursor, pending map, deadline queue, counters)
//! lives in one [`State`] behind a single `parking_lot::Mutex`. Insert and
//! drain happen inside the same critical section, so exactly one caller
//! releases any given ready prefix and no drain observes a half-applied
//! insertion. The sink is invoked while the lock is held.
//!
//! # Window
//!
//! Every issued number holds one permit of the window semaphore
//! (`max_window` permits). Drain returns one permit per released item after
//! the lock is dropped, which is what unblocks a waiting tagger.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use seqrelay_types::config::SequencerConfig;
use seqrelay_types::error::{RelayError, Result};
use seqrelay_types::sequence::{Delivery, FailureReason, ItemStatus, SequenceNumber};

use crate::sink::Sink;

// ── SequencedItem ────────────────────────────────────────────────────────

/// Resolution state of a window entry.
#[derive(Debug)]
enum Slot<R> {
    Pending,
    Completed(R),
    Failed(FailureReason),
}

/// One issued-but-unreleased entry of the in-flight window.
#[derive(Debug)]
pub(crate) struct SequencedItem<R> {
    seq: SequenceNumber,
    entered_at: Instant,
    slot: Slot<R>,
}

impl<R> SequencedItem<R> {
    fn new(seq: SequenceNumber, entered_at: Instant) -> Self {
        Self {
            seq,
            entered_at,
            slot: Slot::Pending,
        }
    }

    fn status(&self) -> ItemStatus {
        match self.slot {
            Slot::Pending => ItemStatus::Pending,
            Slot::Completed(_) => ItemStatus::Completed,
            Slot::Failed(_) => ItemStatus::Failed,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self.slot, Slot::Pending)
    }

    fn into_delivery(self) -> Option<Delivery<R>> {
        match self.slot {
            Slot::Pending => None,
            Slot::Completed(result) => Some(Delivery::Result(result)),
            Slot::Failed(reason) => Some(Delivery::Tombstone(reason)),
        }
    }
}

// ── Stats ────────────────────────────────────────────────────────────────

/// Point-in-time snapshot of the sequencer, taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencerStats {
    /// Lowest sequence number not yet released.
    pub next_expected: SequenceNumber,
    /// Next sequence number the tagger will issue.
    pub next_issue: SequenceNumber,
    /// Entries currently held in the window (issued, not released).
    pub resident: usize,
    /// Resident entries still waiting on their stage.
    pub awaiting_signal: usize,
    /// Configured window size.
    pub max_window: usize,
    /// Items handed to the sink (results and tombstones).
    pub released: u64,
    /// Of `released`, how many were tombstones.
    pub tombstones: u64,
    /// Items force-failed by the deadline.
    pub expired: u64,
    /// Items tombstoned because the relay shut down around them.
    pub abandoned: u64,
    /// Reported duplicate completions.
    pub duplicates: u64,
    /// Reported signals for numbers never issued.
    pub unknown: u64,
}

#[derive(Debug, Default)]
struct Counters {
    released: u64,
    tombstones: u64,
    expired: u64,
    abandoned: u64,
    duplicates: u64,
    unknown: u64,
}

// ── ReorderBuffer ────────────────────────────────────────────────────────

struct State<R> {
    base: SequenceNumber,
    next_issue: SequenceNumber,
    next_expected: SequenceNumber,
    pending: HashMap<SequenceNumber, SequencedItem<R>>,
    /// `(deadline, seq)` in admission order, hence sorted by deadline.
    /// Entries for items that resolved in the meantime are pruned lazily.
    deadlines: VecDeque<(Instant, SequenceNumber)>,
    counters: Counters,
    closed: bool,
}

/// The ordering sequencer in front of the sink.
///
/// See the module docs for the locking and window model. The sink passed
/// to [`ReorderBuffer::new`] must not call back into the buffer.
pub struct ReorderBuffer<R> {
    state: Mutex<State<R>>,
    sink: Arc<dyn Sink<R>>,
    window: Semaphore,
    max_window: usize,
    deadline: Duration,
    admitted: Notify,
}

impl<R: Send + 'static> ReorderBuffer<R> {
    /// Create a buffer from the sequencer configuration.
    pub fn new(config: &SequencerConfig, sink: Arc<dyn Sink<R>>) -> Self {
        let base = config.sequence_base;
        debug!(
            max_window = config.max_window,
            deadline_ms = config.per_item_deadline_ms,
            base,
            "reorder buffer created"
        );
        Self {
            state: Mutex::new(State {
                base,
                next_issue: base,
                next_expected: base,
                pending: HashMap::with_capacity(config.max_window),
                deadlines: VecDeque::with_capacity(config.max_window),
                counters: Counters::default(),
                closed: false,
            }),
            sink,
            window: Semaphore::new(config.max_window),
            max_window: config.max_window,
            deadline: config.per_item_deadline(),
            admitted: Notify::new(),
        }
    }

    /// Issue the next sequence number and register it as pending.
    ///
    /// The caller must already hold (and have forgotten) one window permit;
    /// see [`Tagger`](super::Tagger).
    pub(crate) fn admit(&self) -> Result<SequenceNumber> {
        let now = Instant::now();
        let (seq, wake_reaper) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(RelayError::Closed);
            }
            let seq = state.next_issue;
            state.next_issue += 1;
            state.pending.insert(seq, SequencedItem::new(seq, now));
            let wake_reaper = state.deadlines.is_empty();
            state.deadlines.push_back((now + self.deadline, seq));
            (seq, wake_reaper)
        };
        if wake_reaper {
            self.admitted.notify_one();
        }
        trace!(seq, "sequence admitted to window");
        Ok(seq)
    }

    /// Record a successful result for `seq` and release any ready prefix.
    ///
    /// Returns how many items were handed to the sink. A second signal for
    /// the same number fails with [`RelayError::DuplicateCompletion`] and
    /// leaves state untouched.
    pub fn complete(&self, seq: SequenceNumber, result: R) -> Result<usize> {
        self.resolve(seq, Slot::Completed(result))
    }

    /// Record a permanent failure for `seq` and release any ready prefix.
    ///
    /// The item is released as a tombstone once every lower number has
    /// been resolved, so a failure never blocks the stream.
    pub fn fail(&self, seq: SequenceNumber, reason: FailureReason) -> Result<usize> {
        self.resolve(seq, Slot::Failed(reason))
    }

    fn resolve(&self, seq: SequenceNumber, slot: Slot<R>) -> Result<usize> {
        let released = {
            let mut state = self.state.lock();
            if seq < state.base || seq >= state.next_issue {
                state.counters.unknown += 1;
                return Err(RelayError::UnknownSequence { seq });
            }
            let resolved = match state.pending.get_mut(&seq) {
                Some(item) if item.is_pending() => {
                    item.slot = slot;
                    true
                }
                // Already resolved, or already released below the cursor.
                _ => false,
            };
            if !resolved {
                state.counters.duplicates += 1;
                return Err(RelayError::DuplicateCompletion { seq });
            }
            self.drain(&mut state)
        };
        self.release_capacity(released);
        Ok(released)
    }

    /// Expire `seq` if it is still pending and its deadline has passed.
    ///
    /// Returns `true` if the item was converted to a timeout tombstone.
    pub fn expire(&self, seq: SequenceNumber, now: Instant) -> bool {
        let released = {
            let mut state = self.state.lock();
            let deadline = self.deadline;
            let overdue = match state.pending.get_mut(&seq) {
                Some(item) if item.is_pending() && now >= item.entered_at + deadline => {
                    mark_expired(item, now);
                    true
                }
                _ => false,
            };
            if !overdue {
                return false;
            }
            state.counters.expired += 1;
            self.drain(&mut state)
        };
        self.release_capacity(released);
        true
    }

    /// Expire every pending item whose deadline is at or before `now`.
    ///
    /// Returns the number of items expired.
    pub fn expire_overdue(&self, now: Instant) -> usize {
        let (expired, released) = {
            let mut state = self.state.lock();
            let mut expired = 0;
            while let Some(&(deadline, seq)) = state.deadlines.front() {
                if deadline > now {
                    break;
                }
                state.deadlines.pop_front();
                if let Some(item) = state.pending.get_mut(&seq)
                    && item.is_pending()
                {
                    mark_expired(item, now);
                    expired += 1;
                }
            }
            state.counters.expired += expired as u64;
            let released = if expired > 0 { self.drain(&mut state) } else { 0 };
            (expired, released)
        };
        self.release_capacity(released);
        expired
    }

    /// Tombstone every item still pending with `reason`.
    ///
    /// Used at shutdown so that no issued number is left unresolved once
    /// the reaper stops. Returns the number of items abandoned.
    pub fn abandon_pending(&self, reason: FailureReason) -> usize {
        let (abandoned, released) = {
            let mut state = self.state.lock();
            let mut abandoned = 0;
            for item in state.pending.values_mut().filter(|i| i.is_pending()) {
                item.slot = Slot::Failed(reason.clone());
                abandoned += 1;
            }
            state.counters.abandoned += abandoned as u64;
            state.deadlines.clear();
            let released = if abandoned > 0 { self.drain(&mut state) } else { 0 };
            (abandoned, released)
        };
        self.release_capacity(released);
        if abandoned > 0 {
            warn!(abandoned, %reason, "pending items released as tombstones");
        }
        abandoned
    }

    /// The earliest deadline among items still pending, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut state = self.state.lock();
        let State {
            pending, deadlines, ..
        } = &mut *state;
        while let Some(&(deadline, seq)) = deadlines.front() {
            if pending.get(&seq).is_some_and(SequencedItem::is_pending) {
                return Some(deadline);
            }
            deadlines.pop_front();
        }
        None
    }

    /// Release the contiguous ready run starting at the cursor.
    ///
    /// Must be called with the lock held. Stops at the first number that is
    /// missing or still pending.
    fn drain(&self, state: &mut State<R>) -> usize {
        let mut released = 0;
        loop {
            let seq = state.next_expected;
            let item = match state.pending.entry(seq) {
                Entry::Occupied(entry) if !entry.get().is_pending() => entry.remove(),
                _ => break,
            };
            let Some(delivery) = item.into_delivery() else {
                break;
            };
            if let Delivery::Tombstone(reason) = &delivery {
                debug!(error = %reason.to_error(seq), "releasing tombstone");
                state.counters.tombstones += 1;
            }
            self.sink.accept(seq, delivery);
            state.next_expected += 1;
            state.counters.released += 1;
            released += 1;
        }
        if released > 0 {
            trace!(
                released,
                next_expected = state.next_expected,
                "drained ready prefix"
            );
        }
        released
    }

    /// Return window capacity for released items.
    fn release_capacity(&self, released: usize) {
        if released > 0 {
            self.window.add_permits(released);
        }
    }

    /// Stop admitting new numbers and wake any blocked tagger.
    ///
    /// Items already in the window can still be completed, failed and
    /// expired.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.window.close();
        debug!("reorder buffer closed to new admissions");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of cursor, window occupancy and counters.
    pub fn stats(&self) -> SequencerStats {
        let state = self.state.lock();
        SequencerStats {
            next_expected: state.next_expected,
            next_issue: state.next_issue,
            resident: state.pending.len(),
            awaiting_signal: state.pending.values().filter(|i| i.is_pending()).count(),
            max_window: self.max_window,
            released: state.counters.released,
            tombstones: state.counters.tombstones,
            expired: state.counters.expired,
            abandoned: state.counters.abandoned,
            duplicates: state.counters.duplicates,
            unknown: state.counters.unknown,
        }
    }

    /// Lowest sequence number not yet released.
    pub fn next_expected(&self) -> SequenceNumber {
        self.state.lock().next_expected
    }

    /// Number of issued-but-unreleased items.
    pub fn in_flight(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Status of `seq` if it is still resident.
    pub fn status_of(&self, seq: SequenceNumber) -> Option<ItemStatus> {
        self.state.lock().pending.get(&seq).map(SequencedItem::status)
    }

    /// Configured window size.
    pub fn max_window(&self) -> usize {
        self.max_window
    }

    /// Configured per-item deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub(crate) fn window(&self) -> &Semaphore {
        &self.window
    }

    pub(crate) fn admitted(&self) -> &Notify {
        &self.admitted
    }
}

fn mark_expired<R>(item: &mut SequencedItem<R>, now: Instant) {
    warn!(
        seq = item.seq,
        error = %FailureReason::Timeout.to_error(item.seq),
        waited_ms = now.saturating_duration_since(item.entered_at).as_millis() as u64,
        "item expired before its stage signalled; releasing tombstone"
    );
    item.slot = Slot::Failed(FailureReason::Timeout);
}
