//! Deterministic timing engine.
//!
//! A [`TimingEngine`] holds delayed actions on a single logical clock. Actions
//! fire in due order; actions due at the same instant fire in the order they
//! were scheduled. Cancelling a handle that already fired, or that was never
//! issued, does nothing.
//!
//! The engine has no notion of wall-clock time. Callers step the clock with
//! [`TimingEngine::advance`] or pull actions one at a time with
//! [`TimingEngine::pop_due`], which lets a dispatcher schedule follow-up
//! actions that still fall inside the current step.
//!
//! # Examples
//!
//! ```
//! use cardlink_hardware::timing::TimingEngine;
//! use std::time::Duration;
//!
//! let mut engine = TimingEngine::new();
//! engine.schedule(Duration::from_millis(500), "found");
//! let complete = engine.schedule(Duration::from_millis(1000), "complete");
//! engine.cancel(complete);
//!
//! let fired = engine.advance(Duration::from_secs(2));
//! assert_eq!(fired, vec!["found"]);
//! assert_eq!(engine.now(), Duration::from_secs(2));
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Handle to a scheduled action, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct Scheduled<A> {
    due: Duration,
    seq: u64,
    action: A,
}

impl<A> PartialEq for Scheduled<A> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<A> Eq for Scheduled<A> {}

impl<A> PartialOrd for Scheduled<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap yields the earliest (due, seq) first.
impl<A> Ord for Scheduled<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

/// Delayed, cancellable actions on one logical clock.
pub struct TimingEngine<A> {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<Scheduled<A>>,
    live: HashSet<u64>,
}

impl<A> TimingEngine<A> {
    /// Create an engine with the clock at zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
        }
    }

    /// Current logical time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `action` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, action: A) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled {
            due: self.now + delay,
            seq,
            action,
        });
        self.live.insert(seq);
        TimerHandle(seq)
    }

    /// Cancel a pending action.
    ///
    /// Returns `true` if the action was pending. Fired, cancelled or unknown
    /// handles are ignored.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.live.remove(&handle.0);
        self.purge();
        removed
    }

    /// Whether `handle` is still waiting to fire.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.live.contains(&handle.0)
    }

    /// Number of pending actions.
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    /// Due time of the earliest pending action.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.peek().map(|entry| entry.due)
    }

    /// Pop the earliest action due at or before `until`.
    ///
    /// The clock moves forward to the action's due time.
    pub fn pop_due(&mut self, until: Duration) -> Option<A> {
        if self.queue.peek().is_none_or(|entry| entry.due > until) {
            return None;
        }
        let entry = self.queue.pop()?;
        self.live.remove(&entry.seq);
        self.now = self.now.max(entry.due);
        self.purge();
        Some(entry.action)
    }

    /// Move the clock forward to `until` without firing anything.
    ///
    /// Never moves the clock backwards.
    pub fn advance_clock_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Advance the clock by `by`, returning every action that fell due in order.
    pub fn advance(&mut self, by: Duration) -> Vec<A> {
        let until = self.now + by;
        let mut fired = Vec::new();
        while let Some(action) = self.pop_due(until) {
            fired.push(action);
        }
        self.advance_clock_to(until);
        fired
    }

    /// Drop every pending action. The clock keeps its value.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.live.clear();
    }

    // Keeps the heap top live so peek and pop_due never see cancelled entries.
    fn purge(&mut self) {
        while let Some(top) = self.queue.peek() {
            if self.live.contains(&top.seq) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl<A> Default for TimingEngine<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for TimingEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingEngine")
            .field("now", &self.now)
            .field("pending", &self.live.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}
