//! Time source and deferred-task scheduling.
//!
//! Nothing in the engine reads the wall clock or starts a runtime timer
//! directly: deadlines are recorded against a [`Clock`] and fired when the
//! host polls, so tests can move time forward by hand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use carematch_core::{Time, TimerId};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Time;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        chrono::Utc::now()
    }
}

/// Hand-driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start at `start`.
    pub fn new(start: Time) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jump to an instant.
    pub fn set(&self, to: Time) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        chrono::DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

/// Registry of pending deadlines.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    pending: BTreeMap<TimerId, Time>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deadline `delay` after `now`.
    pub fn schedule(&mut self, now: Time, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let due = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        self.pending.insert(id, due);
        tracing::debug!("Scheduled {} due at {}", id, due);
        id
    }

    /// Cancel a pending deadline. Returns whether it was pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Whether `id` has not fired or been cancelled.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Deadline of a pending timer.
    pub fn due_at(&self, id: TimerId) -> Option<Time> {
        self.pending.get(&id).copied()
    }

    /// Remove and return every timer due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: Time) -> Vec<TimerId> {
        let mut due: Vec<(Time, TimerId)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
