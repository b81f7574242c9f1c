//! Queue counters and their snapshot.

use crate::sync::AtomicCounter;
use std::fmt;

#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub(crate) enqueued: AtomicCounter,
    pub(crate) dequeued: AtomicCounter,
    pub(crate) put_timeouts: AtomicCounter,
    pub(crate) get_timeouts: AtomicCounter,
    pub(crate) blocked_puts: AtomicCounter,
}

/// Point-in-time statistics for a [`BoundedQueue`](crate::BoundedQueue).
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStats {
    /// Items accepted by `put`.
    pub enqueued: u64,
    /// Items handed out by `get` or `drain`.
    pub dequeued: u64,
    /// Puts that gave up because the queue stayed full.
    pub put_timeouts: u64,
    /// Gets that gave up because the queue stayed empty.
    pub get_timeouts: u64,
    /// Puts that found the queue full and had to wait.
    pub blocked_puts: u64,
    /// Items queued when the snapshot was taken.
    pub len: usize,
    /// Fixed capacity.
    pub capacity: usize,
    /// Whether `close` has been called.
    pub closed: bool,
}

impl QueueCounters {
    pub(crate) fn snapshot(&self, len: usize, capacity: usize, closed: bool) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.get_u64(),
            dequeued: self.dequeued.get_u64(),
            put_timeouts: self.put_timeouts.get_u64(),
            get_timeouts: self.get_timeouts.get_u64(),
            blocked_puts: self.blocked_puts.get_u64(),
            len,
            capacity,
            closed,
        }
    }
}

impl QueueStats {
    /// Fraction of capacity in use.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len as f64 / self.capacity as f64
        }
    }

    /// Fraction of puts that had to wait for space. High values mean
    /// consumers are the bottleneck.
    pub fn backpressure_ratio(&self) -> f64 {
        let attempts = self.enqueued + self.put_timeouts;
        if attempts == 0 {
            0.0
        } else {
            self.blocked_puts as f64 / attempts as f64
        }
    }

    /// Multi-line report for logs.
    pub fn summary(&self) -> String {
        format!(
            "BoundedQueue Stats:\n\
             ├─ Length: {}/{} ({:.2}%)\n\
             ├─ State: {}\n\
             ├─ Throughput:\n\
             │  ├─ Enqueued: {}\n\
             │  └─ Dequeued: {}\n\
             └─ Backpressure:\n\
                ├─ Blocked Puts: {} ({:.2}%)\n\
                ├─ Put Timeouts: {}\n\
                └─ Get Timeouts: {}",
            self.len,
            self.capacity,
            self.utilization() * 100.0,
            if self.closed { "closed" } else { "open" },
            self.enqueued,
            self.dequeued,
            self.blocked_puts,
            self.backpressure_ratio() * 100.0,
            self.put_timeouts,
            self.get_timeouts
        )
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
