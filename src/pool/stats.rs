//! Pool counters and their snapshot.

use crate::sync::AtomicCounter;
use std::fmt;

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) created: AtomicCounter,
    pub(crate) destroyed: AtomicCounter,
    pub(crate) acquired: AtomicCounter,
    pub(crate) released: AtomicCounter,
    pub(crate) timeouts: AtomicCounter,
    pub(crate) exhausted: AtomicCounter,
    pub(crate) creation_failures: AtomicCounter,
    pub(crate) waits: AtomicCounter,
}

/// Point-in-time statistics for a [`ResourcePool`](crate::ResourcePool).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    /// Resources built by the factory.
    pub created: u64,
    /// Resources handed to the destructor (or dropped).
    pub destroyed: u64,
    /// Successful acquisitions.
    pub acquired: u64,
    /// Resources returned to the idle set.
    pub released: u64,
    /// Acquisitions that waited and gave up.
    pub timeouts: u64,
    /// Acquisitions refused because the caller would not wait.
    pub exhausted: u64,
    /// Factory calls that failed.
    pub creation_failures: u64,
    /// Acquisitions that had to wait at least once.
    pub waits: u64,
    /// Idle resources when the snapshot was taken.
    pub idle: usize,
    /// Checked-out or in-creation resources when the snapshot was taken.
    pub active: usize,
    /// Configured upper bound.
    pub max_size: usize,
    /// Whether `close` has been called.
    pub closed: bool,
}

impl PoolCounters {
    pub(crate) fn snapshot(
        &self,
        idle: usize,
        active: usize,
        max_size: usize,
        closed: bool,
    ) -> PoolStats {
        PoolStats {
            created: self.created.get_u64(),
            destroyed: self.destroyed.get_u64(),
            acquired: self.acquired.get_u64(),
            released: self.released.get_u64(),
            timeouts: self.timeouts.get_u64(),
            exhausted: self.exhausted.get_u64(),
            creation_failures: self.creation_failures.get_u64(),
            waits: self.waits.get_u64(),
            idle,
            active,
            max_size,
            closed,
        }
    }
}

impl PoolStats {
    /// Resources currently alive.
    pub fn live(&self) -> usize {
        self.idle + self.active
    }

    /// Fraction of `max_size` checked out or being created.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Fraction of acquisition attempts that had to wait.
    pub fn wait_ratio(&self) -> f64 {
        let attempts = self.acquired + self.timeouts + self.exhausted;
        if attempts == 0 {
            0.0
        } else {
            self.waits as f64 / attempts as f64
        }
    }

    /// Fraction of acquisitions served by an existing resource.
    pub fn reuse_ratio(&self) -> f64 {
        if self.acquired == 0 {
            0.0
        } else {
            self.acquired.saturating_sub(self.created) as f64 / self.acquired as f64
        }
    }

    /// Multi-line report for logs.
    pub fn summary(&self) -> String {
        format!(
            "ResourcePool Stats:\n\
             ├─ Resources: {} active, {} idle, max {} ({:.2}% in use)\n\
             ├─ State: {}\n\
             ├─ Lifecycle:\n\
             │  ├─ Created: {}\n\
             │  ├─ Destroyed: {}\n\
             │  └─ Creation Failures: {}\n\
             ├─ Traffic:\n\
             │  ├─ Acquired: {} ({:.2}% reused)\n\
             │  └─ Released: {}\n\
             └─ Contention:\n\
                ├─ Waits: {} ({:.2}%)\n\
                ├─ Timeouts: {}\n\
                └─ Exhausted: {}",
            self.active,
            self.idle,
            self.max_size,
            self.utilization() * 100.0,
            if self.closed { "closed" } else { "open" },
            self.created,
            self.destroyed,
            self.creation_failures,
            self.acquired,
            self.reuse_ratio() * 100.0,
            self.released,
            self.waits,
            self.wait_ratio() * 100.0,
            self.timeouts,
            self.exhausted
        )
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
