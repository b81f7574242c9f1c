//! Cache counters and their snapshot.

use crate::sync::AtomicCounter;
use std::fmt;

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub(crate) hits: AtomicCounter,
    pub(crate) misses: AtomicCounter,
    pub(crate) inserts: AtomicCounter,
    pub(crate) updates: AtomicCounter,
    pub(crate) evictions: AtomicCounter,
}

impl CacheCounters {
    pub(crate) fn snapshot(&self, len: usize, capacity: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.get_u64(),
            misses: self.misses.get_u64(),
            inserts: self.inserts.get_u64(),
            updates: self.updates.get_u64(),
            evictions: self.evictions.get_u64(),
            len,
            capacity,
        }
    }

    pub(crate) fn reset(&self) {
        self.hits.reset();
        self.misses.reset();
        self.inserts.reset();
        self.updates.reset();
        self.evictions.reset();
    }
}

/// Point-in-time statistics for an [`LruCache`](crate::LruCache).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Lookups that found their key.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
    /// Puts that added a new key.
    pub inserts: u64,
    /// Puts that overwrote an existing key.
    pub updates: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries held when the snapshot was taken.
    pub len: usize,
    /// Maximum entries.
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of capacity in use.
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len as f64 / self.capacity as f64
        }
    }

    /// Multi-line report for logs.
    pub fn summary(&self) -> String {
        format!(
            "LruCache Stats:\n\
             ├─ Occupancy: {}/{} ({:.2}%)\n\
             ├─ Lookups:\n\
             │  ├─ Hits: {}\n\
             │  ├─ Misses: {}\n\
             │  └─ Hit Ratio: {:.2}%\n\
             └─ Writes:\n\
                ├─ Inserts: {}\n\
                ├─ Updates: {}\n\
                └─ Evictions: {}",
            self.len,
            self.capacity,
            self.fill_ratio() * 100.0,
            self.hits,
            self.misses,
            self.hit_ratio() * 100.0,
            self.inserts,
            self.updates,
            self.evictions
        )
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
