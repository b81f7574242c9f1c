//! Cache-aligned atomic counter.

use crate::utils::CacheAligned;
use std::sync::atomic::{AtomicI64, Ordering};

/// Thread-safe signed counter.
///
/// Every operation is a single atomic instruction, so concurrent callers see
/// a total order of effects. The value sits on its own cache line; several
/// counters in one struct do not contend with each other.
///
/// # Example
///
/// ```rust
/// use corral::AtomicCounter;
/// use std::sync::Arc;
/// use std::thread;
///
/// let hits = Arc::new(AtomicCounter::new(0));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let hits = hits.clone();
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 hits.increment(1);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(hits.get(), 4000);
/// ```
pub struct AtomicCounter {
    value: CacheAligned<AtomicI64>,
}

impl AtomicCounter {
    /// Creates a counter starting at `initial`.
    pub const fn new(initial: i64) -> Self {
        Self {
            value: CacheAligned::new(AtomicI64::new(initial)),
        }
    }

    /// Adds `delta` and returns the new value. Wraps on overflow.
    #[inline]
    pub fn increment(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel).wrapping_add(delta)
    }

    /// Subtracts `delta` and returns the new value.
    #[inline]
    pub fn decrement(&self, delta: i64) -> i64 {
        self.value.fetch_sub(delta, Ordering::AcqRel).wrapping_sub(delta)
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Current value clamped to `u64`, for snapshot structs.
    #[inline]
    pub(crate) fn get_u64(&self) -> u64 {
        self.get().max(0) as u64
    }

    /// Overwrites the value.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Sets the value to zero and returns what it was.
    pub fn reset(&self) -> i64 {
        self.value.swap(0, Ordering::AcqRel)
    }

    /// Stores `new` if the value is still `current`.
    ///
    /// Returns `Ok(current)` on success, `Err(actual)` otherwise.
    pub fn compare_and_set(&self, current: i64, new: i64) -> Result<i64, i64> {
        self.value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Raises the value to `candidate` if larger; returns the previous value.
    pub fn fetch_max(&self, candidate: i64) -> i64 {
        self.value.fetch_max(candidate, Ordering::AcqRel)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for AtomicCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicCounter").field(&self.get()).finish()
    }
}
