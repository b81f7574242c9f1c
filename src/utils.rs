//! # Low-level Helpers
//!
//! Platform hints shared by the lock-free and the blocking primitives.
//!
//! ```text
//!     Lock-free side (TokenBucket, AtomicCounter):
//!     ├─ CacheAligned<T>  keeps hot atomics on their own cache line
//!     ├─ cpu_relax()      PAUSE / YIELD inside CAS retry loops
//!     └─ Backoff          exponential spin, then yield
//!
//!     Blocking side (BoundedQueue, ResourcePool):
//!     └─ Deadline         one absolute deadline per blocking call
//! ```

use parking_lot::{Condvar, MutexGuard};
use std::time::{Duration, Instant};

/// Cache line size for x86_64 processors.
#[cfg(target_arch = "x86_64")]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// Cache line size for ARM64 processors.
#[cfg(target_arch = "aarch64")]
pub(crate) const CACHE_LINE_SIZE: usize = 128;

/// Assumed cache line size on other architectures.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// CPU relaxation hint for spin loops.
///
/// Emits PAUSE on x86_64 and YIELD on ARM64 via [`std::hint::spin_loop`].
#[inline(always)]
pub(crate) fn cpu_relax() {
    std::hint::spin_loop();
}

/// Cache-aligned wrapper to prevent false sharing between hot atomics.
///
/// ```text
///     Without alignment:
///     ┌───────────────────────────┐
///     │ tokens │ last_refill │ ... │ ← one line, every CAS invalidates both
///     └───────────────────────────┘
///
///     With alignment:
///     ┌───────────────────────────┐
///     │ tokens                    │ ← own line
///     └───────────────────────────┘
///     ┌───────────────────────────┐
///     │ last_refill               │ ← own line
///     └───────────────────────────┘
/// ```
#[cfg_attr(target_arch = "aarch64", repr(C, align(128)))]
#[cfg_attr(not(target_arch = "aarch64"), repr(C, align(64)))]
pub(crate) struct CacheAligned<T>(pub T);

const _: () = assert!(std::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE_SIZE);

impl<T> CacheAligned<T> {
    #[inline(always)]
    pub(crate) const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: Default> Default for CacheAligned<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheAligned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Exponential backoff for CAS retry loops.
///
/// ```text
///     Attempt 1: spin 1
///     Attempt 2: spin 2
///     Attempt 3: spin 4
///     Attempt 4: spin 8
///     Attempt 5+: yield to the scheduler
/// ```
///
/// Only a spin hint: a failed CAS means another thread made progress, so
/// callers keep retrying until they win or their precondition fails.
#[derive(Debug, Clone, Default)]
pub(crate) struct Backoff {
    step: u32,
}

/// Steps after which every retry yields instead of spinning.
const SPIN_LIMIT: u32 = 4;

impl Backoff {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn backoff(&mut self) {
        if self.step < SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                cpu_relax();
            }
            self.step += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

/// Absolute deadline for one blocking call.
///
/// Computed once on entry so spurious wakeups cannot stretch the timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    /// Wait forever.
    Never,
    /// Do not wait at all.
    Immediate,
    /// Wait until this instant.
    At(Instant, Duration),
}

impl Deadline {
    pub(crate) fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::Never,
            Some(d) if d.is_zero() => Self::Immediate,
            // An unrepresentable instant is as good as forever.
            Some(d) => Instant::now()
                .checked_add(d)
                .map_or(Self::Never, |at| Self::At(at, d)),
        }
    }

    /// The timeout the caller asked for, for error reporting.
    pub(crate) fn requested(&self) -> Duration {
        match self {
            Self::Never | Self::Immediate => Duration::ZERO,
            Self::At(_, d) => *d,
        }
    }

    pub(crate) fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }

    /// `true` once waiting any longer would overrun the caller's timeout.
    pub(crate) fn expired(&self) -> bool {
        match self {
            Self::Never => false,
            Self::Immediate => true,
            Self::At(at, _) => Instant::now() >= *at,
        }
    }

    /// Parks on `condvar` until notified or the deadline passes.
    ///
    /// Callers must re-check their predicate afterwards; a return says
    /// nothing about why the thread woke up.
    pub(crate) fn wait<T>(&self, condvar: &Condvar, guard: &mut MutexGuard<'_, T>) {
        match self {
            Self::Never => condvar.wait(guard),
            Self::Immediate => {}
            Self::At(at, _) => {
                // Timed out or not, the caller re-checks its predicate.
                let _ = condvar.wait_until(guard, *at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_line_size_is_sane() {
        assert!(CACHE_LINE_SIZE >= 32);
        assert!(CACHE_LINE_SIZE.is_power_of_two());
        assert!(std::mem::align_of::<CacheAligned<u8>>() >= 64);
    }

    #[test]
    fn cache_aligned_derefs() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let aligned = CacheAligned::new(AtomicU64::new(42));
        assert_eq!(aligned.load(Ordering::Relaxed), 42);
        assert_eq!(format!("{:?}", CacheAligned::new(7u8)), "7");
    }

    #[test]
    fn backoff_escalates_to_yielding() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.step, 0);
        for _ in 0..SPIN_LIMIT {
            backoff.backoff();
        }
        assert_eq!(backoff.step, SPIN_LIMIT);

        // Never gives up; further calls keep yielding.
        for _ in 0..100 {
            backoff.backoff();
        }
        assert_eq!(backoff.step, SPIN_LIMIT);
    }

    #[test]
    fn deadline_kinds() {
        assert!(matches!(Deadline::from_timeout(None), Deadline::Never));
        assert!(Deadline::from_timeout(Some(Duration::ZERO)).is_immediate());

        let d = Deadline::from_timeout(Some(Duration::from_millis(50)));
        assert!(matches!(d, Deadline::At(_, _)));
        assert_eq!(d.requested(), Duration::from_millis(50));

        assert!(matches!(
            Deadline::from_timeout(Some(Duration::MAX)),
            Deadline::Never
        ));
    }

    #[test]
    fn deadline_expiry() {
        assert!(!Deadline::from_timeout(None).expired());
        assert!(Deadline::from_timeout(Some(Duration::ZERO)).expired());
        assert!(!Deadline::from_timeout(Some(Duration::from_secs(60))).expired());
    }

    #[test]
    fn deadline_wait_returns_after_timeout() {
        let lock = parking_lot::Mutex::new(());
        let condvar = Condvar::new();
        let deadline = Deadline::from_timeout(Some(Duration::from_millis(20)));
        let start = Instant::now();

        let mut guard = lock.lock();
        while !deadline.expired() {
            deadline.wait(&condvar, &mut guard);
        }
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
