//! # Time Sources
//!
//! Rate limiters never read the wall clock directly. They ask a [`Clock`]
//! for the monotonic time elapsed since the clock's own origin, which lets
//! tests drive time by hand instead of sleeping:
//!
//! ```text
//!     Production:  SystemClock ──► Instant::now() - origin
//!     Tests:       ManualClock ──► whatever advance() said
//! ```
//!
//! Only differences between two readings of the same clock are meaningful.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Monotonic time source shared by the rate limiters.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since this clock's origin. Never goes backwards.
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`].
///
/// All `SystemClock`s in a process share one origin, captured the first
/// time any of them is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

static PROCESS_ORIGIN: OnceLock<Instant> = OnceLock::new();

impl SystemClock {
    /// Returns a shared handle, the form the limiters take.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Duration {
        PROCESS_ORIGIN.get_or_init(Instant::now).elapsed()
    }
}

/// Hand-driven clock for deterministic tests and simulations.
///
/// ```rust
/// use corral::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), Duration::from_millis(250));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock already wrapped for sharing with a limiter.
    pub fn shared() -> Arc<ManualClock> {
        Arc::new(Self::new())
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(delta, Ordering::AcqRel);
    }

    /// Sets the clock to `at`. Setting it backwards is ignored.
    pub fn set(&self, at: Duration) {
        let target = u64::try_from(at.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_max(target, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}
