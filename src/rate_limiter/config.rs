//! # Rate Limiter Configuration
//!
//! Plain structs with public fields, named constructors and `with_*`
//! builders. Every limiter constructor calls `validate()` and refuses to
//! start with an out-of-range value; nothing is silently clamped.
//!
//! ## Token Bucket Parameters
//!
//! ```text
//!     ┌──────────────────────────────┐
//!     │   capacity                   │ ← burst limit
//!     │   ┌─────────────────────┐    │
//!     │   │ ● ● ● ● ●           │    │ ← current tokens (fractional)
//!     │   └─────────────────────┘    │
//!     │                              │
//!     │   refill_rate: 10.0 / sec    │ ← continuous, not stepped
//!     └──────────────────────────────┘
//! ```
//!
//! ## Memory Ordering
//!
//! ```text
//!     Relaxed ──────► Fast but minimal guarantees
//!        │
//!     AcquireRelease ► Balanced (default)
//!        │
//!     Sequential ───► Slow but strongest guarantees
//! ```

use crate::error::{Error, Result};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Fixed-point scale: one token is stored as this many micro-tokens.
pub(crate) const MICROS_PER_TOKEN: u64 = 1_000_000;

/// Largest capacity whose micro-token count still fits in a `u64`.
pub const MAX_CAPACITY: u64 = u64::MAX / MICROS_PER_TOKEN;

/// Memory ordering strategy for the token bucket's atomics.
///
/// ```rust
/// use corral::{MemoryOrdering, TokenBucketConfig};
///
/// let config = TokenBucketConfig::per_second(1_000)
///     .with_ordering(MemoryOrdering::Relaxed);
/// assert_eq!(config.ordering, MemoryOrdering::Relaxed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOrdering {
    /// Fastest; token counts stay exact but other memory is not synchronized.
    Relaxed,

    /// Acquire on loads, release on stores. The default.
    #[default]
    AcquireRelease,

    /// Sequential consistency everywhere. Useful when debugging.
    Sequential,
}

impl MemoryOrdering {
    #[inline(always)]
    pub(crate) fn load(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    #[inline(always)]
    pub(crate) fn store(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Release,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    #[inline(always)]
    pub(crate) fn rmw(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::AcqRel,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    #[inline(always)]
    pub(crate) fn cas_failure(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }
}

/// Configuration for a [`TokenBucket`](crate::TokenBucket).
///
/// ```text
///     ┌────────────────────────────────────┐
///     │ capacity: 100                      │
///     │ refill_rate: 10.0                  │
///     │                                    │
///     │ Result: 10 requests/second         │
///     │         100 burst capacity         │
///     └────────────────────────────────────┘
/// ```
///
/// ## Examples
///
/// ```rust
/// use corral::TokenBucketConfig;
///
/// // 50 req/sec, burst of 100
/// let config = TokenBucketConfig::per_second(50);
/// assert_eq!(config.capacity, 100);
///
/// // 600 req/min is 10 req/sec
/// let config = TokenBucketConfig::per_minute(600);
/// assert_eq!(config.refill_rate, 10.0);
///
/// // 10 req/sec, bursts up to 50
/// let config = TokenBucketConfig::per_second(10).with_burst_multiplier(5);
/// assert_eq!(config.capacity, 50);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketConfig {
    /// Maximum tokens the bucket holds; the largest admissible burst.
    pub capacity: u64,

    /// Tokens added per second, accrued continuously.
    pub refill_rate: f64,

    /// Ordering for the token and timestamp atomics.
    pub ordering: MemoryOrdering,
}

impl Default for TokenBucketConfig {
    /// 10 requests/second with bursts up to 50.
    fn default() -> Self {
        Self {
            capacity: 50,
            refill_rate: 10.0,
            ordering: MemoryOrdering::default(),
        }
    }
}

impl TokenBucketConfig {
    /// Creates a configuration from a capacity and a per-second rate.
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            ordering: MemoryOrdering::default(),
        }
    }

    /// `requests_per_second` sustained, bursts up to twice that.
    pub fn per_second(requests_per_second: u64) -> Self {
        Self::new(
            requests_per_second.saturating_mul(2),
            requests_per_second as f64,
        )
    }

    /// `requests_per_minute` sustained, bursts up to the full minute's quota.
    pub fn per_minute(requests_per_minute: u64) -> Self {
        Self::new(requests_per_minute, requests_per_minute as f64 / 60.0)
    }

    /// Sets the memory ordering.
    pub fn with_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Sets capacity to `multiplier` seconds' worth of refill.
    pub fn with_burst_multiplier(mut self, multiplier: u64) -> Self {
        let burst = (self.refill_rate * multiplier as f64).ceil();
        self.capacity = if burst.is_finite() && burst >= 0.0 {
            burst.min(u64::MAX as f64) as u64
        } else {
            0
        };
        self
    }

    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if:
    /// - `capacity` is 0 or above [`MAX_CAPACITY`]
    /// - `refill_rate` is not a positive finite number
    ///
    /// ```rust
    /// use corral::TokenBucketConfig;
    ///
    /// assert!(TokenBucketConfig::new(0, 1.0).validate().is_err());
    /// assert!(TokenBucketConfig::new(10, f64::NAN).validate().is_err());
    /// assert!(TokenBucketConfig::new(10, 0.5).validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::config("token bucket capacity must be greater than 0"));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(Error::config(format!(
                "token bucket capacity must not exceed {}",
                MAX_CAPACITY
            )));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(Error::config(
                "token bucket refill rate must be a positive finite number",
            ));
        }
        Ok(())
    }

    /// Time an empty bucket needs to refill completely.
    pub fn time_to_full(&self) -> Duration {
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64(self.capacity as f64 / self.refill_rate)
            .unwrap_or(Duration::MAX)
    }
}

/// Bounds on how many identities a keyed limiter tracks, and how idle ones
/// are reclaimed.
///
/// ```text
///     tracked identities
///     ──────────────────────────────────────────────► max_identities
///     0                      70%        90%       100%
///                             ▲          ▲          ▲
///                   emergency target     │          └─ new identities rejected
///                                        └─ emergency sweep on insert
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedLimiterConfig {
    /// Hard cap on tracked identities. New identities beyond it are rejected.
    pub max_identities: usize,

    /// Period of the background sweeper.
    pub sweep_interval: Duration,

    /// How long a token bucket identity may sit unused before it is
    /// reclaimed. Sliding-window identities are reclaimed as soon as their
    /// log empties, whatever this says.
    pub idle_timeout: Duration,
}

impl Default for KeyedLimiterConfig {
    /// 10,000 identities, sweep every minute, reclaim after 5 idle minutes.
    fn default() -> Self {
        Self {
            max_identities: 10_000,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl KeyedLimiterConfig {
    /// Sets the identity cap.
    pub fn with_max_identities(mut self, max_identities: usize) -> Self {
        self.max_identities = max_identities;
        self
    }

    /// Sets the sweeper period.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if any field is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_identities == 0 {
            return Err(Error::config("max_identities must be greater than 0"));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::config("sweep_interval must be greater than 0"));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::config("idle_timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Tracked count at which inserts trigger an emergency sweep (90%).
    pub(crate) fn sweep_threshold(&self) -> usize {
        (self.max_identities as u128 * 9 / 10) as usize
    }

    /// Count an emergency sweep tries to get back under (70%).
    pub(crate) fn sweep_target(&self) -> usize {
        (self.max_identities as u128 * 7 / 10) as usize
    }
}

/// Configuration for a [`SlidingWindow`](crate::SlidingWindow).
///
/// ```rust
/// use corral::SlidingWindowConfig;
/// use std::time::Duration;
///
/// let config = SlidingWindowConfig::new(100, Duration::from_secs(60))
///     .with_max_identities(50_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidingWindowConfig {
    /// Most requests (total weight) one identity may make per window.
    pub max_requests: u64,

    /// Length of the trailing window.
    pub window: Duration,

    /// Identity bounds and sweeping.
    pub identities: KeyedLimiterConfig,
}

impl Default for SlidingWindowConfig {
    /// 100 requests per minute per identity.
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl SlidingWindowConfig {
    /// `max_requests` per `window` per identity, default identity bounds.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            identities: KeyedLimiterConfig::default(),
        }
    }

    /// `requests_per_second` per identity over a one-second window.
    pub fn per_second(requests_per_second: u64) -> Self {
        Self::new(requests_per_second, Duration::from_secs(1))
    }

    /// `requests_per_minute` per identity over a one-minute window.
    pub fn per_minute(requests_per_minute: u64) -> Self {
        Self::new(requests_per_minute, Duration::from_secs(60))
    }

    /// Sets the identity cap.
    pub fn with_max_identities(mut self, max_identities: usize) -> Self {
        self.identities.max_identities = max_identities;
        self
    }

    /// Replaces the identity bounds wholesale.
    pub fn with_identities(mut self, identities: KeyedLimiterConfig) -> Self {
        self.identities = identities;
        self
    }

    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `max_requests` or `window` is zero,
    /// or the identity bounds are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::config("max_requests must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(Error::config("window must be greater than 0"));
        }
        self.identities.validate()
    }
}
