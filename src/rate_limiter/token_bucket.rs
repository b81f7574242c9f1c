//! # Lock-Free Token Bucket
//!
//! ```text
//!     Start (full):         After 3 requests:      After 0.5s at 4/s:
//!     ┌──────────────┐      ┌──────────────┐       ┌──────────────┐
//!     │ ● ● ● ● ●    │ 5/5  │ ● ●          │ 2/5   │ ● ● ● ●      │ 4/5
//!     └──────────────┘      └──────────────┘       └──────────────┘
//! ```
//!
//! ## Lock-Free Design
//!
//! Two cache-aligned atomics carry the whole state:
//!
//! ```text
//!     tokens       AtomicU64  micro-tokens (1 token = 1_000_000)
//!     last_refill  AtomicU64  clock nanos the balance was last credited
//!
//!     allow_n(cost):
//!         refill ── CAS last_refill: then → now ──► winner credits elapsed × rate
//!            │                                      (losers skip, already credited)
//!            ▼
//!         CAS tokens: t → t - cost  (only when t >= cost)
//!            │
//!            ├─ ok ──────────► admitted
//!            ├─ t < cost ────► rejected, tokens untouched
//!            └─ lost race ───► backoff, retry (bounded)
//! ```
//!
//! A refill is claimed only once it is worth at least one micro-token, so
//! rapid callers cannot erase elapsed time by advancing the timestamp in
//! steps too small to credit.

use super::config::{MemoryOrdering, TokenBucketConfig, MICROS_PER_TOKEN};
use super::metrics::LimiterMetrics;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::sync::AtomicCounter;
use crate::utils::{Backoff, CacheAligned};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Nanoseconds per second divided by micro-tokens per token. Dividing by
/// it keeps whole-token credits exact in floating point.
const NANOS_PER_SECOND_PER_MICRO: f64 = 1e9 / MICROS_PER_TOKEN as f64;

/// `last_access` is refreshed at most this often to keep the line quiet.
const LAST_ACCESS_UPDATE_INTERVAL_NANOS: u64 = 100_000_000;

/// Thread-safe token bucket rate limiter.
///
/// Starts full. Each admitted request removes `cost` tokens; tokens accrue
/// continuously at `refill_rate` per second up to `capacity`. Over any
/// interval of length `T` at most `capacity + refill_rate × T` tokens are
/// admitted.
///
/// # Example
///
/// ```rust
/// use corral::TokenBucket;
/// use std::sync::Arc;
/// use std::thread;
///
/// let bucket = Arc::new(TokenBucket::new(100, 10.0).unwrap());
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let bucket = bucket.clone();
///         thread::spawn(move || (0..50).filter(|_| bucket.allow()).count())
///     })
///     .collect();
///
/// let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
/// assert!(admitted <= 100 + 10); // burst plus whatever refilled meanwhile
/// ```
pub struct TokenBucket {
    tokens: CacheAligned<AtomicU64>,
    last_refill: CacheAligned<AtomicU64>,
    last_access: AtomicU64,

    capacity: u64,
    capacity_micros: u64,
    refill_rate: f64,
    ordering: MemoryOrdering,
    clock: Arc<dyn Clock>,

    total_admitted: AtomicCounter,
    total_rejected: AtomicCounter,
    total_refills: AtomicCounter,
    consecutive_rejections: AtomicCounter,
}

fn clock_nanos(clock: &dyn Clock) -> u64 {
    u64::try_from(clock.now().as_nanos()).unwrap_or(u64::MAX)
}

impl TokenBucket {
    /// Creates a bucket holding `capacity` tokens, refilled at `refill_rate`
    /// tokens per second, reading the system clock.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `capacity` is zero or `refill_rate`
    /// is not a positive finite number.
    ///
    /// ```rust
    /// use corral::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(5, 1.0).unwrap();
    /// for _ in 0..5 {
    ///     assert!(bucket.allow());
    /// }
    /// assert!(!bucket.allow());
    ///
    /// assert!(TokenBucket::new(0, 1.0).is_err());
    /// ```
    pub fn new(capacity: u64, refill_rate: f64) -> Result<Self> {
        Self::with_config(
            TokenBucketConfig::new(capacity, refill_rate),
            SystemClock::shared(),
        )
    }

    /// Creates a bucket from a full configuration and an explicit clock.
    ///
    /// ```rust
    /// use corral::{ManualClock, TokenBucket, TokenBucketConfig};
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::shared();
    /// let bucket = TokenBucket::with_config(TokenBucketConfig::new(2, 1.0), clock.clone()).unwrap();
    ///
    /// assert!(bucket.allow());
    /// assert!(bucket.allow());
    /// assert!(!bucket.allow());
    ///
    /// clock.advance(Duration::from_secs(1));
    /// assert!(bucket.allow());
    /// ```
    pub fn with_config(config: TokenBucketConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let now = clock_nanos(clock.as_ref());
        let capacity_micros = config.capacity * MICROS_PER_TOKEN;

        Ok(Self {
            tokens: CacheAligned::new(AtomicU64::new(capacity_micros)),
            last_refill: CacheAligned::new(AtomicU64::new(now)),
            last_access: AtomicU64::new(now),
            capacity: config.capacity,
            capacity_micros,
            refill_rate: config.refill_rate,
            ordering: config.ordering,
            clock,
            total_admitted: AtomicCounter::default(),
            total_rejected: AtomicCounter::default(),
            total_refills: AtomicCounter::default(),
            consecutive_rejections: AtomicCounter::default(),
        })
    }

    /// A full bucket with the same settings and clock as `self`.
    pub(crate) fn sibling(&self) -> Self {
        let now = clock_nanos(self.clock.as_ref());
        Self {
            tokens: CacheAligned::new(AtomicU64::new(self.capacity_micros)),
            last_refill: CacheAligned::new(AtomicU64::new(now)),
            last_access: AtomicU64::new(now),
            capacity: self.capacity,
            capacity_micros: self.capacity_micros,
            refill_rate: self.refill_rate,
            ordering: self.ordering,
            clock: Arc::clone(&self.clock),
            total_admitted: AtomicCounter::default(),
            total_rejected: AtomicCounter::default(),
            total_refills: AtomicCounter::default(),
            consecutive_rejections: AtomicCounter::default(),
        }
    }

    /// Admits one request if a whole token is available.
    ///
    /// Never blocks.
    #[inline]
    pub fn allow(&self) -> bool {
        self.admit(1)
    }

    /// Admits a request costing `cost` tokens, all or nothing.
    ///
    /// A rejection leaves the balance untouched. A cost larger than the
    /// capacity can never be admitted and is rejected outright.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `cost` is zero.
    ///
    /// ```rust
    /// use corral::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(10, 1.0).unwrap();
    /// assert!(bucket.allow_n(7).unwrap());
    /// assert!(!bucket.allow_n(7).unwrap()); // 3 left, none taken
    /// assert!(bucket.allow_n(3).unwrap());
    /// assert!(bucket.allow_n(0).is_err());
    /// ```
    pub fn allow_n(&self, cost: u64) -> Result<bool> {
        if cost == 0 {
            return Err(Error::argument("admission cost must be greater than 0"));
        }
        Ok(self.admit(cost))
    }

    fn admit(&self, cost: u64) -> bool {
        let now = clock_nanos(self.clock.as_ref());
        self.touch(now);

        if cost > self.capacity {
            self.on_rejection();
            return false;
        }
        let need = cost * MICROS_PER_TOKEN;

        self.refill(now);

        // Each failed CAS is another caller's success, so this terminates.
        let mut backoff = Backoff::new();
        let mut current = self.tokens.load(self.ordering.load());
        loop {
            if current < need {
                self.on_rejection();
                return false;
            }

            match self.tokens.compare_exchange_weak(
                current,
                current - need,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            ) {
                Ok(_) => {
                    self.on_admission(cost);
                    return true;
                }
                Err(actual) => {
                    current = actual;
                    backoff.backoff();
                }
            }
        }
    }

    #[inline]
    fn touch(&self, now: u64) {
        let last = self.last_access.load(self.ordering.load());
        if now.saturating_sub(last) > LAST_ACCESS_UPDATE_INTERVAL_NANOS {
            self.last_access.store(now, self.ordering.store());
        }
    }

    /// Credits the time elapsed since the last refill, capped at capacity.
    fn refill(&self, now: u64) {
        let last = self.last_refill.load(self.ordering.load());
        if now <= last {
            return;
        }

        let credit = ((now - last) as f64 * self.refill_rate / NANOS_PER_SECOND_PER_MICRO)
            .min(self.capacity_micros as f64) as u64;
        if credit == 0 {
            return;
        }

        // Whoever moves the timestamp owns this credit; losers skip.
        if self
            .last_refill
            .compare_exchange(last, now, self.ordering.rmw(), self.ordering.cas_failure())
            .is_err()
        {
            return;
        }

        let added = self.credit(credit);
        if added > 0 {
            self.total_refills.increment(1);
            debug!(
                "Refilled {:.3} tokens after {:?}",
                added as f64 / MICROS_PER_TOKEN as f64,
                Duration::from_nanos(now - last)
            );
        }
    }

    /// Adds `micros` to the balance without passing capacity; returns how
    /// much was actually added.
    fn credit(&self, micros: u64) -> u64 {
        let mut backoff = Backoff::new();
        let mut current = self.tokens.load(self.ordering.load());
        loop {
            let updated = current.saturating_add(micros).min(self.capacity_micros);
            if updated == current {
                return 0;
            }

            match self.tokens.compare_exchange_weak(
                current,
                updated,
                self.ordering.rmw(),
                self.ordering.cas_failure(),
            ) {
                Ok(_) => return updated - current,
                Err(actual) => {
                    current = actual;
                    backoff.backoff();
                }
            }
        }
    }

    #[inline]
    fn on_admission(&self, cost: u64) {
        self.total_admitted.increment(cost as i64);
        if self.consecutive_rejections.get() > 0 {
            self.consecutive_rejections.set(0);
        }
    }

    #[inline]
    fn on_rejection(&self) {
        self.total_rejected.increment(1);
        self.consecutive_rejections.increment(1);
    }

    /// Tokens available right now, after crediting elapsed time.
    pub fn available_tokens(&self) -> f64 {
        self.refill(clock_nanos(self.clock.as_ref()));
        self.tokens.load(self.ordering.load()) as f64 / MICROS_PER_TOKEN as f64
    }

    /// Adds `n` tokens by hand, capped at capacity.
    ///
    /// ```rust
    /// use corral::TokenBucket;
    ///
    /// let bucket = TokenBucket::new(10, 0.001).unwrap();
    /// assert!(bucket.allow_n(10).unwrap());
    /// bucket.add_tokens(3);
    /// assert!(bucket.allow_n(3).unwrap());
    /// ```
    pub fn add_tokens(&self, n: u64) {
        self.credit(n.saturating_mul(MICROS_PER_TOKEN));
    }

    /// Refills to capacity and zeroes every counter.
    pub fn reset(&self) {
        let now = clock_nanos(self.clock.as_ref());
        self.tokens.store(self.capacity_micros, self.ordering.store());
        self.last_refill.store(now, self.ordering.store());
        self.last_access.store(now, self.ordering.store());

        self.total_admitted.reset();
        self.total_rejected.reset();
        self.total_refills.reset();
        self.consecutive_rejections.reset();
        debug!("Token bucket reset to {} tokens", self.capacity);
    }

    /// `true` if no request has arrived for longer than `idle`.
    ///
    /// Access times are tracked with roughly 100ms granularity.
    pub fn is_inactive(&self, idle: Duration) -> bool {
        let now = clock_nanos(self.clock.as_ref());
        let last = self.last_access.load(self.ordering.load());
        let idle = u64::try_from(idle.as_nanos()).unwrap_or(u64::MAX);
        now.saturating_sub(last) > idle
    }

    /// `true` once the bucket has refilled completely.
    pub(crate) fn is_full(&self) -> bool {
        self.available_tokens() >= self.capacity as f64
    }

    /// Clock time of the last recorded request.
    pub(crate) fn last_access(&self) -> Duration {
        Duration::from_nanos(self.last_access.load(self.ordering.load()))
    }

    /// Burst capacity in tokens.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Snapshot of the counters and current balance.
    pub fn metrics(&self) -> LimiterMetrics {
        LimiterMetrics {
            total_admitted: self.total_admitted.get_u64(),
            total_rejected: self.total_rejected.get_u64(),
            total_refills: self.total_refills.get_u64(),
            current_tokens: self.available_tokens(),
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            consecutive_rejections: self.consecutive_rejections.get_u64(),
        }
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field(
                "tokens",
                &(self.tokens.load(self.ordering.load()) as f64 / MICROS_PER_TOKEN as f64),
            )
            .field("ordering", &self.ordering)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn bucket(capacity: u64, rate: f64) -> (TokenBucket, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let bucket =
            TokenBucket::with_config(TokenBucketConfig::new(capacity, rate), clock.clone()).unwrap();
        (bucket, clock)
    }

    #[test]
    fn starts_full_and_exhausts() {
        let (bucket, _clock) = bucket(5, 1.0);
        for _ in 0..5 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());

        let metrics = bucket.metrics();
        assert_eq!(metrics.total_admitted, 5);
        assert_eq!(metrics.total_rejected, 1);
        assert_eq!(metrics.consecutive_rejections, 1);
    }

    #[test]
    fn rejects_invalid_config() {
        let clock = SystemClock::shared();
        for (capacity, rate) in [(0, 1.0), (1, 0.0), (1, -1.0), (1, f64::NAN)] {
            let result = TokenBucket::with_config(TokenBucketConfig::new(capacity, rate), clock.clone());
            assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn refills_continuously() {
        let (bucket, clock) = bucket(10, 4.0);
        assert!(bucket.allow_n(10).unwrap());
        assert!(!bucket.allow());

        clock.advance(Duration::from_millis(250));
        assert!(bucket.allow());
        assert!(!bucket.allow());

        clock.advance(Duration::from_millis(500));
        assert!((bucket.available_tokens() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn refill_caps_at_capacity() {
        let (bucket, clock) = bucket(3, 100.0);
        bucket.allow();
        clock.advance(Duration::from_secs(3_600));
        assert_eq!(bucket.available_tokens(), 3.0);
        assert!(bucket.allow_n(3).unwrap());
        assert!(!bucket.allow());
    }

    #[test]
    fn small_steps_still_accumulate() {
        // 1 token/s polled every millisecond must still refill.
        let (bucket, clock) = bucket(1, 1.0);
        assert!(bucket.allow());
        for _ in 0..1_000 {
            clock.advance(Duration::from_millis(1));
            bucket.allow();
        }
        assert!(bucket.metrics().total_admitted >= 2);
    }

    #[test]
    fn weighted_rejection_leaves_tokens() {
        let (bucket, _clock) = bucket(10, 1.0);
        assert!(bucket.allow_n(4).unwrap());
        assert!(!bucket.allow_n(7).unwrap());
        assert_eq!(bucket.available_tokens(), 6.0);
        assert!(!bucket.allow_n(11).unwrap());
        assert!(matches!(bucket.allow_n(0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn long_run_rate_is_bounded() {
        let (bucket, clock) = bucket(5, 2.0);
        let mut admitted = 0u64;
        // 10 simulated seconds, polled every 10ms.
        for _ in 0..1_000 {
            if bucket.allow() {
                admitted += 1;
            }
            clock.advance(Duration::from_millis(10));
        }
        assert!(admitted <= 5 + 2 * 10, "admitted {}", admitted);
        assert!(admitted >= 5 + 2 * 9, "admitted {}", admitted);
    }

    #[test]
    fn add_tokens_and_reset() {
        let (bucket, _clock) = bucket(10, 1.0);
        bucket.allow_n(10).unwrap();
        bucket.add_tokens(25);
        assert_eq!(bucket.available_tokens(), 10.0);

        bucket.allow_n(10).unwrap();
        bucket.allow();
        bucket.reset();
        assert_eq!(bucket.available_tokens(), 10.0);
        assert_eq!(bucket.metrics().total_admitted, 0);
        assert_eq!(bucket.metrics().total_rejected, 0);
    }

    #[test]
    fn inactivity_tracking() {
        let (bucket, clock) = bucket(10, 1.0);
        bucket.allow();
        assert!(!bucket.is_inactive(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(2));
        assert!(bucket.is_inactive(Duration::from_secs(1)));

        bucket.allow();
        assert!(!bucket.is_inactive(Duration::from_secs(1)));
        assert_eq!(bucket.last_access(), Duration::from_secs(2));
    }

    #[test]
    fn is_full_after_refill() {
        let (bucket, clock) = bucket(2, 1.0);
        assert!(bucket.is_full());
        bucket.allow();
        assert!(!bucket.is_full());
        clock.advance(Duration::from_secs(1));
        assert!(bucket.is_full());
    }

    #[test]
    fn memory_orderings_behave_alike() {
        for ordering in [
            MemoryOrdering::Relaxed,
            MemoryOrdering::AcquireRelease,
            MemoryOrdering::Sequential,
        ] {
            let config = TokenBucketConfig::new(3, 1.0).with_ordering(ordering);
            let bucket = TokenBucket::with_config(config, ManualClock::shared()).unwrap();
            assert_eq!((0..5).filter(|_| bucket.allow()).count(), 3);
        }
    }

    #[test]
    fn concurrent_admissions_never_exceed_capacity() {
        let (bucket, _clock) = bucket(1_000, 1.0);
        let bucket = Arc::new(bucket);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = bucket.clone();
                thread::spawn(move || (0..500).filter(|_| bucket.allow()).count() as u64)
            })
            .collect();
        let admitted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // The clock is frozen, so nothing refills; contention never
        // costs a token that was available.
        assert_eq!(admitted, 1_000);
        assert_eq!(bucket.metrics().total_admitted, admitted);
        assert_eq!(bucket.metrics().total_rejected, 3_000);
    }

    #[test]
    fn contention_never_rejects_while_tokens_remain() {
        let (bucket, _clock) = bucket(1_000_000, 1.0);
        let bucket = Arc::new(bucket);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let bucket = bucket.clone();
                thread::spawn(move || (0..5_000).filter(|_| !bucket.allow()).count())
            })
            .collect();
        let rejected: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(rejected, 0);
        assert_eq!(bucket.metrics().total_admitted, 80_000);
        assert_eq!(bucket.available_tokens(), 920_000.0);
    }

    #[test]
    fn contended_refill_is_never_lost() {
        let (bucket, clock) = bucket(10_000, 1_000.0);
        assert!(bucket.allow_n(10_000).unwrap());
        let bucket = Arc::new(bucket);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = bucket.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        bucket.add_tokens(1);
                    }
                })
            })
            .collect();

        // One second of refill races the manual credits above.
        clock.advance(Duration::from_secs(1));
        for _ in 0..100 {
            bucket.available_tokens();
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 8 × 250 added by hand plus 1000 refilled.
        assert_eq!(bucket.available_tokens(), 3_000.0);
    }
}
