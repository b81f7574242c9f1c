//! # Corral - Concurrent Resource-Management Primitives
//!
//! Thread-safe building blocks for services that need admission control,
//! caching and connection reuse, all in-process:
//!
//! - [`LruCache`] - bounded cache with least-recently-used eviction
//! - [`TokenBucket`] - lock-free burst-then-refill rate limiter
//! - [`SlidingWindow`] / [`KeyedTokenBucket`] - per-identity rate limiting
//! - [`BoundedQueue`] - fixed-capacity blocking FIFO with timeouts
//! - [`ResourcePool`] - bounded pool of reusable resources
//! - [`AtomicCounter`] / [`ConcurrentMap`] - the bookkeeping underneath
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │    Your Application     │
//!                    └────────────┬────────────┘
//!          ┌─────────────┬────────┴──────┬───────────────┐
//!          ▼             ▼               ▼               ▼
//!     ┌─────────┐  ┌───────────┐  ┌─────────────┐  ┌──────────────┐
//!     │LruCache │  │TokenBucket│  │SlidingWindow│  │ ResourcePool │
//!     │         │  │           │  │KeyedBucket  │  │              │
//!     └────┬────┘  └─────┬─────┘  └──────┬──────┘  └──────┬───────┘
//!          │             │               │                │
//!          │             │         ConcurrentMap    BoundedQueue
//!          │             │               │            (idle set)
//!          └─────────────┴───────┬───────┴────────────────┘
//!                                ▼
//!                         AtomicCounter (stats)
//! ```
//!
//! ## Quick Start
//!
//! ### Token bucket
//!
//! ```rust
//! use corral::TokenBucket;
//!
//! // 100 token burst, refilled at 10 tokens per second
//! let limiter = TokenBucket::new(100, 10.0).unwrap();
//!
//! if limiter.allow() {
//!     // handle the request
//! } else {
//!     // answer 429 Too Many Requests
//! }
//! ```
//!
//! ### Per-identity limits
//!
//! ```rust
//! use corral::SlidingWindow;
//! use std::net::IpAddr;
//! use std::time::Duration;
//!
//! // At most 3 requests per client in any trailing second
//! let limiter = SlidingWindow::new(3, Duration::from_secs(1)).unwrap();
//! let client: IpAddr = "192.168.1.100".parse().unwrap();
//!
//! for _ in 0..3 {
//!     assert!(limiter.allow(&client));
//! }
//! assert!(!limiter.allow(&client));
//! ```
//!
//! ### Cache, queue and pool
//!
//! ```rust
//! use corral::{BoundedQueue, LruCache, ResourcePool};
//! use std::time::Duration;
//!
//! let cache = LruCache::new(2).unwrap();
//! cache.put("a", 1);
//! cache.put("b", 2);
//! cache.get(&"a");
//! cache.put("c", 3); // evicts "b"
//! assert!(!cache.contains_key(&"b"));
//!
//! let queue = BoundedQueue::new(8).unwrap();
//! queue.put(1, Some(Duration::from_millis(10))).unwrap();
//! assert_eq!(queue.get(None).unwrap(), 1);
//!
//! let pool = ResourcePool::new(|| Ok::<_, std::io::Error>(String::new()), 4).unwrap();
//! let conn = pool.acquire(Some(Duration::from_secs(1))).unwrap();
//! drop(conn); // back to the pool
//! assert_eq!(pool.idle_count(), 1);
//! ```
//!
//! ## Blocking and Timeouts
//!
//! Only [`BoundedQueue::put`], [`BoundedQueue::get`] and
//! [`ResourcePool::acquire`] ever block. Each takes an
//! `Option<Duration>`: `None` waits indefinitely, `Some(Duration::ZERO)`
//! never waits, anything else waits at most that long. Everything else
//! returns promptly.
//!
//! ## Thread Safety
//!
//! Every type is `Send + Sync` for thread-safe contents and is meant to be
//! shared through `Arc` (see the `Shared*` aliases). [`ResourcePool`] is
//! itself a cheap handle and can be cloned directly.
//!
//! ## Time
//!
//! Rate limiters read time through the [`Clock`] trait. Production code uses
//! [`SystemClock`]; tests drive a [`ManualClock`] by hand.
//!
//! ## Logging
//!
//! Internals log through [`tracing`]. No subscriber is installed; attach one
//! in the application to see refills, evictions, sweeps and pool lifecycle.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_op_in_unsafe_fn)]

mod cache;
mod clock;
mod error;
mod pool;
mod queue;
mod rate_limiter;
mod sync;
mod utils;

pub use cache::{CacheStats, LruCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BoxError, Error, PutError, Result};
pub use pool::{PoolBuilder, PoolConfig, PoolStats, Pooled, ResourcePool};
pub use queue::{BoundedQueue, QueueStats};
pub use rate_limiter::{
    HealthStatus, KeyedLimiterConfig, KeyedRateLimiter, KeyedStats, KeyedTokenBucket,
    LimiterMetrics, MemoryOrdering, SlidingWindow, SlidingWindowConfig, SweeperHandle,
    TokenBucket, TokenBucketConfig, MAX_CAPACITY,
};
pub use sync::{AtomicCounter, ConcurrentMap};

use std::sync::Arc;
use std::time::Duration;

/// A token bucket wrapped in `Arc` for sharing across threads.
///
/// # Example
/// ```rust
/// use corral::{SharedTokenBucket, TokenBucket};
/// use std::sync::Arc;
///
/// let shared: SharedTokenBucket = Arc::new(TokenBucket::new(100, 10.0).unwrap());
///
/// let limiter = shared.clone();
/// std::thread::spawn(move || {
///     limiter.allow();
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedTokenBucket = Arc<TokenBucket>;

/// A sliding window limiter wrapped in `Arc`. Required for
/// [`SlidingWindow::start_sweeper`].
pub type SharedSlidingWindow<K> = Arc<SlidingWindow<K>>;

/// A keyed token bucket wrapped in `Arc`.
pub type SharedKeyedTokenBucket<K> = Arc<KeyedTokenBucket<K>>;

/// An LRU cache wrapped in `Arc`.
pub type SharedCache<K, V> = Arc<LruCache<K, V>>;

/// A bounded queue wrapped in `Arc`.
pub type SharedQueue<T> = Arc<BoundedQueue<T>>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use corral::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical use.
    //!
    //! # Example
    //! ```rust
    //! use corral::prelude::*;
    //!
    //! let limiter = TokenBucket::new(100, 10.0).unwrap();
    //! let cache: LruCache<u32, String> = LruCache::new(16).unwrap();
    //! let status = HealthStatus::Healthy;
    //! ```

    pub use crate::{
        BoundedQueue, Clock, HealthStatus, KeyedRateLimiter, KeyedTokenBucket, LruCache,
        PoolConfig, Pooled, ResourcePool, SharedCache, SharedQueue, SharedSlidingWindow,
        SharedTokenBucket, SlidingWindow, SlidingWindowConfig, SystemClock, TokenBucket,
        TokenBucketBuilder, TokenBucketConfig,
    };
}

/// Builder for token buckets with non-default settings.
///
/// # Example
///
/// ```rust
/// use corral::{MemoryOrdering, TokenBucketBuilder};
/// use std::time::Duration;
///
/// // 100 requests per minute, no burst beyond that
/// let limiter = TokenBucketBuilder::new()
///     .capacity(100)
///     .refill_every(100, Duration::from_secs(60))
///     .memory_ordering(MemoryOrdering::Relaxed)
///     .build()
///     .unwrap();
/// assert_eq!(limiter.capacity(), 100);
///
/// let result = TokenBucketBuilder::new().capacity(0).build();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucketBuilder {
    config: TokenBucketConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl TokenBucketBuilder {
    /// Starts from [`TokenBucketConfig::default`]: 50 tokens, 10 per second.
    pub fn new() -> Self {
        Self {
            config: TokenBucketConfig::default(),
            clock: None,
        }
    }

    /// Sets the burst capacity.
    pub fn capacity(mut self, tokens: u64) -> Self {
        self.config.capacity = tokens;
        self
    }

    /// Sets the refill rate in tokens per second.
    pub fn refill_rate(mut self, tokens_per_second: f64) -> Self {
        self.config.refill_rate = tokens_per_second;
        self
    }

    /// Sets the refill rate as `tokens` per `interval`.
    ///
    /// A zero interval yields an invalid rate that `build` rejects.
    pub fn refill_every(mut self, tokens: u64, interval: Duration) -> Self {
        self.config.refill_rate = tokens as f64 / interval.as_secs_f64();
        self
    }

    /// Sets the memory ordering for the bucket's atomics.
    pub fn memory_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.config.ordering = ordering;
        self
    }

    /// Reads time from `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the bucket.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if the settings are invalid.
    pub fn build(self) -> Result<TokenBucket> {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        TokenBucket::with_config(self.config, clock)
    }
}

impl Default for TokenBucketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_basic_functionality() {
        let limiter = TokenBucket::new(10, 1.0).unwrap();

        for _ in 0..10 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());

        let metrics = limiter.metrics();
        assert_eq!(metrics.total_admitted, 10);
        assert_eq!(metrics.total_rejected, 1);
    }

    #[test]
    fn test_builder() {
        let clock = ManualClock::shared();
        let limiter = TokenBucketBuilder::new()
            .capacity(50)
            .refill_rate(5.0)
            .clock(clock.clone())
            .build()
            .unwrap();

        assert_eq!(limiter.available_tokens(), 50.0);
        assert!(limiter.allow_n(50).unwrap());
        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.available_tokens(), 10.0);
    }

    #[test]
    fn test_builder_validation() {
        assert!(TokenBucketBuilder::new().capacity(0).build().is_err());
        assert!(TokenBucketBuilder::new().refill_rate(-1.0).build().is_err());
        assert!(TokenBucketBuilder::new()
            .refill_every(10, Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_chain() {
        let limiter = TokenBucketBuilder::default()
            .capacity(100)
            .refill_every(10, Duration::from_millis(500))
            .memory_ordering(MemoryOrdering::Sequential)
            .build()
            .unwrap();

        assert_eq!(limiter.capacity(), 100);
        assert_eq!(limiter.refill_rate(), 20.0);
    }

    #[test]
    fn test_thread_safety() {
        let limiter = Arc::new(
            TokenBucketBuilder::new()
                .capacity(1000)
                .refill_rate(100.0)
                .clock(ManualClock::shared())
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || (0..200).filter(|_| limiter.allow()).count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _limiter = TokenBucket::new(10, 1.0).unwrap();
        let _config = TokenBucketConfig::default();
        let _window: SlidingWindow<u32> =
            SlidingWindow::with_config(SlidingWindowConfig::default(), SystemClock::shared())
                .unwrap();
        let _status = HealthStatus::Healthy;
    }

    #[test]
    fn test_shared_types() {
        let _bucket: SharedTokenBucket = Arc::new(TokenBucket::new(10, 1.0).unwrap());
        let _cache: SharedCache<u32, u32> = Arc::new(LruCache::new(4).unwrap());
        let _queue: SharedQueue<u32> = Arc::new(BoundedQueue::new(4).unwrap());
        let _window: SharedSlidingWindow<u32> =
            Arc::new(SlidingWindow::new(4, Duration::from_secs(1)).unwrap());
        let _keyed: SharedKeyedTokenBucket<u32> =
            Arc::new(KeyedTokenBucket::new(TokenBucketConfig::default()).unwrap());
    }

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(MSRV, "1.70.0");
    }
}
