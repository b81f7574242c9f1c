//! # Keyed Rate Limiting
//!
//! One independent limiter per identity (user id, IP address, API key),
//! created on first use and reclaimed once it no longer affects decisions.
//!
//! ```text
//!     KeyedTokenBucket<K>
//!     ├── template TokenBucket (settings + clock)
//!     └── IdentityTable<K, Arc<TokenBucket>>
//!          ├── "alice" → TokenBucket
//!          ├── "bob"   → TokenBucket
//!          └── ...       bounded by max_identities
//! ```
//!
//! A bucket is reclaimed only when it has been idle for `idle_timeout`
//! **and** has refilled completely: a fresh bucket would start in the same
//! state, so forgetting it never loosens the limit. Buckets handed out by
//! [`KeyedTokenBucket::limiter`] are pinned until every handle is dropped.

use super::config::{KeyedLimiterConfig, TokenBucketConfig};
use super::identity::{IdentityState, IdentityTable};
use super::metrics::KeyedStats;
use super::sweeper::{spawn_sweeper, SweeperHandle};
use super::token_bucket::TokenBucket;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Shortest idle period an emergency sweep will accept.
const EMERGENCY_MIN_IDLE: Duration = Duration::from_secs(1);

/// Common interface of the per-identity limiters.
///
/// ```rust
/// use corral::{KeyedRateLimiter, KeyedTokenBucket, SlidingWindow, TokenBucketConfig};
/// use std::time::Duration;
///
/// let limiters: Vec<Box<dyn KeyedRateLimiter<&str>>> = vec![
///     Box::new(KeyedTokenBucket::new(TokenBucketConfig::new(2, 1.0)).unwrap()),
///     Box::new(SlidingWindow::new(2, Duration::from_secs(1)).unwrap()),
/// ];
///
/// for limiter in &limiters {
///     assert!(limiter.allow(&"alice"));
///     assert!(limiter.allow(&"alice"));
///     assert!(!limiter.allow(&"alice"));
///     assert!(limiter.allow(&"bob"));
///     assert_eq!(limiter.tracked_identities(), 2);
/// }
/// ```
pub trait KeyedRateLimiter<K> {
    /// Admits one request from `identity`.
    fn allow(&self, identity: &K) -> bool;

    /// Admits a request of weight `cost` from `identity`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `cost` is zero.
    fn allow_n(&self, identity: &K, cost: u64) -> Result<bool>;

    /// Identities currently holding state.
    fn tracked_identities(&self) -> usize;

    /// Reclaims identities whose state no longer matters; returns how many.
    fn sweep(&self) -> usize;

    /// Snapshot of identity and decision counters.
    fn stats(&self) -> KeyedStats;
}

/// A bucket's state is disposable once it is idle, full again and held by
/// nobody outside the table.
impl IdentityState for Arc<TokenBucket> {
    fn expire(&mut self, now: Duration, idle: Duration) -> bool {
        // Handles are only cloned under the shard lock this runs under.
        Arc::strong_count(self) == 1
            && now.saturating_sub(self.last_access()) >= idle
            && self.is_full()
    }
}

/// A [`TokenBucket`] per identity.
///
/// ```rust
/// use corral::{KeyedTokenBucket, TokenBucketConfig};
///
/// let limiter = KeyedTokenBucket::new(TokenBucketConfig::new(3, 1.0)).unwrap();
///
/// for _ in 0..3 {
///     assert!(limiter.allow(&"10.0.0.1"));
/// }
/// assert!(!limiter.allow(&"10.0.0.1"));
/// assert!(limiter.allow(&"10.0.0.2"));
/// ```
pub struct KeyedTokenBucket<K> {
    table: IdentityTable<K, Arc<TokenBucket>>,
    template: TokenBucket,
    clock: Arc<dyn Clock>,
}

impl<K> KeyedTokenBucket<K>
where
    K: Hash + Eq + Clone,
{
    /// Per-identity buckets built from `bucket`, with default identity
    /// bounds and the system clock.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `bucket` is invalid.
    pub fn new(bucket: TokenBucketConfig) -> Result<Self> {
        Self::with_config(bucket, KeyedLimiterConfig::default(), SystemClock::shared())
    }

    /// Fully configured constructor.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if either configuration is invalid.
    pub fn with_config(
        bucket: TokenBucketConfig,
        identities: KeyedLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        identities.validate()?;
        let template = TokenBucket::with_config(bucket, Arc::clone(&clock))?;

        let idle = identities.idle_timeout;
        let emergency_idle = (idle / 2).max(EMERGENCY_MIN_IDLE);

        Ok(Self {
            table: IdentityTable::new(identities, idle, emergency_idle),
            template,
            clock,
        })
    }

    /// The bucket for `identity`, created on first use.
    ///
    /// The returned handle shares its balance with [`allow`](Self::allow).
    /// While any handle is alive the bucket is never reclaimed, so spending
    /// through it always counts against `identity`.
    ///
    /// Returns `None` when `identity` is new and the identity table is full.
    pub fn limiter(&self, identity: &K) -> Option<Arc<TokenBucket>> {
        self.with_bucket(identity, |bucket| Arc::clone(bucket))
    }

    /// Runs `f` on `identity`'s bucket under its shard lock, so a sweep can
    /// never swap the bucket out mid-decision.
    fn with_bucket<R>(&self, identity: &K, f: impl FnOnce(&Arc<TokenBucket>) -> R) -> Option<R> {
        let template = &self.template;
        self.table.with_state(
            identity,
            self.clock.now(),
            || Arc::new(template.sibling()),
            |bucket| f(bucket),
        )
    }

    /// Admits one request from `identity`.
    pub fn allow(&self, identity: &K) -> bool {
        let admitted = self.with_bucket(identity, |bucket| bucket.allow()).unwrap_or(false);
        self.table.record(admitted);
        admitted
    }

    /// Admits a request of weight `cost` from `identity`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `cost` is zero.
    pub fn allow_n(&self, identity: &K, cost: u64) -> Result<bool> {
        if cost == 0 {
            return Err(Error::argument("admission cost must be greater than 0"));
        }
        let admitted = match self.with_bucket(identity, |bucket| bucket.allow_n(cost)) {
            Some(decision) => decision?,
            None => false,
        };
        self.table.record(admitted);
        Ok(admitted)
    }

    /// Tokens `identity` has right now; a full bucket if it is untracked.
    pub fn available_tokens(&self, identity: &K) -> f64 {
        self.table
            .inspect(identity, |bucket| bucket.available_tokens())
            .unwrap_or(self.template.capacity() as f64)
    }

    /// Identities currently holding a bucket.
    pub fn tracked_identities(&self) -> usize {
        self.table.len()
    }

    /// Drops `identity`'s bucket, restoring its full burst.
    pub fn forget(&self, identity: &K) -> bool {
        self.table.forget(identity)
    }

    /// Drops every bucket.
    pub fn clear(&self) -> usize {
        self.table.clear()
    }

    /// Reclaims buckets that are idle and full.
    pub fn sweep(&self) -> usize {
        self.table.sweep(self.clock.now())
    }

    /// Identity bounds in effect.
    pub fn identity_config(&self) -> &KeyedLimiterConfig {
        self.table.config()
    }

    /// Snapshot of the identity table and decision counters.
    pub fn stats(&self) -> KeyedStats {
        self.table.stats()
    }
}

impl<K> KeyedTokenBucket<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Starts a thread that calls [`sweep`](Self::sweep) every
    /// `sweep_interval`. See [`SweeperHandle`].
    ///
    /// # Errors
    ///
    /// [`Error::ThreadSpawn`] if the OS refuses to start the thread.
    pub fn start_sweeper(self: &Arc<Self>) -> Result<SweeperHandle> {
        spawn_sweeper(
            "corral-bucket-sweeper",
            self.table.config().sweep_interval,
            Arc::downgrade(self),
            Self::sweep,
        )
    }
}

impl<K> KeyedRateLimiter<K> for KeyedTokenBucket<K>
where
    K: Hash + Eq + Clone,
{
    fn allow(&self, identity: &K) -> bool {
        KeyedTokenBucket::allow(self, identity)
    }

    fn allow_n(&self, identity: &K, cost: u64) -> Result<bool> {
        KeyedTokenBucket::allow_n(self, identity, cost)
    }

    fn tracked_identities(&self) -> usize {
        KeyedTokenBucket::tracked_identities(self)
    }

    fn sweep(&self) -> usize {
        KeyedTokenBucket::sweep(self)
    }

    fn stats(&self) -> KeyedStats {
        KeyedTokenBucket::stats(self)
    }
}

impl<K> std::fmt::Debug for KeyedTokenBucket<K>
where
    K: Hash + Eq + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedTokenBucket")
            .field("capacity", &self.template.capacity())
            .field("refill_rate", &self.template.refill_rate())
            .field("tracked_identities", &self.tracked_identities())
            .finish()
    }
}
