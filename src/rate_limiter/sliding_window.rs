//! # Sliding Window Log
//!
//! Each identity keeps the timestamps of its admitted requests. A request
//! is admitted when fewer than `max_requests` of them are younger than
//! `window`:
//!
//! ```text
//!     max_requests = 3, window = 1s
//!
//!     t=0.0  ●          admit (1)
//!     t=0.0  ● ●        admit (2)
//!     t=0.0  ● ● ●      admit (3)
//!     t=0.5  ● ● ● ✗    reject, three requests younger than 1s
//!     t=1.1  ○ ○ ○ ●    the t=0 entries aged out; admit
//!            └─┴─┘
//!            pruned (age >= window)
//! ```
//!
//! Unlike the token bucket there is no burst-then-refill shape: the limit
//! is exact over every trailing window. The cost is memory, bounded by
//! `max_requests` entries per active identity.

use super::config::{KeyedLimiterConfig, SlidingWindowConfig};
use super::identity::{IdentityState, IdentityTable};
use super::keyed::KeyedRateLimiter;
use super::metrics::KeyedStats;
use super::sweeper::{spawn_sweeper, SweeperHandle};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Admitted requests for one identity, oldest first.
#[derive(Debug, Default)]
struct RequestLog {
    /// `(admitted_at, weight)` pairs.
    entries: VecDeque<(Duration, u64)>,
    /// Sum of the weights in `entries`.
    weight: u64,
}

impl RequestLog {
    fn prune(&mut self, now: Duration, window: Duration) {
        while let Some(&(at, weight)) = self.entries.front() {
            if now.saturating_sub(at) < window {
                break;
            }
            self.entries.pop_front();
            self.weight -= weight;
        }
    }

    fn try_admit(&mut self, now: Duration, window: Duration, cost: u64, limit: u64) -> bool {
        self.prune(now, window);
        if self.weight + cost > limit {
            return false;
        }
        self.entries.push_back((now, cost));
        self.weight += cost;
        true
    }

    /// When the oldest entry leaves the window.
    fn next_expiry(&self, window: Duration) -> Option<Duration> {
        self.entries.front().map(|&(at, _)| at + window)
    }
}

impl IdentityState for RequestLog {
    fn expire(&mut self, now: Duration, window: Duration) -> bool {
        self.prune(now, window);
        self.entries.is_empty()
    }
}

/// Per-identity sliding window log rate limiter.
///
/// At most `max_requests` requests per identity are admitted in any
/// trailing `window`. Identities are tracked lazily and reclaimed once
/// their log is empty.
///
/// # Example
///
/// ```rust
/// use corral::{ManualClock, SlidingWindow, SlidingWindowConfig};
/// use std::time::Duration;
///
/// let clock = ManualClock::shared();
/// let limiter = SlidingWindow::with_config(
///     SlidingWindowConfig::new(3, Duration::from_secs(1)),
///     clock.clone(),
/// )
/// .unwrap();
///
/// for _ in 0..3 {
///     assert!(limiter.allow(&"alice"));
/// }
/// assert!(!limiter.allow(&"alice"));
/// assert!(limiter.allow(&"bob")); // identities are independent
///
/// clock.advance(Duration::from_millis(1_100));
/// assert!(limiter.allow(&"alice"));
/// ```
pub struct SlidingWindow<K> {
    table: IdentityTable<K, RequestLog>,
    max_requests: u64,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl<K> SlidingWindow<K>
where
    K: Hash + Eq + Clone,
{
    /// Allows `max_requests` per `window` per identity, reading the system
    /// clock.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if either argument is zero.
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        Self::with_config(
            SlidingWindowConfig::new(max_requests, window),
            SystemClock::shared(),
        )
    }

    /// Creates a limiter from a full configuration and an explicit clock.
    pub fn with_config(config: SlidingWindowConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            // A non-empty log must never be dropped early, so the emergency
            // horizon equals the window.
            table: IdentityTable::new(config.identities, config.window, config.window),
            max_requests: config.max_requests,
            window: config.window,
            clock,
        })
    }

    /// Admits one request from `identity` if it has budget left.
    pub fn allow(&self, identity: &K) -> bool {
        self.admit(identity, 1)
    }

    /// Admits a request of weight `cost`, all or nothing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `cost` is zero.
    pub fn allow_n(&self, identity: &K, cost: u64) -> Result<bool> {
        if cost == 0 {
            return Err(Error::argument("admission cost must be greater than 0"));
        }
        Ok(self.admit(identity, cost))
    }

    fn admit(&self, identity: &K, cost: u64) -> bool {
        if cost > self.max_requests {
            self.table.record(false);
            return false;
        }

        let now = self.clock.now();
        let (window, limit) = (self.window, self.max_requests);
        let admitted = self
            .table
            .with_state(identity, now, RequestLog::default, |log| {
                log.try_admit(now, window, cost, limit)
            })
            .unwrap_or(false);

        self.table.record(admitted);
        admitted
    }

    /// Requests `identity` could still make right now.
    pub fn remaining(&self, identity: &K) -> u64 {
        let now = self.clock.now();
        let window = self.window;
        self.table
            .inspect(identity, |log| {
                log.prune(now, window);
                log.weight
            })
            .map_or(self.max_requests, |used| self.max_requests.saturating_sub(used))
    }

    /// How long until `identity` regains budget; `None` if it has some now.
    ///
    /// ```rust
    /// use corral::{ManualClock, SlidingWindow, SlidingWindowConfig};
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::shared();
    /// let limiter = SlidingWindow::with_config(
    ///     SlidingWindowConfig::new(1, Duration::from_secs(10)),
    ///     clock.clone(),
    /// )
    /// .unwrap();
    ///
    /// limiter.allow(&7);
    /// clock.advance(Duration::from_secs(4));
    /// assert_eq!(limiter.retry_after(&7), Some(Duration::from_secs(6)));
    /// ```
    pub fn retry_after(&self, identity: &K) -> Option<Duration> {
        let now = self.clock.now();
        let (window, limit) = (self.window, self.max_requests);
        self.table
            .inspect(identity, |log| {
                log.prune(now, window);
                if log.weight < limit {
                    None
                } else {
                    log.next_expiry(window).map(|at| at.saturating_sub(now))
                }
            })
            .flatten()
    }

    /// Identities currently holding a log.
    pub fn tracked_identities(&self) -> usize {
        self.table.len()
    }

    /// Drops `identity`'s log, restoring its full budget.
    pub fn forget(&self, identity: &K) -> bool {
        self.table.forget(identity)
    }

    /// Drops every log.
    pub fn clear(&self) -> usize {
        self.table.clear()
    }

    /// Reclaims identities whose log is empty after pruning.
    pub fn sweep(&self) -> usize {
        self.table.sweep(self.clock.now())
    }

    /// Configured per-identity limit.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
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

impl<K> SlidingWindow<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Starts a thread that calls [`sweep`](Self::sweep) every
    /// `sweep_interval`.
    ///
    /// The thread holds only a weak reference and exits on its own once
    /// the limiter is dropped, or when the handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadSpawn`] if the OS refuses to start the thread.
    pub fn start_sweeper(self: &Arc<Self>) -> Result<SweeperHandle> {
        spawn_sweeper(
            "corral-window-sweeper",
            self.table.config().sweep_interval,
            Arc::downgrade(self),
            Self::sweep,
        )
    }
}

impl<K> KeyedRateLimiter<K> for SlidingWindow<K>
where
    K: Hash + Eq + Clone,
{
    fn allow(&self, identity: &K) -> bool {
        SlidingWindow::allow(self, identity)
    }

    fn allow_n(&self, identity: &K, cost: u64) -> Result<bool> {
        SlidingWindow::allow_n(self, identity, cost)
    }

    fn tracked_identities(&self) -> usize {
        SlidingWindow::tracked_identities(self)
    }

    fn sweep(&self) -> usize {
        SlidingWindow::sweep(self)
    }

    fn stats(&self) -> KeyedStats {
        SlidingWindow::stats(self)
    }
}

impl<K> std::fmt::Debug for SlidingWindow<K>
where
    K: Hash + Eq + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("tracked_identities", &self.tracked_identities())
            .finish()
    }
}
