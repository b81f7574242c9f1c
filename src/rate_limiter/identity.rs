//! # Identity Table
//!
//! Per-identity limiter state shared by [`SlidingWindow`](crate::SlidingWindow)
//! and [`KeyedTokenBucket`](crate::KeyedTokenBucket).
//!
//! ```text
//!     allow(&"alice") ─┐
//!     allow(&"bob") ───┼──► IdentityTable ──► ConcurrentMap<K, S>
//!     allow(&"carol") ─┘         │            ┌─────────────┐
//!                                │            │ alice → S   │
//!                           tracked count     │ bob   → S   │
//!                           (AtomicCounter)   │ carol → S   │
//!                                             └─────────────┘
//! ```
//!
//! ## Bounded Memory
//!
//! - At 90% of `max_identities` a new identity triggers an emergency sweep
//!   with a shorter horizon, aiming for 70%.
//! - At 100% new identities are rejected until something is reclaimed.
//! - Only one emergency sweep runs at a time; other callers skip it.

use super::config::KeyedLimiterConfig;
use super::metrics::KeyedStats;
use crate::sync::{default_shard_amount, AtomicCounter, ConcurrentMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shortest horizon an emergency sweep will use.
const EMERGENCY_MIN_HORIZON: Duration = Duration::from_secs(1);

/// State kept for one identity.
pub(crate) trait IdentityState {
    /// Drops history older than `horizon` as of `now`. Returns `true` when
    /// nothing that could affect a future decision is left.
    fn expire(&mut self, now: Duration, horizon: Duration) -> bool;
}

pub(crate) struct IdentityTable<K, S> {
    entries: ConcurrentMap<K, S>,
    config: KeyedLimiterConfig,
    /// Horizon for regular sweeps.
    horizon: Duration,
    /// Horizon for emergency sweeps; never longer than `horizon`.
    emergency_horizon: Duration,

    tracked: AtomicCounter,
    total_created: AtomicCounter,
    total_reclaimed: AtomicCounter,
    identities_rejected: AtomicCounter,
    total_admitted: AtomicCounter,
    total_rejected: AtomicCounter,
    sweep_in_progress: AtomicBool,
}

impl<K, S> IdentityTable<K, S>
where
    K: Hash + Eq + Clone,
    S: IdentityState,
{
    /// `emergency_horizon` lets the caller trade accuracy for room when the
    /// table is nearly full; pass `horizon` to never trade.
    pub(crate) fn new(
        config: KeyedLimiterConfig,
        horizon: Duration,
        emergency_horizon: Duration,
    ) -> Self {
        let shards = default_shard_amount();
        let initial_capacity = (config.max_identities / shards).clamp(16, 1024) * shards;

        Self {
            entries: ConcurrentMap::with_shards(initial_capacity, shards),
            config,
            horizon,
            emergency_horizon: emergency_horizon.min(horizon),
            tracked: AtomicCounter::default(),
            total_created: AtomicCounter::default(),
            total_reclaimed: AtomicCounter::default(),
            identities_rejected: AtomicCounter::default(),
            total_admitted: AtomicCounter::default(),
            total_rejected: AtomicCounter::default(),
            sweep_in_progress: AtomicBool::new(false),
        }
    }

    /// Runs `f` on the state for `key`, creating it with `init` if the table
    /// has room. Returns `None` when the identity is new and the table is
    /// full.
    pub(crate) fn with_state<R>(
        &self,
        key: &K,
        now: Duration,
        init: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> R,
    ) -> Option<R> {
        // Sweeping takes every shard lock, so it must happen before
        // update_or_admit takes one.
        if !self.entries.contains_key(key) && self.len() >= self.config.sweep_threshold() {
            self.emergency_sweep(now);
        }

        self.entries
            .update_or_admit(key.clone(), || self.reserve().then(init), f)
    }

    /// Runs `f` on the state for `key` only if it exists.
    pub(crate) fn inspect<R>(&self, key: &K, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.entries.update_existing(key, f)
    }

    /// Claims a slot for a new identity.
    fn reserve(&self) -> bool {
        let tracked = self.tracked.increment(1);
        if tracked as usize > self.config.max_identities {
            self.tracked.decrement(1);
            self.identities_rejected.increment(1);
            warn!(
                "Identity capacity reached ({} tracked), rejecting new identity",
                self.config.max_identities
            );
            return false;
        }

        self.total_created.increment(1);
        debug!("Tracking new identity (total: {})", tracked);
        true
    }

    fn emergency_sweep(&self, now: Duration) {
        if self
            .sweep_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let _guard = SweepGuard {
            flag: &self.sweep_in_progress,
        };

        let before = self.len();
        let target = self.config.sweep_target();
        if before <= target {
            return;
        }

        info!("Starting emergency sweep (current: {} identities)", before);
        let horizon = self.emergency_horizon.max(EMERGENCY_MIN_HORIZON.min(self.horizon));
        let removed = self.remove_expired(now, horizon);

        let after = self.len();
        if after > target {
            warn!(
                "Emergency sweep incomplete: removed {} identities, {} remain (target {})",
                removed, after, target
            );
        } else {
            info!("Emergency sweep removed {} identities", removed);
        }
    }

    /// Reclaims every identity with nothing left to remember.
    pub(crate) fn sweep(&self, now: Duration) -> usize {
        if self.sweep_in_progress.load(Ordering::Acquire) {
            return 0;
        }

        let removed = self.remove_expired(now, self.horizon);
        if removed > 0 {
            debug!("Sweep reclaimed {} identities", removed);
        }

        let tracked = self.len();
        if tracked > self.config.sweep_threshold() {
            warn!(
                "High identity usage: {} tracked ({}% of capacity)",
                tracked,
                tracked * 100 / self.config.max_identities.max(1)
            );
        }

        self.shrink_to_fit();
        removed
    }

    fn remove_expired(&self, now: Duration, horizon: Duration) -> usize {
        let removed = self.entries.retain(|_, state| !state.expire(now, horizon));
        if removed > 0 {
            self.tracked.decrement(removed as i64);
            self.total_reclaimed.increment(removed as i64);
        }
        removed
    }

    fn shrink_to_fit(&self) {
        let len = self.len();
        let capacity = self.entries.capacity();
        if capacity > len.saturating_mul(4) && capacity > 1024 {
            self.entries.shrink_to_fit();
            debug!("Shrunk identity table capacity from {} to ~{}", capacity, len);
        }
    }

    /// Drops `key`'s state; returns whether it was tracked.
    pub(crate) fn forget(&self, key: &K) -> bool {
        let removed = self.entries.remove(key);
        if removed {
            self.tracked.decrement(1);
            self.total_reclaimed.increment(1);
        }
        removed
    }

    /// Drops every identity; returns how many there were.
    pub(crate) fn clear(&self) -> usize {
        let count = self.entries.clear();
        self.tracked.decrement(count as i64);
        self.total_reclaimed.increment(count as i64);
        info!("Cleared all {} tracked identities", count);
        count
    }

    pub(crate) fn record(&self, admitted: bool) {
        if admitted {
            self.total_admitted.increment(1);
        } else {
            self.total_rejected.increment(1);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tracked.get_u64() as usize
    }

    pub(crate) fn config(&self) -> &KeyedLimiterConfig {
        &self.config
    }

    pub(crate) fn stats(&self) -> KeyedStats {
        KeyedStats {
            tracked: self.len(),
            max_identities: self.config.max_identities,
            total_created: self.total_created.get_u64(),
            total_reclaimed: self.total_reclaimed.get_u64(),
            identities_rejected: self.identities_rejected.get_u64(),
            total_admitted: self.total_admitted.get_u64(),
            total_rejected: self.total_rejected.get_u64(),
        }
    }
}

/// Clears the emergency-sweep flag however the sweep exits.
struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expires once `last_seen` is at least `horizon` old.
    struct Seen(Duration);

    impl IdentityState for Seen {
        fn expire(&mut self, now: Duration, horizon: Duration) -> bool {
            now.saturating_sub(self.0) >= horizon
        }
    }

    fn table(max: usize) -> IdentityTable<u32, Seen> {
        IdentityTable::new(
            KeyedLimiterConfig::default().with_max_identities(max),
            Duration::from_secs(10),
            Duration::from_secs(2),
        )
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn creates_lazily_and_counts() {
        let table = table(100);
        assert_eq!(table.with_state(&1, secs(0), || Seen(secs(0)), |_| 7), Some(7));
        assert_eq!(table.with_state(&1, secs(1), || unreachable!(), |s| s.0), Some(secs(0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().total_created, 1);
        assert_eq!(table.inspect(&2, |s| s.0), None);
    }

    #[test]
    fn rejects_new_identities_when_full() {
        // Threshold is 90% of 10 = 9, target 7.
        let table = table(10);
        for id in 0..10 {
            assert!(table.with_state(&id, secs(0), || Seen(secs(0)), |_| ()).is_some());
        }

        // Nothing is old enough to reclaim, so the 11th is refused.
        assert!(table.with_state(&99, secs(1), || Seen(secs(1)), |_| ()).is_none());
        assert_eq!(table.len(), 10);
        assert_eq!(table.stats().identities_rejected, 1);

        // Existing identities still work.
        assert!(table.with_state(&3, secs(1), || unreachable!(), |_| ()).is_some());
    }

    #[test]
    fn emergency_sweep_uses_short_horizon() {
        let table = table(10);
        for id in 0..9 {
            table.with_state(&id, secs(0), || Seen(secs(0)), |_| ());
        }

        // 3s later everything is past the 2s emergency horizon but not the
        // regular 10s one.
        assert_eq!(table.sweep(secs(3)), 0);
        assert!(table.with_state(&100, secs(3), || Seen(secs(3)), |_| ()).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().total_reclaimed, 9);
    }

    #[test]
    fn sweep_forget_clear() {
        let table = table(100);
        for id in 0..5 {
            table.with_state(&id, secs(id as u64 * 5), || Seen(secs(id as u64 * 5)), |_| ());
        }

        // At t=20 only ids seen at 0, 5 and 10 are 10s old.
        assert_eq!(table.sweep(secs(20)), 3);
        assert_eq!(table.len(), 2);

        assert!(table.forget(&4));
        assert!(!table.forget(&4));
        assert_eq!(table.clear(), 1);
        assert_eq!(table.len(), 0);
        assert_eq!(table.stats().total_reclaimed, 5);
    }

    #[test]
    fn clear_racing_new_identities_keeps_count_exact() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(table(1_000_000));
        let writers: Vec<_> = (0..4u32)
            .map(|t| {
                let table = table.clone();
                thread::spawn(move || {
                    for i in 0..5_000 {
                        table.with_state(&(t * 5_000 + i), secs(0), || Seen(secs(0)), |_| ());
                    }
                })
            })
            .collect();

        while writers.iter().any(|w| !w.is_finished()) {
            table.clear();
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(table.stats().tracked, table.entries.len());
        table.clear();
        assert_eq!(table.stats().tracked, 0);
    }

    #[test]
    fn records_decisions() {
        let table = table(10);
        table.record(true);
        table.record(true);
        table.record(false);
        let stats = table.stats();
        assert_eq!(stats.total_admitted, 2);
        assert_eq!(stats.total_rejected, 1);
    }
}
