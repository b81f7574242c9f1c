//! Sharded concurrent map.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;

/// Upper bound on shard count; more shards only cost memory.
const MAX_SHARDS: usize = 64;

/// Lower bound on shard count (DashMap needs a power of two above one).
const MIN_SHARDS: usize = 4;

/// Picks a shard count from the number of CPUs.
pub(crate) fn default_shard_amount() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .next_power_of_two()
        .clamp(MIN_SHARDS, MAX_SHARDS)
}

/// Thread-safe keyed map.
///
/// Backed by a [`DashMap`] with the `ahash` hasher. Each key lives in one
/// shard guarded by its own lock, so every single-key operation, including
/// the closure passed to [`update`](Self::update), is indivisible. Nothing is
/// promised about the relative order of operations on different keys.
///
/// # Example
///
/// ```rust
/// use corral::ConcurrentMap;
///
/// let sessions: ConcurrentMap<&str, u32> = ConcurrentMap::new();
/// sessions.put("alice", 1);
/// let visits = sessions.update("alice", || 0, |n| {
///     *n += 1;
///     *n
/// });
/// assert_eq!(visits, 2);
/// assert!(sessions.remove("alice"));
/// assert_eq!(sessions.get("alice"), None);
/// ```
pub struct ConcurrentMap<K, V> {
    inner: DashMap<K, V, ahash::RandomState>,
}

impl<K: Eq + Hash, V> ConcurrentMap<K, V> {
    /// Creates an empty map sharded by CPU count.
    pub fn new() -> Self {
        Self::with_shards(0, default_shard_amount())
    }

    /// Creates a map with room for `capacity` entries over `shards` shards.
    ///
    /// `shards` is rounded up to a power of two within `4..=64`.
    pub fn with_shards(capacity: usize, shards: usize) -> Self {
        let shards = shards.next_power_of_two().clamp(MIN_SHARDS, MAX_SHARDS);
        Self {
            inner: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                ahash::RandomState::new(),
                shards,
            ),
        }
    }

    /// Returns a clone of the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts or overwrites; returns the previous value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove(key).is_some()
    }

    /// Removes `key` only if `predicate` holds for its current value.
    ///
    /// The check and the removal happen under the same shard lock.
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&K, &V) -> bool) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove_if(key, predicate).is_some()
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(key)
    }

    /// Runs `f` on the value for `key`, inserting `init()` first if absent.
    ///
    /// The whole read-modify-write holds the key's shard lock. `f` must not
    /// touch this map.
    pub fn update<R>(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut entry = self.inner.entry(key).or_insert_with(init);
        f(entry.value_mut())
    }

    /// Runs `f` on the value for `key`. When the key is absent, `admit`
    /// decides whether to insert; returning `None` leaves the map unchanged
    /// and skips `f`.
    ///
    /// `admit` runs under the shard lock, so at most one caller inserts.
    pub(crate) fn update_or_admit<R>(
        &self,
        key: K,
        admit: impl FnOnce() -> Option<V>,
        f: impl FnOnce(&mut V) -> R,
    ) -> Option<R> {
        match self.inner.entry(key) {
            Entry::Occupied(mut occupied) => Some(f(occupied.get_mut())),
            Entry::Vacant(vacant) => {
                let mut inserted = vacant.insert(admit()?);
                Some(f(inserted.value_mut()))
            }
        }
    }

    /// Runs `f` on the value for `key` if present.
    pub fn update_existing<Q, R>(&self, key: &Q, f: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Keeps only entries for which `keep` returns `true`; returns how many
    /// were removed. Shards are visited one at a time.
    pub fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let mut removed = 0;
        self.inner.retain(|k, v| {
            let kept = keep(k, v);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    /// Snapshot of the keys. Concurrent writers may change the map meanwhile.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes every entry; returns how many were removed.
    ///
    /// Shards are emptied one at a time, so an insert racing the clear is
    /// either removed and counted or left in place.
    pub fn clear(&self) -> usize {
        self.retain(|_, _| false)
    }

    /// Allocated capacity across all shards.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Releases spare capacity.
    pub fn shrink_to_fit(&self) {
        self.inner.shrink_to_fit();
    }
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.len())
            .finish()
    }
}
