//! # Least-Recently-Used Cache
//!
//! ```text
//!     index: HashMap<K, slot>          list: RecencyList<(K, V)>
//!     ┌──────────┐
//!     │ "a" → 4  │─────────┐
//!     │ "b" → 2  │───┐     ▼
//!     │ "c" → 7  │─┐ │   [HEAD] ⇄ [a] ⇄ [b] ⇄ [c] ⇄ [TAIL]
//!     └──────────┘ │ │             mru         lru
//!                  │ └──────────────────┘     ▲
//!                  └──────────────────────────┘
//!
//!     get("b")  → move slot 2 to the front          O(1)
//!     put("d")  → full? pop_back (evicts "c"), push  O(1)
//! ```
//!
//! One mutex guards the index and the list together. Evicted and replaced
//! values are dropped after the lock is released.

use super::list::RecencyList;
use super::stats::{CacheCounters, CacheStats};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

struct LruInner<K, V> {
    index: HashMap<K, usize, ahash::RandomState>,
    list: RecencyList<(K, V)>,
}

/// Outcome of an insert, resolved outside the lock.
struct Inserted<K, V> {
    previous: Option<V>,
    evicted: Option<(K, V)>,
}

/// Thread-safe, capacity-bounded cache with LRU eviction.
///
/// `get` and `put` are O(1). Every access strictly reorders the key it
/// touches, so recency ties never occur and the victim is always unique.
///
/// # Example
///
/// ```rust
/// use corral::LruCache;
///
/// let cache = LruCache::new(2).unwrap();
/// cache.put("a", 1);
/// cache.put("b", 2);
/// assert_eq!(cache.get("a"), Some(1)); // "a" is now most recent
/// cache.put("c", 3);                   // evicts "b"
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.len(), 2);
/// ```
pub struct LruCache<K, V> {
    inner: Mutex<LruInner<K, V>>,
    capacity: usize,
    counters: CacheCounters,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("cache capacity must be greater than 0"));
        }

        // Pre-size modestly; huge capacities should not allocate up front.
        let initial = capacity.min(1024);
        Ok(Self {
            inner: Mutex::new(LruInner {
                index: HashMap::with_capacity_and_hasher(initial, ahash::RandomState::new()),
                list: RecencyList::with_capacity(initial),
            }),
            capacity,
            counters: CacheCounters::default(),
        })
    }

    /// Returns a clone of the value and marks the key most recently used.
    ///
    /// A miss returns `None` and changes nothing.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let found = {
            let mut inner = self.inner.lock();
            match inner.index.get(key).copied() {
                Some(idx) => {
                    inner.list.move_to_front(idx);
                    inner.list.get(idx).map(|(_, v)| v.clone())
                }
                None => None,
            }
        };

        match found {
            Some(_) => self.counters.hits.increment(1),
            None => self.counters.misses.increment(1),
        };
        found
    }

    /// Returns a clone of the value without touching recency or stats.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let inner = self.inner.lock();
        let idx = *inner.index.get(key)?;
        inner.list.get(idx).map(|(_, v)| v.clone())
    }

    /// Returns `true` if `key` is cached. Does not touch recency.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().index.contains_key(key)
    }

    /// Inserts or overwrites `key` and marks it most recently used.
    ///
    /// Returns the previous value on overwrite. When a new key would exceed
    /// capacity, the least-recently-used entry is evicted silently; use
    /// [`put_and_evict`](Self::put_and_evict) to observe it.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.insert(key, value).previous
    }

    /// Like [`put`](Self::put) but returns the evicted entry, if any.
    ///
    /// ```rust
    /// use corral::LruCache;
    ///
    /// let cache = LruCache::new(1).unwrap();
    /// assert!(cache.put_and_evict(1, "one").is_none());
    /// assert_eq!(cache.put_and_evict(2, "two"), Some((1, "one")));
    /// ```
    pub fn put_and_evict(&self, key: K, value: V) -> Option<(K, V)> {
        self.insert(key, value).evicted
    }

    fn insert(&self, key: K, value: V) -> Inserted<K, V> {
        let outcome = {
            let mut inner = self.inner.lock();
            match inner.index.get(&key).copied() {
                Some(idx) => {
                    inner.list.move_to_front(idx);
                    let previous = inner
                        .list
                        .get_mut(idx)
                        .map(|(_, v)| std::mem::replace(v, value));
                    Inserted {
                        previous,
                        evicted: None,
                    }
                }
                None => {
                    let evicted = if inner.list.len() >= self.capacity {
                        let victim = inner.list.pop_back();
                        if let Some((k, _)) = &victim {
                            inner.index.remove(k);
                        }
                        victim
                    } else {
                        None
                    };
                    let idx = inner.list.push_front((key.clone(), value));
                    inner.index.insert(key, idx);
                    Inserted {
                        previous: None,
                        evicted,
                    }
                }
            }
        };

        if outcome.previous.is_some() {
            self.counters.updates.increment(1);
        } else {
            self.counters.inserts.increment(1);
        }
        if outcome.evicted.is_some() {
            self.counters.evictions.increment(1);
            debug!("LRU cache evicted least-recently-used entry (capacity {})", self.capacity);
        }
        outcome
    }

    /// Removes `key`; returns its value if it was cached.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        let idx = inner.index.remove(key)?;
        inner.list.remove(idx).map(|(_, v)| v)
    }

    /// Removes and returns the least-recently-used entry.
    pub fn pop_lru(&self) -> Option<(K, V)> {
        let mut inner = self.inner.lock();
        let (key, value) = inner.list.pop_back()?;
        inner.index.remove(&key);
        Some((key, value))
    }

    /// Keys ordered from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.inner
            .lock()
            .list
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().list.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry; returns how many there were. Stats are kept.
    pub fn clear(&self) -> usize {
        let (index, list) = {
            let mut inner = self.inner.lock();
            let index = std::mem::take(&mut inner.index);
            let mut list = RecencyList::with_capacity(0);
            std::mem::swap(&mut list, &mut inner.list);
            (index, list)
        };
        let count = list.len();
        drop(index);
        drop(list);
        count
    }

    /// Snapshot of hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.capacity)
    }

    /// Zeroes the counters.
    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    #[cfg(test)]
    fn check_invariants(&self) -> std::result::Result<(), String> {
        let inner = self.inner.lock();
        inner.list.check_invariants()?;
        if inner.index.len() != inner.list.len() {
            return Err(format!(
                "index has {} keys, list has {}",
                inner.index.len(),
                inner.list.len()
            ));
        }
        if inner.list.len() > self.capacity {
            return Err("over capacity".into());
        }
        for (key, &idx) in inner.index.iter() {
            match inner.list.get(idx) {
                Some((k, _)) if k == key => {}
                _ => return Err(format!("index points at wrong slot {}", idx)),
            }
        }
        Ok(())
    }
}

impl<K, V> std::fmt::Debug for LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_capacity_is_rejected() {
        let err = LruCache::<u32, u32>::new(0).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(2).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.get("A"), Some(1));
        cache.put("C", 3);

        assert_eq!(cache.get("B"), None);
        assert_eq!(cache.get("A"), Some(1));
        assert_eq!(cache.get("C"), Some(3));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn put_overwrites_and_refreshes() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 10), Some(1));

        // "b" is now the victim.
        assert_eq!(cache.put_and_evict("c", 3), Some(("b", 2)));
        assert_eq!(cache.keys_by_recency(), vec!["c", "a"]);
    }

    #[test]
    fn miss_has_no_side_effects() {
        let cache = LruCache::new(2).unwrap();
        cache.put(1, "x");
        cache.put(2, "y");
        assert_eq!(cache.get(&3), None);
        assert_eq!(cache.keys_by_recency(), vec![2, 1]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn peek_does_not_reorder() {
        let cache = LruCache::new(2).unwrap();
        cache.put(1, 'a');
        cache.put(2, 'b');
        assert_eq!(cache.peek(&1), Some('a'));
        assert!(cache.contains_key(&1));

        cache.put(3, 'c');
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn remove_and_pop_lru() {
        let cache = LruCache::new(3).unwrap();
        cache.put(1, 1);
        cache.put(2, 2);
        cache.put(3, 3);

        assert_eq!(cache.remove(&2), Some(2));
        assert_eq!(cache.remove(&2), None);
        assert_eq!(cache.pop_lru(), Some((1, 1)));
        assert_eq!(cache.len(), 1);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn clear_empties_cache() {
        let cache = LruCache::new(4).unwrap();
        for i in 0..4 {
            cache.put(i, i);
        }
        assert_eq!(cache.clear(), 4);
        assert!(cache.is_empty());
        cache.put(9, 9);
        assert_eq!(cache.get(&9), Some(9));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn stats_track_activity() {
        let cache = LruCache::new(1).unwrap();
        cache.put("k", 1);
        cache.put("k", 2);
        cache.get("k");
        cache.get("missing");
        cache.put("j", 3);

        let stats = cache.stats();
        assert_eq!(stats.inserts, 2);
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.len, 1);

        cache.reset_stats();
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn string_keys_borrow_as_str() {
        let cache: LruCache<String, u32> = LruCache::new(2).unwrap();
        cache.put("alpha".to_string(), 1);
        assert_eq!(cache.get("alpha"), Some(1));
        assert_eq!(cache.remove("alpha"), Some(1));
    }

    #[test]
    fn concurrent_access_respects_capacity() {
        let cache = Arc::new(LruCache::new(64).unwrap());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..2_000u64 {
                        let key = (t * 7919 + i) % 256;
                        if i % 3 == 0 {
                            cache.get(&key);
                        } else {
                            cache.put(key, i);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
        cache.check_invariants().unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Get(u8),
        Put(u8, u16),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u8>().prop_map(Op::Get),
            (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Op::Put(k, v)),
            any::<u8>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(
            capacity in 1usize..16,
            ops in prop::collection::vec(op_strategy(), 0..300),
        ) {
            let cache = LruCache::new(capacity).unwrap();
            for op in ops {
                match op {
                    Op::Get(k) => { cache.get(&k); }
                    Op::Put(k, v) => { cache.put(k, v); }
                    Op::Remove(k) => { cache.remove(&k); }
                }
                prop_assert!(cache.len() <= capacity);
            }
            prop_assert!(cache.check_invariants().is_ok());
        }

        #[test]
        fn matches_reference_model(
            capacity in 1usize..8,
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            // Reference: Vec ordered most-recent first.
            let cache = LruCache::new(capacity).unwrap();
            let mut model: Vec<(u8, u16)> = Vec::new();

            for op in ops {
                match op {
                    Op::Get(k) => {
                        let expected = model.iter().position(|(mk, _)| *mk == k).map(|pos| {
                            let entry = model.remove(pos);
                            model.insert(0, entry);
                            entry.1
                        });
                        prop_assert_eq!(cache.get(&k), expected);
                    }
                    Op::Put(k, v) => {
                        if let Some(pos) = model.iter().position(|(mk, _)| *mk == k) {
                            model.remove(pos);
                        } else if model.len() == capacity {
                            model.pop();
                        }
                        model.insert(0, (k, v));
                        cache.put(k, v);
                    }
                    Op::Remove(k) => {
                        let expected = model.iter().position(|(mk, _)| *mk == k).map(|pos| model.remove(pos).1);
                        prop_assert_eq!(cache.remove(&k), expected);
                    }
                }
            }

            let keys: Vec<u8> = model.iter().map(|(k, _)| *k).collect();
            prop_assert_eq!(cache.keys_by_recency(), keys);
        }
    }
}
