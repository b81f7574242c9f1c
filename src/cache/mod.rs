//! # Bounded LRU Cache
//!
//! ```text
//!     LruCache<K, V>
//!     ├─ Mutex ─┬─ HashMap<K, slot>        key → arena slot
//!     │         └─ RecencyList<(K, V)>     arena-backed doubly linked list
//!     └─ CacheCounters                     hits, misses, inserts, evictions
//! ```

mod list;
mod lru;
mod stats;

pub use lru::LruCache;
pub use stats::CacheStats;
