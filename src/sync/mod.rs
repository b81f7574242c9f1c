//! # Atomic Bookkeeping
//!
//! The two leaf primitives every other component keeps its state in:
//!
//! ```text
//!     AtomicCounter ──► one cache-aligned AtomicI64
//!                       (stats, pool budgets, tracked-identity counts)
//!
//!     ConcurrentMap ──► DashMap<K, V, ahash::RandomState>
//!                       (per-identity limiter state)
//! ```

mod counter;
mod map;

pub use counter::AtomicCounter;
pub use map::ConcurrentMap;

pub(crate) use map::default_shard_amount;
