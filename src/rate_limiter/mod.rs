//! # Rate Limiter Module
//!
//! Token bucket and sliding window limiters, single and per-identity.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs             (Module organization)
//!     ├── config.rs          (Configuration and validation)
//!     ├── token_bucket.rs    (Lock-free token bucket)
//!     ├── sliding_window.rs  (Per-identity sliding window log)
//!     ├── keyed.rs           (KeyedRateLimiter trait, per-identity buckets)
//!     ├── identity.rs        (Bounded identity table shared by both)
//!     ├── sweeper.rs         (Background reclamation thread)
//!     └── metrics.rs         (Snapshots and health)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     allow(&identity)
//!          │
//!          ▼
//!     ┌──────────────────────────────┐
//!     │ SlidingWindow / KeyedBucket  │ ◄── KeyedRateLimiter
//!     └──────────────┬───────────────┘
//!                    │
//!                    ▼
//!     ┌──────────────────────────────┐      ┌─────────┐
//!     │ IdentityTable                │ ◄─── │ Sweeper │
//!     └──────────────┬───────────────┘      └─────────┘
//!                    │
//!                    ▼
//!     ┌──────────────────────────────┐
//!     │ RequestLog / TokenBucket     │ ◄── Clock
//!     └──────────────────────────────┘
//! ```

mod config;
mod identity;
mod keyed;
mod metrics;
mod sliding_window;
mod sweeper;
mod token_bucket;

/// Configuration types for customizing limiter behavior
pub use config::{
    KeyedLimiterConfig, MemoryOrdering, SlidingWindowConfig, TokenBucketConfig, MAX_CAPACITY,
};

/// Per-identity limiters
pub use keyed::{KeyedRateLimiter, KeyedTokenBucket};
pub use sliding_window::SlidingWindow;
pub use sweeper::SweeperHandle;

/// Single shared limiter
pub use token_bucket::TokenBucket;

/// Metrics and health monitoring for observability
pub use metrics::{HealthStatus, KeyedStats, LimiterMetrics};
