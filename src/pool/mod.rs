//! Bounded pool of reusable resources.

mod config;
mod resource_pool;
mod stats;

pub use config::PoolConfig;
pub use resource_pool::{PoolBuilder, Pooled, ResourcePool};
pub use stats::PoolStats;
