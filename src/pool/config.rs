//! Pool sizing.

use crate::error::{Error, Result};

/// Sizing for a [`ResourcePool`](crate::ResourcePool).
///
/// ```text
///     ┌──────────── max_size ────────────┐
///     │ checked out │ creating │   idle   │
///     └─────────────┴──────────┴──────────┘
///                                 ▲
///                    warm_up() fills up to min_idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Most resources alive at once, idle or checked out.
    pub max_size: usize,
    /// Idle resources [`warm_up`](crate::ResourcePool::warm_up) creates
    /// ahead of demand.
    pub min_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 0,
        }
    }
}

impl PoolConfig {
    /// A pool of at most `max_size` resources, none pre-created.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            min_idle: 0,
        }
    }

    /// Sets how many idle resources to keep warm.
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Checks the sizing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `max_size` is zero or `min_idle`
    /// exceeds it.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::config("pool max_size must be greater than 0"));
        }
        if self.min_idle > self.max_size {
            return Err(Error::config(format!(
                "pool min_idle ({}) cannot exceed max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}
