//! # Error Types
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is the single [`Error`] enum below. The variants fall into three families:
//!
//! ```text
//!     Configuration ──► InvalidConfiguration, InvalidArgument
//!        │               (fatal to the call, never clamped)
//!        │
//!     Backpressure ───► Timeout, PoolExhausted
//!        │               (expected outcomes, caller decides to retry)
//!        │
//!     Lifecycle ──────► ResourceCreationFailed, PoolClosed, QueueClosed,
//!                        ThreadSpawn
//!                        (surfaced as-is, never retried internally)
//! ```
//!
//! Rate limiter rejections are not errors: `allow()` simply returns `false`.
//!
//! Queue puts return [`PutError`] instead of [`Error`] so the rejected item
//! goes back to the caller, the same way `std::sync::mpsc::SendError` does.

use std::fmt;
use std::time::Duration;

/// Boxed error produced by a caller-supplied resource factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the primitives in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A constructor or config was given an out-of-range parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A per-call argument was out of range (e.g. a zero admission cost).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking call gave up after waiting for the given duration.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The queue was closed and holds no more items.
    #[error("queue is closed")]
    QueueClosed,

    /// Every pooled resource is checked out and the caller asked not to wait.
    #[error("resource pool exhausted")]
    PoolExhausted,

    /// The pool factory failed to build a new resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(#[source] BoxError),

    /// The pool was closed.
    #[error("resource pool is closed")]
    PoolClosed,

    /// A background sweeper thread could not be started.
    #[error("failed to spawn background thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Returns `true` for the backpressure outcomes a caller may retry.
    ///
    /// ```rust
    /// use corral::Error;
    /// use std::time::Duration;
    ///
    /// assert!(Error::Timeout(Duration::from_millis(5)).is_retryable());
    /// assert!(Error::PoolExhausted.is_retryable());
    /// assert!(!Error::PoolClosed.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::PoolExhausted)
    }

    /// Returns `true` if the error came from a closed queue or pool.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::QueueClosed | Self::PoolClosed)
    }
}

/// Error returned by [`BoundedQueue::put`](crate::BoundedQueue::put).
///
/// Carries the item that could not be enqueued.
pub enum PutError<T> {
    /// The queue stayed full for the whole timeout.
    Timeout(T),
    /// The queue was closed before the item could be enqueued.
    Closed(T),
}

impl<T> PutError<T> {
    /// Returns the item that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Timeout(item) | Self::Closed(item) => item,
        }
    }

    /// Returns `true` if the put timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if the queue was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(_) => f.write_str("Timeout(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(_) => f.write_str("timed out waiting for queue space"),
            Self::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

impl<T> std::error::Error for PutError<T> {}

impl<T> PutError<T> {
    /// Converts into the crate-wide [`Error`], dropping the item.
    ///
    /// `waited` is reported in [`Error::Timeout`].
    pub fn into_error(self, waited: Duration) -> Error {
        match self {
            Self::Timeout(_) => Error::Timeout(waited),
            Self::Closed(_) => Error::QueueClosed,
        }
    }
}

impl<T> From<PutError<T>> for Error {
    fn from(err: PutError<T>) -> Self {
        err.into_error(Duration::ZERO)
    }
}
