//! # Resource Pool
//!
//! ```text
//!     acquire(timeout)
//!          │
//!          ▼
//!     ┌─────────┐  yes   ┌──────────────────┐  valid   ┌───────────┐
//!     │ closed? │──────► │ PoolClosed       │          │ Pooled<R> │
//!     └────┬────┘        └──────────────────┘          └─────▲─────┘
//!          │ no                                              │
//!          ▼                                                 │
//!     ┌─────────────┐ yes ──► validate outside the lock ─────┤
//!     │ idle item?  │                (invalid: destroy, retry)
//!     └────┬────────┘                                        │
//!          │ no                                              │
//!          ▼                                                 │
//!     ┌─────────────┐ yes ──► reserve slot, factory() ───────┘
//!     │ room left?  │            outside the lock
//!     └────┬────────┘
//!          │ no
//!          ▼
//!     wait on `available` until release, discard, failure or close
//! ```
//!
//! ## Budget
//!
//! `checked_out + creating + idle <= max_size` holds at every instant:
//! a slot is reserved under the lock before the factory runs and given
//! back if the factory fails. The factory, validator and destructor all run
//! with no lock held.

use super::config::PoolConfig;
use super::stats::{PoolCounters, PoolStats};
use crate::error::{BoxError, Error, Result};
use crate::queue::BoundedQueue;
use crate::utils::Deadline;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Factory<R> = Box<dyn Fn() -> std::result::Result<R, BoxError> + Send + Sync>;
type Destructor<R> = Box<dyn Fn(R) + Send + Sync>;
type Validator<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

struct PoolState {
    checked_out: usize,
    creating: usize,
    closed: bool,
}

impl PoolState {
    fn active(&self) -> usize {
        self.checked_out + self.creating
    }
}

struct PoolInner<R> {
    /// Guarded by `state`: idle items only move while it is held.
    idle: BoundedQueue<R>,
    state: Mutex<PoolState>,
    available: Condvar,
    factory: Factory<R>,
    destructor: Option<Destructor<R>>,
    validator: Option<Validator<R>>,
    config: PoolConfig,
    counters: PoolCounters,
}

/// What `reserve` handed the caller.
enum Slot<R> {
    Idle(R),
    Create,
}

/// Bounded pool of reusable resources built by a caller-supplied factory.
///
/// Cloning is cheap and yields another handle to the same pool.
///
/// # Example
///
/// ```rust
/// use corral::ResourcePool;
/// use std::time::Duration;
///
/// let pool = ResourcePool::new(|| Ok::<_, std::io::Error>(Vec::<u8>::with_capacity(1024)), 2).unwrap();
///
/// {
///     let mut buf = pool.acquire(None).unwrap();
///     buf.extend_from_slice(b"hello");
/// } // returned to the pool here
///
/// let a = pool.acquire(Some(Duration::from_millis(10))).unwrap();
/// let b = pool.acquire(Some(Duration::from_millis(10))).unwrap();
/// assert!(pool.try_acquire().is_err());
///
/// pool.release(a);
/// drop(b);
/// assert_eq!(pool.idle_count(), 2);
/// assert_eq!(pool.stats().created, 2);
/// ```
pub struct ResourcePool<R> {
    inner: Arc<PoolInner<R>>,
}

impl<R> Clone for ResourcePool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> ResourcePool<R> {
    /// Creates a pool of at most `max_size` resources built by `factory`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `max_size` is zero.
    pub fn new<F, E>(factory: F, max_size: usize) -> Result<Self>
    where
        F: Fn() -> std::result::Result<R, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::builder(factory).max_size(max_size).build()
    }

    /// Starts a [`PoolBuilder`] for destructor, validator and warm-up
    /// settings.
    pub fn builder<F, E>(factory: F) -> PoolBuilder<R>
    where
        F: Fn() -> std::result::Result<R, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        PoolBuilder::new(factory)
    }

    /// Checks out a resource, reusing an idle one when possible.
    ///
    /// `None` waits as long as it takes; `Some(Duration::ZERO)` never
    /// waits.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] if the pool is at capacity and `timeout`
    ///   is zero.
    /// - [`Error::Timeout`] if nothing became available within `timeout`.
    /// - [`Error::ResourceCreationFailed`] if the factory failed.
    /// - [`Error::PoolClosed`] after [`close`](Self::close).
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<Pooled<R>> {
        let deadline = Deadline::from_timeout(timeout);

        loop {
            let resource = match self.inner.reserve(&deadline)? {
                Slot::Idle(resource) => {
                    if self.inner.is_valid(&resource) {
                        resource
                    } else {
                        debug!("Idle resource failed validation, destroying it");
                        self.inner.discard(resource);
                        continue;
                    }
                }
                Slot::Create => {
                    let reservation = Reservation::new(&self.inner);
                    let resource = self.inner.create()?;
                    reservation.check_out(resource)?
                }
            };

            self.inner.counters.acquired.increment(1);
            return Ok(Pooled {
                resource: Some(resource),
                pool: Arc::clone(&self.inner),
            });
        }
    }

    /// Checks out a resource only if one is available without waiting.
    ///
    /// # Errors
    ///
    /// As [`acquire`](Self::acquire) with a zero timeout.
    pub fn try_acquire(&self) -> Result<Pooled<R>> {
        self.acquire(Some(Duration::ZERO))
    }

    /// Returns a resource to the pool. Same as dropping it.
    pub fn release(&self, resource: Pooled<R>) {
        if !Arc::ptr_eq(&self.inner, &resource.pool) {
            warn!("Resource released to a pool it was not acquired from");
        }
        drop(resource);
    }

    /// Creates idle resources until `min_idle` are ready or the pool is
    /// full. Returns how many were created.
    ///
    /// # Errors
    ///
    /// - [`Error::ResourceCreationFailed`] if the factory failed; resources
    ///   created before the failure stay in the pool.
    /// - [`Error::PoolClosed`] after [`close`](Self::close).
    pub fn warm_up(&self) -> Result<usize> {
        let mut created = 0;

        loop {
            {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                let idle = self.inner.idle.len();
                if idle + state.creating >= self.inner.config.min_idle
                    || idle + state.active() >= self.inner.config.max_size
                {
                    break;
                }
                state.creating += 1;
            }

            let reservation = Reservation::new(&self.inner);
            let resource = self.inner.create()?;
            reservation.park(resource)?;
            created += 1;
        }

        if created > 0 {
            info!("Warmed up resource pool with {} idle resource(s)", created);
        }
        Ok(created)
    }

    /// Closes the pool: idle resources are destroyed now, checked-out ones
    /// when they come back, and every waiter fails with
    /// [`Error::PoolClosed`]. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        // Nothing parks an idle resource once `closed` is set.
        self.inner.idle.close();
        let idle = self.inner.idle.drain();
        self.inner.available.notify_all();
        let count = idle.len();
        for resource in idle {
            self.inner.destroy(resource);
        }
        info!("Resource pool closed, destroyed {} idle resource(s)", count);
    }

    /// Resources waiting to be reused.
    pub fn idle_count(&self) -> usize {
        let _state = self.inner.state.lock();
        self.inner.idle.len()
    }

    /// Resources checked out or being created.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active()
    }

    /// Upper bound on live resources.
    pub fn max_size(&self) -> usize {
        self.inner.config.max_size
    }

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Sizing in effect.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Snapshot of lifecycle and contention counters.
    pub fn stats(&self) -> PoolStats {
        let (idle, active, closed) = {
            let state = self.inner.state.lock();
            (self.inner.idle.len(), state.active(), state.closed)
        };
        self.inner
            .counters
            .snapshot(idle, active, self.inner.config.max_size, closed)
    }
}

impl<R> PoolInner<R> {
    /// Takes an idle resource or a creation slot, waiting per `deadline`.
    fn reserve(&self, deadline: &Deadline) -> Result<Slot<R>> {
        let mut state = self.state.lock();
        let mut waited = false;

        loop {
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if !self.idle.is_empty() {
                if let Ok(resource) = self.idle.try_get() {
                    state.checked_out += 1;
                    return Ok(Slot::Idle(resource));
                }
            }
            if state.active() + self.idle.len() < self.config.max_size {
                state.creating += 1;
                return Ok(Slot::Create);
            }
            if deadline.is_immediate() {
                drop(state);
                self.counters.exhausted.increment(1);
                return Err(Error::PoolExhausted);
            }
            if deadline.expired() {
                drop(state);
                self.counters.timeouts.increment(1);
                debug!("Pool acquire timed out after {:?}", deadline.requested());
                return Err(Error::Timeout(deadline.requested()));
            }
            if !waited {
                waited = true;
                self.counters.waits.increment(1);
            }
            deadline.wait(&self.available, &mut state);
        }
    }

    fn create(&self) -> Result<R> {
        match (self.factory)() {
            Ok(resource) => {
                self.counters.created.increment(1);
                debug!("Created pooled resource");
                Ok(resource)
            }
            Err(err) => {
                self.counters.creation_failures.increment(1);
                warn!("Pool factory failed: {}", err);
                Err(Error::ResourceCreationFailed(err))
            }
        }
    }

    fn is_valid(&self, resource: &R) -> bool {
        self.validator.as_ref().map_or(true, |validate| validate(resource))
    }

    fn destroy(&self, resource: R) {
        match &self.destructor {
            Some(destructor) => destructor(resource),
            None => drop(resource),
        }
        self.counters.destroyed.increment(1);
        debug!("Destroyed pooled resource");
    }

    /// A checked-out resource came back.
    fn give_back(&self, resource: R) {
        let mut state = self.state.lock();
        state.checked_out -= 1;
        if state.closed {
            drop(state);
            self.destroy(resource);
            return;
        }

        let rejected = self.idle.try_put(resource).err();
        drop(state);
        self.available.notify_one();

        match rejected {
            None => {
                self.counters.released.increment(1);
            }
            Some(err) => self.destroy(err.into_inner()),
        }
    }

    /// A checked-out resource is broken; destroy it and free its slot.
    fn discard(&self, resource: R) {
        self.destroy(resource);
        self.state.lock().checked_out -= 1;
        self.available.notify_one();
    }
}

/// A creation slot taken by `reserve`; returned to the budget on drop
/// unless the new resource is checked out or parked as idle.
struct Reservation<'a, R> {
    pool: &'a PoolInner<R>,
    armed: bool,
}

impl<'a, R> Reservation<'a, R> {
    fn new(pool: &'a PoolInner<R>) -> Self {
        Self { pool, armed: true }
    }

    fn check_out(mut self, resource: R) -> Result<R> {
        self.armed = false;
        let mut state = self.pool.state.lock();
        state.creating -= 1;
        if state.closed {
            drop(state);
            self.pool.available.notify_one();
            self.pool.destroy(resource);
            return Err(Error::PoolClosed);
        }
        state.checked_out += 1;
        Ok(resource)
    }

    fn park(mut self, resource: R) -> Result<()> {
        self.armed = false;
        let mut state = self.pool.state.lock();
        state.creating -= 1;
        if state.closed {
            drop(state);
            self.pool.destroy(resource);
            return Err(Error::PoolClosed);
        }

        let rejected = self.pool.idle.try_put(resource).err();
        drop(state);
        self.pool.available.notify_one();
        match rejected {
            None => Ok(()),
            Some(err) => {
                self.pool.destroy(err.into_inner());
                Err(Error::PoolClosed)
            }
        }
    }
}

impl<R> Drop for Reservation<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().creating -= 1;
            self.pool.available.notify_one();
        }
    }
}

impl<R> fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ResourcePool")
            .field("max_size", &self.inner.config.max_size)
            .field("idle", &self.inner.idle.len())
            .field("checked_out", &state.checked_out)
            .field("creating", &state.creating)
            .field("closed", &state.closed)
            .finish()
    }
}

/// A checked-out resource. Goes back to its pool when dropped.
///
/// ```rust
/// use corral::ResourcePool;
///
/// let pool = ResourcePool::new(|| Ok::<_, String>(String::from("conn")), 1).unwrap();
///
/// let conn = pool.acquire(None).unwrap();
/// assert_eq!(conn.as_str(), "conn");
///
/// // Broken resources are destroyed instead of reused.
/// conn.discard();
/// assert_eq!(pool.idle_count(), 0);
/// assert_eq!(pool.stats().destroyed, 1);
/// ```
pub struct Pooled<R> {
    resource: Option<R>,
    pool: Arc<PoolInner<R>>,
}

impl<R> Pooled<R> {
    /// Destroys the resource instead of returning it, freeing its slot.
    pub fn discard(mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.discard(resource);
        }
    }
}

impl<R> Deref for Pooled<R> {
    type Target = R;

    fn deref(&self) -> &R {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource accessed after release"),
        }
    }
}

impl<R> DerefMut for Pooled<R> {
    fn deref_mut(&mut self) -> &mut R {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource accessed after release"),
        }
    }
}

impl<R> Drop for Pooled<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.give_back(resource);
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Pooled<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.resource).finish()
    }
}

/// Fluent construction of a [`ResourcePool`].
///
/// ```rust
/// use corral::ResourcePool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let closed = Arc::new(AtomicUsize::new(0));
/// let closed_in_destructor = closed.clone();
///
/// let pool = ResourcePool::builder(|| Ok::<_, std::io::Error>(0u32))
///     .max_size(4)
///     .min_idle(2)
///     .validator(|n: &u32| *n < 100)
///     .destructor(move |_| {
///         closed_in_destructor.fetch_add(1, Ordering::SeqCst);
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.idle_count(), 2);
/// pool.close();
/// assert_eq!(closed.load(Ordering::SeqCst), 2);
/// ```
pub struct PoolBuilder<R> {
    factory: Factory<R>,
    destructor: Option<Destructor<R>>,
    validator: Option<Validator<R>>,
    config: PoolConfig,
}

impl<R> PoolBuilder<R> {
    fn new<F, E>(factory: F) -> Self
    where
        F: Fn() -> std::result::Result<R, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            factory: Box::new(move || factory().map_err(Into::into)),
            destructor: None,
            validator: None,
            config: PoolConfig::default(),
        }
    }

    /// Sets the upper bound on live resources.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Sets how many idle resources `build` creates up front.
    pub fn min_idle(mut self, min_idle: usize) -> Self {
        self.config.min_idle = min_idle;
        self
    }

    /// Replaces the sizing wholesale.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs `destructor` on every resource the pool gets rid of.
    pub fn destructor<D>(mut self, destructor: D) -> Self
    where
        D: Fn(R) + Send + Sync + 'static,
    {
        self.destructor = Some(Box::new(destructor));
        self
    }

    /// Checks idle resources before handing them out again; failures are
    /// destroyed.
    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Builds the pool and warms it up to `min_idle`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if the sizing is invalid.
    /// - [`Error::ResourceCreationFailed`] if warm-up failed.
    pub fn build(self) -> Result<ResourcePool<R>> {
        self.config.validate()?;

        let pool = ResourcePool {
            inner: Arc::new(PoolInner {
                idle: BoundedQueue::new(self.config.max_size)?,
                state: Mutex::new(PoolState {
                    checked_out: 0,
                    creating: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                factory: self.factory,
                destructor: self.destructor,
                validator: self.validator,
                config: self.config,
                counters: PoolCounters::default(),
            }),
        };

        if self.config.min_idle > 0 {
            pool.warm_up()?;
        }
        debug!(
            "Created resource pool (max_size: {}, min_idle: {})",
            self.config.max_size, self.config.min_idle
        );
        Ok(pool)
    }
}

impl<R> fmt::Debug for PoolBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("config", &self.config)
            .field("has_destructor", &self.destructor.is_some())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}
