//! # Bounded Blocking FIFO
//!
//! ```text
//!                      Mutex<QueueState>
//!     producers        ┌─────────────────────────┐        consumers
//!     put() ─────────► │ VecDeque: [a][b][c][ ]  │ ─────► get()
//!        ▲             │ closed: false           │          ▲
//!        │             └─────────────────────────┘          │
//!        └── not_full ◄── notify_one after get              │
//!                         notify_one after put ──► not_empty┘
//! ```
//!
//! ## Waiting Rules
//!
//! - Every wait re-checks its predicate after waking, so spurious wakeups
//!   and notification races are harmless.
//! - The deadline is computed once on entry; repeated wakeups never extend
//!   the caller's timeout.
//! - `close()` wakes everyone. Producers fail with the item handed back,
//!   consumers drain what is left before seeing `QueueClosed`.

use super::stats::{QueueCounters, QueueStats};
use crate::error::{Error, PutError, Result};
use crate::utils::Deadline;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity, thread-safe FIFO with blocking `put` and `get`.
///
/// Items come out in exactly the order they went in, across all producers.
/// Timeouts follow one convention: `None` waits forever, `Some(Duration::ZERO)`
/// tries once without waiting, anything else waits at most that long.
///
/// # Example
///
/// ```rust
/// use corral::BoundedQueue;
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// let queue = Arc::new(BoundedQueue::new(1).unwrap());
/// queue.put("first", None).unwrap();
///
/// let consumer = {
///     let queue = queue.clone();
///     thread::spawn(move || queue.get(None).unwrap())
/// };
///
/// // Blocks until the consumer has taken "first".
/// queue.put("second", Some(Duration::from_secs(5))).unwrap();
/// assert_eq!(consumer.join().unwrap(), "first");
/// assert_eq!(queue.get(Some(Duration::ZERO)).unwrap(), "second");
/// ```
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    counters: QueueCounters,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("queue capacity must be greater than 0"));
        }

        Ok(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            counters: QueueCounters::default(),
        })
    }

    /// Appends `item`, waiting for space while the queue is full.
    ///
    /// # Errors
    ///
    /// - [`PutError::Timeout`] if no space opened up within `timeout`.
    /// - [`PutError::Closed`] if the queue is or becomes closed.
    ///
    /// Either way the item is handed back untouched.
    pub fn put(&self, item: T, timeout: Option<Duration>) -> std::result::Result<(), PutError<T>> {
        let deadline = Deadline::from_timeout(timeout);
        let mut state = self.state.lock();
        let mut blocked = false;

        loop {
            if state.closed {
                return Err(PutError::Closed(item));
            }
            if state.items.len() < self.capacity {
                break;
            }
            if deadline.expired() {
                drop(state);
                self.counters.put_timeouts.increment(1);
                return Err(PutError::Timeout(item));
            }
            if !blocked {
                blocked = true;
                self.counters.blocked_puts.increment(1);
            }
            deadline.wait(&self.not_full, &mut state);
        }

        state.items.push_back(item);
        drop(state);

        self.counters.enqueued.increment(1);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, waiting while the queue is empty.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing arrived within `timeout`.
    /// - [`Error::QueueClosed`] once the queue is closed and drained.
    pub fn get(&self, timeout: Option<Duration>) -> Result<T> {
        let deadline = Deadline::from_timeout(timeout);
        let mut state = self.state.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.counters.dequeued.increment(1);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(Error::QueueClosed);
            }
            if deadline.expired() {
                drop(state);
                self.counters.get_timeouts.increment(1);
                return Err(Error::Timeout(deadline.requested()));
            }
            deadline.wait(&self.not_empty, &mut state);
        }
    }

    /// Appends `item` only if there is room right now.
    pub fn try_put(&self, item: T) -> std::result::Result<(), PutError<T>> {
        self.put(item, Some(Duration::ZERO))
    }

    /// Removes the oldest item only if one is queued right now.
    ///
    /// An empty open queue yields [`Error::Timeout`] with a zero duration.
    pub fn try_get(&self) -> Result<T> {
        self.get(Some(Duration::ZERO))
    }

    /// Closes the queue and wakes every waiter. Idempotent.
    pub fn close(&self) {
        let remaining = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.items.len()
        };

        self.not_empty.notify_all();
        self.not_full.notify_all();
        info!("Bounded queue closed with {} item(s) left to drain", remaining);
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = {
            let mut state = self.state.lock();
            state.items.drain(..).collect()
        };

        if !items.is_empty() {
            self.counters.dequeued.increment(items.len() as i64);
            self.not_full.notify_all();
            debug!("Drained {} item(s) from bounded queue", items.len());
        }
        items
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a put would have to wait.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of the throughput and backpressure counters.
    pub fn stats(&self) -> QueueStats {
        let (len, closed) = {
            let state = self.state.lock();
            (state.items.len(), state.closed)
        };
        self.counters.snapshot(len, self.capacity, closed)
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}
