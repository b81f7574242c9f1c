//! # Bounded Queue
//!
//! A fixed-capacity FIFO for producer/consumer handoff with backpressure.
//! Full queues block producers, empty queues block consumers, and both
//! sides accept an optional timeout.

mod bounded;
mod stats;

pub use bounded::BoundedQueue;
pub use stats::QueueStats;
