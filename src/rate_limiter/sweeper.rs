//! Background sweeping for the keyed limiters.
//!
//! ```text
//!     sweeper thread                      limiter (Arc)
//!     ──────────────                      ─────────────
//!     loop:
//!       recv_timeout(interval) ─ stop ──► exit
//!            │
//!          timeout
//!            │
//!       Weak::upgrade ─────── gone ─────► exit
//!            │
//!       sweep(&limiter)
//! ```

use crate::error::{Error, Result};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Handle to a running background sweeper.
///
/// Dropping the handle signals the thread to stop without waiting for it;
/// [`stop`](Self::stop) signals and waits.
#[derive(Debug)]
pub struct SweeperHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for its thread to exit.
    pub fn stop(mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            // A panicking sweep has already been reported by the runtime.
            let _ = thread.join();
        }
    }

    /// `true` while the sweeper thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the thread immediately.
        self.stop_tx.take();
    }
}

/// Spawns a thread that calls `sweep` on `target` every `interval` until
/// stopped or until `target` is dropped.
pub(crate) fn spawn_sweeper<T>(
    name: &str,
    interval: Duration,
    target: Weak<T>,
    sweep: fn(&T) -> usize,
) -> Result<SweeperHandle>
where
    T: Send + Sync + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            info!("Started sweeper thread (interval: {:?})", interval);

            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        info!("Sweeper thread stopping");
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(target) = target.upgrade() else {
                            info!("Sweeper target dropped, thread exiting");
                            break;
                        };
                        let removed = sweep(&target);
                        if removed > 0 {
                            debug!("Background sweep reclaimed {} identities", removed);
                        }
                    }
                }
            }
        })
        .map_err(Error::ThreadSpawn)?;

    Ok(SweeperHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::AtomicCounter;
    use std::sync::Arc;
    use std::time::Instant;

    fn count(counter: &AtomicCounter) -> usize {
        counter.increment(1) as usize
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn sweeps_periodically_until_stopped() {
        let counter = Arc::new(AtomicCounter::default());
        let handle = spawn_sweeper(
            "test-sweeper",
            Duration::from_millis(5),
            Arc::downgrade(&counter),
            count,
        )
        .unwrap();

        assert!(wait_for(|| counter.get() >= 3));
        assert!(handle.is_running());
        handle.stop();

        let after = counter.get();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.get(), after);
    }

    #[test]
    fn exits_when_target_dropped() {
        let counter = Arc::new(AtomicCounter::default());
        let handle = spawn_sweeper(
            "test-sweeper",
            Duration::from_millis(5),
            Arc::downgrade(&counter),
            count,
        )
        .unwrap();

        drop(counter);
        assert!(wait_for(|| !handle.is_running()));
    }
}
