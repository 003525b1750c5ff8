//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries.
//!
//! The cache is synchronous and may be created outside of any async context,
//! so the sweep loop runs on its own named thread with a single-threaded
//! tokio runtime. Shutdown is signalled through a watch channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

/// Name of the sweeper thread.
pub const SWEEPER_THREAD_NAME: &str = "bytecache-sweeper";

// == Sweep Target ==
/// Something whose expired entries can be swept.
pub trait ExpirySweep: Send + Sync + 'static {
    /// Removes expired entries and returns how many were removed.
    fn sweep(&self) -> usize;
}

// == Cleanup Handle ==
/// Owner of a running sweep task. Stops the task when dropped.
#[derive(Debug)]
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Signals the task to stop and waits for its thread to exit.
    ///
    /// Called from the sweeper thread itself (for example from a removal
    /// callback), it only signals and does not wait.
    pub fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("Expiry sweep thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns a background task that periodically sweeps expired entries.
///
/// The first sweep runs one `interval` after the spawn.
///
/// # Arguments
/// * `target` - shared reference to the cache internals to sweep
/// * `interval` - time between two sweeps, must be non-zero
///
/// # Returns
/// A `CleanupHandle` that stops the task when dropped or on `stop()`.
///
/// # Errors
/// Returns `CacheError::Internal` if the runtime or the thread cannot be
/// created.
pub fn spawn_cleanup_task<S: ExpirySweep>(target: Arc<S>, interval: Duration) -> Result<CleanupHandle> {
    if interval.is_zero() {
        return Err(CacheError::Config("sweep interval must be non-zero".to_string()));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| CacheError::Internal(format!("failed to build sweeper runtime: {}", e)))?;
    let (shutdown, mut stopped) = watch::channel(false);

    let thread = thread::Builder::new()
        .name(SWEEPER_THREAD_NAME.to_string())
        .spawn(move || {
            runtime.block_on(async move {
                info!("Starting expiry sweep task with interval of {:?}", interval);

                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let removed = target.sweep();
                            if removed > 0 {
                                debug!("Expiry sweep: removed {} expired entries", removed);
                            }
                        }
                        changed = stopped.changed() => {
                            // A dropped sender also ends the loop
                            if changed.is_err() || *stopped.borrow() {
                                break;
                            }
                        }
                    }
                }

                info!("Expiry sweep task stopped");
            })
        })
        .map_err(|e| CacheError::Internal(format!("failed to spawn sweeper thread: {}", e)))?;

    Ok(CleanupHandle {
        shutdown,
        thread: Some(thread),
    })
}
