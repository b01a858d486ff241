//! Periodic maintenance.
//!
//! [`tick`] is one pruner step. [`PrunerHandle`] drives it from a background
//! thread every `prune` seconds until stopped.

use crate::table::HashTable;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What one pruner step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The step consumed a purge request instead of running an expire pass.
    pub purged: bool,
    /// The purge also rotated the hash salt.
    pub salt_rotated: bool,
    /// Entries unlinked by this step.
    pub removed: usize,
    /// Arena slots returned to the pool by this step.
    pub reclaimed: usize,
}

/// Run one pruner step on `table`.
pub(crate) fn tick(table: &HashTable) -> TickReport {
    let mut report = TickReport::default();
    match table.take_purge_request() {
        Some(rotate) => {
            // New inserts land under the new salt while the old ones drain.
            if rotate {
                table.rotate_salt();
            }
            report.purged = true;
            report.salt_rotated = rotate;
            report.removed = table.purge_all();
        }
        None => report.removed = table.expire_pass(),
    }
    report.reclaimed = table.reclaim();
    report
}

/// Stop flag and wake-up for the pruner thread.
#[derive(Default)]
struct Signal {
    stop: Mutex<bool>,
    wake: Condvar,
}

/// A running background pruner.
///
/// Dropping the handle stops and joins the thread.
pub(crate) struct PrunerHandle {
    signal: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl PrunerHandle {
    /// Spawn the pruner thread.
    pub(crate) fn spawn(table: Arc<HashTable>) -> std::io::Result<Self> {
        let signal = Arc::new(Signal::default());
        let thread = thread::Builder::new()
            .name("hostcache-pruner".into())
            .spawn({
                let signal = Arc::clone(&signal);
                move || run(&table, &signal)
            })?;
        tracing::info!("hostcache: pruner started");
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Wake the thread, tell it to exit, and wait for it.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        {
            let mut stop = self.signal.stop.lock();
            *stop = true;
            self.signal.wake.notify_all();
        }
        if thread.join().is_err() {
            tracing::warn!("hostcache: pruner thread panicked");
        }
        tracing::info!("hostcache: pruner stopped");
    }
}

impl Drop for PrunerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(table: &HashTable, signal: &Signal) {
    let mut stop = signal.stop.lock();
    loop {
        // Re-read every cycle so a changed interval applies from the next one.
        let period = Duration::from_secs(u64::from(table.prune()));
        let deadline = Instant::now() + period;
        while !*stop {
            if signal.wake.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        if *stop {
            return;
        }
        let report = MutexGuard::unlocked(&mut stop, || tick(table));
        tracing::trace!(?report, "hostcache: pruner tick");
    }
}
