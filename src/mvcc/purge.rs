//! Background purge worker (spec §4.5).
//!
//! Scans committed transactions whose trx-id predates every active
//! ReadView's `min_active`, and frees their undo entries. Modeled as a
//! `std::thread` + `Condvar` worker with a stop token, the same shape as
//! the buffer pool's flush worker (spec §9, "coroutine patterns map to
//! tasks/channels... no thread-per-operation").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::TrxId;
use crate::mvcc::undo::{RollPtr, UndoManager};

/// Committed transactions whose undo entries may still be needed by a
/// live ReadView, registered by the transaction coordinator on commit.
pub type PendingPurge = Mutex<Vec<(TrxId, Vec<RollPtr>)>>;

pub struct PurgeWorker {
    stop: Arc<AtomicBool>,
    wake: Arc<Condvar>,
    wake_lock: Arc<Mutex<()>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PurgeWorker {
    /// Start the worker. `min_active` must return the lowest trx-id
    /// among currently active transactions (or the next unassigned
    /// trx-id if none are active).
    pub fn start<F>(
        undo: Arc<UndoManager>,
        pending: Arc<PendingPurge>,
        min_active: F,
        interval: Duration,
    ) -> Self
    where
        F: Fn() -> TrxId + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Condvar::new());
        let wake_lock = Arc::new(Mutex::new(()));

        let handle = {
            let stop = Arc::clone(&stop);
            let wake = Arc::clone(&wake);
            let wake_lock = Arc::clone(&wake_lock);
            std::thread::spawn(move || {
                purge_loop(undo, pending, min_active, stop, wake, wake_lock, interval);
            })
        };

        Self {
            stop,
            wake,
            wake_lock,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PurgeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn purge_loop<F: Fn() -> TrxId>(
    undo: Arc<UndoManager>,
    pending: Arc<PendingPurge>,
    min_active: F,
    stop: Arc<AtomicBool>,
    wake: Arc<Condvar>,
    wake_lock: Arc<Mutex<()>>,
    interval: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        let mut guard = wake_lock.lock();
        wake.wait_for(&mut guard, interval);
        drop(guard);
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let threshold = min_active();
        let mut ready = Vec::new();
        {
            let mut list = pending.lock();
            list.retain(|(trx_id, ptrs)| {
                if *trx_id < threshold {
                    ready.push(ptrs.clone());
                    false
                } else {
                    true
                }
            });
        }

        if !ready.is_empty() {
            let mut count = 0;
            for ptrs in &ready {
                undo.purge(ptrs);
                count += ptrs.len();
            }
            debug!("purge sweep freed {count} undo record(s) from {} transaction(s)", ready.len());
        }
    }
}
