//! Transaction coordinator (spec §4.5 contract, §9 "global mutable state
//! lives in a single coordinator guarded by its own lock").

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::{Mutex, RwLock};

use crate::common::{Error, Result, TrxId};
use crate::lock::{LockManager, LockMode, LockResource};
use crate::mvcc::{IsolationLevel, MvccEngine, PendingPurge, PurgeWorker, ReadView, Transaction, TrxStatus};

/// Owns trx-id allocation, the active-transaction set, and every live
/// transaction's state. The sole authority the rest of the core
/// consults for "is trx T still active" and "what does T's snapshot
/// see" (spec §9: never ambient module-level state).
pub struct TrxCoordinator {
    next_trx_id: AtomicU64,
    active: Arc<RwLock<BTreeSet<TrxId>>>,
    transactions: RwLock<HashMap<TrxId, Mutex<Transaction>>>,
    lock_manager: Arc<LockManager>,
    mvcc: Arc<MvccEngine>,
    pending_purge: Arc<PendingPurge>,
    purge_worker: Mutex<Option<PurgeWorker>>,
}

impl TrxCoordinator {
    /// Build a coordinator with trx-ids resuming from `recovered_next`
    /// (spec §9: "initial values are recovered at startup from the
    /// system tablespace's header").
    pub fn new(recovered_next: u64, lock_wait_timeout: Duration) -> Self {
        Self {
            next_trx_id: AtomicU64::new(recovered_next.max(1)),
            active: Arc::new(RwLock::new(BTreeSet::new())),
            transactions: RwLock::new(HashMap::new()),
            lock_manager: Arc::new(LockManager::new(lock_wait_timeout)),
            mvcc: Arc::new(MvccEngine::new()),
            pending_purge: Arc::new(Mutex::new(Vec::new())),
            purge_worker: Mutex::new(None),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn mvcc(&self) -> &Arc<MvccEngine> {
        &self.mvcc
    }

    /// The value that would be persisted as the system tablespace's
    /// "next trx-id" header field at shutdown.
    pub fn next_trx_id_checkpoint(&self) -> u64 {
        self.next_trx_id.load(Ordering::SeqCst)
    }

    pub fn start_purge_worker(&self, interval: Duration) {
        let active = Arc::clone(&self.active);
        let min_active_fn = move || -> TrxId {
            active.read().iter().next().copied().unwrap_or(TrxId::new(u64::MAX))
        };
        let worker = PurgeWorker::start(
            self.mvcc.undo_manager_handle(),
            Arc::clone(&self.pending_purge),
            min_active_fn,
            interval,
        );
        *self.purge_worker.lock() = Some(worker);
    }

    /// Begin a new transaction, allocating a monotonically increasing
    /// trx-id and registering it as active.
    pub fn begin(&self, isolation: IsolationLevel) -> TrxId {
        let id = TrxId::new(self.next_trx_id.fetch_add(1, Ordering::SeqCst));
        self.active.write().insert(id);

        let mut trx = Transaction::new(id, isolation);
        if isolation.snapshot_at_start() {
            trx.read_view = Some(self.capture_read_view(id));
        }
        self.transactions.write().insert(id, Mutex::new(trx));
        info!("begin trx {id} ({isolation:?})");
        id
    }

    /// The ReadView a statement in `trx` should use: fresh for READ
    /// COMMITTED, or the one captured at `begin` otherwise (spec §4.5).
    pub fn statement_read_view(&self, trx_id: TrxId) -> Result<ReadView> {
        let transactions = self.transactions.read();
        let slot = transactions.get(&trx_id).ok_or(Error::InvalidTransactionState(trx_id.0))?;
        let mut trx = slot.lock();
        if !trx.is_active() {
            return Err(Error::InvalidTransactionState(trx_id.0));
        }
        if trx.isolation.snapshot_at_start() {
            if trx.read_view.is_none() {
                trx.read_view = Some(self.capture_read_view(trx_id));
            }
            Ok(trx.read_view.clone().unwrap())
        } else {
            Ok(self.capture_read_view(trx_id))
        }
    }

    fn capture_read_view(&self, creator: TrxId) -> ReadView {
        let next = TrxId::new(self.next_trx_id.load(Ordering::SeqCst));
        let active = self.active.read().clone();
        ReadView::new(creator, next, active)
    }

    pub fn acquire_lock(&self, trx_id: TrxId, resource: LockResource, mode: LockMode) -> Result<()> {
        self.lock_manager.acquire(trx_id, resource, mode)?;
        if let Some(slot) = self.transactions.read().get(&trx_id) {
            slot.lock().held_locks.push(resource);
        }
        Ok(())
    }

    /// Register one of `trx`'s own writes so it can be rolled back; the
    /// roll-pointer was already appended to the undo manager by the
    /// caller (typically `TableHandle`).
    pub fn record_write(&self, trx_id: TrxId, roll_ptr: crate::mvcc::RollPtr) -> Result<()> {
        let transactions = self.transactions.read();
        let slot = transactions.get(&trx_id).ok_or(Error::InvalidTransactionState(trx_id.0))?;
        slot.lock().undo_log.push(roll_ptr);
        Ok(())
    }

    pub fn commit(&self, trx_id: TrxId) -> Result<()> {
        let undo_log = {
            let transactions = self.transactions.read();
            let slot = transactions.get(&trx_id).ok_or(Error::InvalidTransactionState(trx_id.0))?;
            let mut trx = slot.lock();
            if !trx.is_active() {
                return Err(Error::InvalidTransactionState(trx_id.0));
            }
            trx.status = TrxStatus::Committed;
            std::mem::take(&mut trx.undo_log)
        };

        self.lock_manager.release_all(trx_id);
        self.active.write().remove(&trx_id);

        let min_active = self.active.read().iter().next().copied().unwrap_or(trx_id.next());
        if trx_id < min_active {
            self.mvcc.undo_manager().purge(&undo_log);
        } else {
            self.pending_purge.lock().push((trx_id, undo_log));
        }

        info!("commit trx {trx_id}");
        Ok(())
    }

    /// Roll back `trx`: the caller (table layer) is responsible for
    /// actually reapplying before-images via the returned roll-pointers,
    /// oldest-last (walk in reverse), reading each one from the undo
    /// manager before it purges its own. This leaves the undo entries in
    /// place for the caller to fetch; it's on the caller to have finished
    /// with them by the time anything else could reuse the roll-pointer.
    pub fn rollback(&self, trx_id: TrxId) -> Result<Vec<crate::mvcc::RollPtr>> {
        let undo_log = {
            let transactions = self.transactions.read();
            let slot = transactions.get(&trx_id).ok_or(Error::InvalidTransactionState(trx_id.0))?;
            let mut trx = slot.lock();
            if !trx.is_active() {
                return Err(Error::InvalidTransactionState(trx_id.0));
            }
            trx.status = TrxStatus::Aborted;
            std::mem::take(&mut trx.undo_log)
        };

        self.lock_manager.release_all(trx_id);
        self.active.write().remove(&trx_id);

        info!("rollback trx {trx_id}");
        Ok(undo_log)
    }

    pub fn is_active(&self, trx_id: TrxId) -> bool {
        self.active.read().contains(&trx_id)
    }
}
