//! Lock manager (spec §4.6): compatibility-matrix grants, FIFO wait
//! queues per resource, and wait-for-graph deadlock detection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::{Error, Result, TrxId};
use crate::lock::deadlock::WaitForGraph;
use crate::lock::mode::LockMode;
use crate::lock::resource::LockResource;

#[derive(Default)]
struct ResourceState {
    granted: Vec<(TrxId, LockMode)>,
    waiting: VecDeque<(TrxId, LockMode)>,
}

struct LockTable {
    resources: HashMap<LockResource, ResourceState>,
    aborted: HashSet<TrxId>,
}

pub struct LockManager {
    table: Mutex<LockTable>,
    wake: Condvar,
    lock_wait_timeout: Duration,
}

impl LockManager {
    pub fn new(lock_wait_timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable {
                resources: HashMap::new(),
                aborted: HashSet::new(),
            }),
            wake: Condvar::new(),
            lock_wait_timeout,
        }
    }

    /// Acquire `mode` on `resource` for `trx`, blocking the calling
    /// thread if it must wait. Returns `DeadlockDetected` if `trx` is
    /// chosen as a cycle's victim, or `LockTimeout` if the wait exceeds
    /// `lock_wait_timeout`.
    pub fn acquire(&self, trx: TrxId, resource: LockResource, mode: LockMode) -> Result<()> {
        let mut table = self.table.lock();

        if table.aborted.remove(&trx) {
            return Err(Error::DeadlockDetected(trx.0));
        }

        {
            let state = table.resources.entry(resource).or_default();
            if state.granted.iter().any(|&(t, m)| t == trx && m == mode) {
                return Ok(());
            }
            let compatible = state
                .granted
                .iter()
                .all(|&(t, m)| t == trx || m.compatible_with(mode));
            if compatible && state.waiting.is_empty() {
                state.granted.push((trx, mode));
                debug!("lock {mode} on {resource} granted immediately to trx {trx}");
                return Ok(());
            }
            state.waiting.push_back((trx, mode));
        }

        if let Some(victim) = self.detect_deadlock(&mut table, trx) {
            self.abort_waiter(&mut table, resource, victim);
            if victim == trx {
                return Err(Error::DeadlockDetected(trx.0));
            }
        }

        let deadline = Instant::now() + self.lock_wait_timeout;
        loop {
            if table.aborted.remove(&trx) {
                self.remove_waiting(&mut table, resource, trx);
                return Err(Error::DeadlockDetected(trx.0));
            }

            if self.try_promote(&mut table, resource, trx, mode) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                self.remove_waiting(&mut table, resource, trx);
                return Err(Error::LockTimeout(trx.0));
            }
            let remaining = deadline - now;
            let timed_out = self.wake.wait_for(&mut table, remaining).timed_out();
            if timed_out {
                if table.aborted.remove(&trx) {
                    self.remove_waiting(&mut table, resource, trx);
                    return Err(Error::DeadlockDetected(trx.0));
                }
                if self.try_promote(&mut table, resource, trx, mode) {
                    return Ok(());
                }
                self.remove_waiting(&mut table, resource, trx);
                return Err(Error::LockTimeout(trx.0));
            }
        }
    }

    /// Front-of-queue compatibility promotion (spec §5: grants on one
    /// resource are totally ordered by arrival).
    fn try_promote(&self, table: &mut LockTable, resource: LockResource, trx: TrxId, mode: LockMode) -> bool {
        let state = table.resources.entry(resource).or_default();
        if state.waiting.front().map(|&(t, _)| t) != Some(trx) {
            return false;
        }
        let compatible = state
            .granted
            .iter()
            .all(|&(t, m)| t == trx || m.compatible_with(mode));
        if !compatible {
            return false;
        }
        state.waiting.pop_front();
        state.granted.push((trx, mode));
        true
    }

    pub fn release(&self, trx: TrxId, resource: LockResource) {
        let mut table = self.table.lock();
        if let Some(state) = table.resources.get_mut(&resource) {
            state.granted.retain(|&(t, _)| t != trx);
        }
        self.wake.notify_all();
    }

    pub fn release_all(&self, trx: TrxId) {
        let mut table = self.table.lock();
        for state in table.resources.values_mut() {
            state.granted.retain(|&(t, _)| t != trx);
            state.waiting.retain(|&(t, _)| t != trx);
        }
        self.wake.notify_all();
    }

    fn remove_waiting(&self, table: &mut LockTable, resource: LockResource, trx: TrxId) {
        if let Some(state) = table.resources.get_mut(&resource) {
            state.waiting.retain(|&(t, _)| t != trx);
        }
        self.wake.notify_all();
    }

    /// Mark `victim` aborted and evict it from `resource`'s wait queue
    /// so the cycle breaks immediately; the victim's own thread (if
    /// it's the one blocked, not the caller) observes the flag on wake.
    fn abort_waiter(&self, table: &mut LockTable, resource: LockResource, victim: TrxId) {
        table.aborted.insert(victim);
        for state in table.resources.values_mut() {
            state.waiting.retain(|&(t, _)| t != victim);
        }
        let _ = resource;
        self.wake.notify_all();
    }

    /// Build the wait-for graph from current state and look for a cycle
    /// rooted at `trx`'s new wait edge.
    fn detect_deadlock(&self, table: &mut LockTable, trx: TrxId) -> Option<TrxId> {
        let mut graph = WaitForGraph::new();
        for state in table.resources.values() {
            for &(waiter, wmode) in &state.waiting {
                for &(holder, hmode) in &state.granted {
                    if holder != waiter && !hmode.compatible_with(wmode) {
                        graph.add_edge(waiter, holder);
                    }
                }
            }
        }
        let cycle = graph.find_cycle_from(trx)?;
        Some(WaitForGraph::pick_victim(&cycle))
    }
}
