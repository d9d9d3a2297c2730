//! Wait-for graph cycle detection (spec §4.6).
//!
//! Built fresh from the lock manager's current granted/waiting state on
//! every new wait edge — cheap enough at the resource counts this core
//! targets, and avoids an incrementally-maintained graph going stale.

use std::collections::{HashMap, HashSet};

use crate::common::TrxId;

/// Edges are `waiter -> holder`: `waiter` is blocked on a resource held
/// (or also awaited, transitively) by `holder`.
pub struct WaitForGraph {
    edges: HashMap<TrxId, Vec<TrxId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self { edges: HashMap::new() }
    }

    pub fn add_edge(&mut self, waiter: TrxId, holder: TrxId) {
        if waiter != holder {
            self.edges.entry(waiter).or_default().push(holder);
        }
    }

    /// Depth-first search from `start`; a back-edge to an ancestor on
    /// the current path is a cycle. Returns the full cycle (start
    /// included) if one is found.
    pub fn find_cycle_from(&self, start: TrxId) -> Option<Vec<TrxId>> {
        let mut path = vec![start];
        let mut on_path: HashSet<TrxId> = HashSet::from([start]);
        self.dfs(start, &mut path, &mut on_path)
    }

    fn dfs(&self, node: TrxId, path: &mut Vec<TrxId>, on_path: &mut HashSet<TrxId>) -> Option<Vec<TrxId>> {
        let Some(neighbors) = self.edges.get(&node) else {
            return None;
        };
        for &next in neighbors {
            if on_path.contains(&next) {
                let start_idx = path.iter().position(|&t| t == next).unwrap_or(0);
                return Some(path[start_idx..].to_vec());
            }
            path.push(next);
            on_path.insert(next);
            if let Some(cycle) = self.dfs(next, path, on_path) {
                return Some(cycle);
            }
            path.pop();
            on_path.remove(&next);
        }
        None
    }

    /// The victim is the highest (youngest) trx-id in the cycle.
    pub fn pick_victim(cycle: &[TrxId]) -> TrxId {
        *cycle.iter().max().expect("cycle is never empty")
    }
}

impl Default for WaitForGraph {
    fn default() -> Self {
        Self::new()
    }
}
