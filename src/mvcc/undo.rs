//! Undo log - version-chain storage for rollback and consistent reads
//! (spec §3 "Version chain", §4.5 "Undo and rollback").
//!
//! The real engine threads version chains through roll-pointers into
//! on-disk undo pages owned by a rollback segment. This core keeps the
//! chain links and before-images in memory behind [`UndoManager`] rather
//! than allocating a separate page type for them (see DESIGN.md); the
//! chain-walk and purge rules are otherwise exactly as specified.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::TrxId;
use crate::table::row::Row;

/// A roll-pointer: identifies one entry in the undo log. Stands in for
/// the spec's 7-byte on-page roll-pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RollPtr(pub u64);

impl RollPtr {
    /// Sentinel meaning "no roll-pointer" when stored inline on a page.
    /// Safe because `UndoManager::next_ptr` starts at 1.
    pub const NONE: RollPtr = RollPtr(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Pack into the record codec's 7-byte on-page roll-pointer field.
    pub fn to_bytes7(self) -> [u8; 7] {
        let full = self.0.to_be_bytes();
        let mut out = [0u8; 7];
        out.copy_from_slice(&full[1..8]);
        out
    }

    pub fn from_bytes7(bytes: [u8; 7]) -> Self {
        let mut full = [0u8; 8];
        full[1..8].copy_from_slice(&bytes);
        RollPtr(u64::from_be_bytes(full))
    }
}

/// The before-image captured by one write.
#[derive(Debug, Clone)]
pub enum UndoImage {
    /// The row did not exist before this write and was inserted as
    /// `Row`; rollback deletes it.
    Insert(Row),
    /// The row held `before` prior to this write; rollback restores it.
    Update(Row),
    /// The row `before` was deleted by this write; rollback reinserts it.
    Delete(Row),
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub trx_id: TrxId,
    pub prev: Option<RollPtr>,
    pub image: UndoImage,
}

/// Owns every undo record live in the system, keyed by roll-pointer.
pub struct UndoManager {
    next_ptr: AtomicU64,
    records: Mutex<HashMap<RollPtr, UndoRecord>>,
}

impl UndoManager {
    pub fn new() -> Self {
        Self {
            next_ptr: AtomicU64::new(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Append a new undo record, returning its roll-pointer.
    pub fn append(&self, trx_id: TrxId, prev: Option<RollPtr>, image: UndoImage) -> RollPtr {
        let ptr = RollPtr(self.next_ptr.fetch_add(1, Ordering::Relaxed));
        self.records.lock().insert(ptr, UndoRecord { trx_id, prev, image });
        ptr
    }

    pub fn get(&self, ptr: RollPtr) -> Option<UndoRecord> {
        self.records.lock().get(&ptr).cloned()
    }

    /// Walk the chain from `start` and collect every record whose
    /// `trx_id` predates `min_active`; used by the purge worker.
    pub fn purgeable(&self, start: RollPtr, min_active: TrxId) -> Vec<RollPtr> {
        let records = self.records.lock();
        let mut out = Vec::new();
        let mut cur = Some(start);
        while let Some(ptr) = cur {
            match records.get(&ptr) {
                Some(rec) if rec.trx_id < min_active => {
                    out.push(ptr);
                    cur = rec.prev;
                }
                _ => break,
            }
        }
        out
    }

    pub fn purge(&self, ptrs: &[RollPtr]) {
        let mut records = self.records.lock();
        for ptr in ptrs {
            records.remove(ptr);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}
