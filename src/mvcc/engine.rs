//! MVCC engine: version-chain visibility and undo bookkeeping (spec §4.5).

use std::sync::Arc;

use crate::common::TrxId;
use crate::mvcc::read_view::ReadView;
use crate::mvcc::undo::{RollPtr, UndoImage, UndoManager};
use crate::table::row::Row;

/// The live head of one record's version chain, as stored alongside the
/// row in its clustered-leaf page (trx-id + roll-pointer, spec §4.4).
#[derive(Debug, Clone)]
pub struct VersionHead {
    pub trx_id: TrxId,
    pub roll_ptr: Option<RollPtr>,
    /// `None` if the current head is a logically-deleted tombstone.
    pub row: Option<Row>,
}

pub struct MvccEngine {
    undo: Arc<UndoManager>,
}

impl MvccEngine {
    pub fn new() -> Self {
        Self { undo: Arc::new(UndoManager::new()) }
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// A clone of the shared handle, for the purge worker to hold
    /// independently of the engine's own lifetime.
    pub fn undo_manager_handle(&self) -> Arc<UndoManager> {
        Arc::clone(&self.undo)
    }

    /// Record the first version of a newly inserted row. There is no
    /// prior version, so the undo entry is a terminal "insert" marker;
    /// it carries the inserted row so a rollback can find its key again.
    pub fn record_insert(&self, row: Row) -> RollPtr {
        self.undo.append(TrxId::NONE, None, UndoImage::Insert(row))
    }

    /// Record an update, capturing the row's value and creating trx-id
    /// immediately prior to this write.
    pub fn record_update(&self, prior_trx: TrxId, prior_ptr: Option<RollPtr>, prior_row: Row) -> RollPtr {
        self.undo.append(prior_trx, prior_ptr, UndoImage::Update(prior_row))
    }

    /// Record a delete, capturing the full row as it existed immediately
    /// prior to this write.
    pub fn record_delete(&self, prior_trx: TrxId, prior_ptr: Option<RollPtr>, prior_row: Row) -> RollPtr {
        self.undo.append(prior_trx, prior_ptr, UndoImage::Delete(prior_row))
    }

    /// Visibility walk (spec §4.5): apply `view`'s predicate to the
    /// head, and if not visible, follow the roll-pointer chain until a
    /// visible version is found or the chain terminates.
    pub fn read_visible(&self, head: &VersionHead, view: &ReadView) -> Option<Row> {
        let mut cur_trx = head.trx_id;
        let mut cur_row = head.row.clone();
        let mut cur_ptr = head.roll_ptr;

        loop {
            if view.is_visible(cur_trx) {
                return cur_row;
            }
            let ptr = cur_ptr?;
            let rec = self.undo.get(ptr)?;
            match rec.image {
                UndoImage::Insert(_) => return None,
                UndoImage::Update(prev_row) | UndoImage::Delete(prev_row) => {
                    cur_row = Some(prev_row);
                    cur_trx = rec.trx_id;
                    cur_ptr = rec.prev;
                }
            }
        }
    }
}

impl Default for MvccEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row::Value;
    use std::collections::BTreeSet;

    fn view_excluding(active: &[u64], next: u64, creator: u64) -> ReadView {
        let set: BTreeSet<TrxId> = active.iter().map(|&i| TrxId::new(i)).collect();
        ReadView::new(TrxId::new(creator), TrxId::new(next), set)
    }

    #[test]
    fn test_head_visible_returns_head() {
        let engine = MvccEngine::new();
        let head = VersionHead {
            trx_id: TrxId::new(2),
            roll_ptr: None,
            row: Some(Row::new(vec![Value::Int(1)])),
        };
        let view = view_excluding(&[], 10, 99);
        assert_eq!(engine.read_visible(&head, &view), head.row);
    }

    #[test]
    fn test_invisible_head_walks_to_prior_version() {
        let engine = MvccEngine::new();

        // v1 created by trx 1.
        let ptr1 = engine.record_insert(Row::new(vec![Value::VarChar("v0".into())]));
        // v2 (update) created by trx 5, capturing v1 as prior.
        let v1_row = Row::new(vec![Value::VarChar("v1".into())]);
        let ptr2 = engine.record_update(TrxId::new(1), Some(ptr1), v1_row.clone());

        let head = VersionHead {
            trx_id: TrxId::new(5),
            roll_ptr: Some(ptr2),
            row: Some(Row::new(vec![Value::VarChar("v2".into())])),
        };

        // View that was snapshotted before trx 5 committed: trx 5 active.
        let view = view_excluding(&[5], 10, 99);
        assert_eq!(engine.read_visible(&head, &view), Some(v1_row));
    }

    #[test]
    fn test_chain_terminates_at_insert_marker() {
        let engine = MvccEngine::new();
        let ptr1 = engine.record_insert(Row::new(vec![Value::Int(7)]));
        let head = VersionHead {
            trx_id: TrxId::new(5),
            roll_ptr: Some(ptr1),
            row: Some(Row::new(vec![Value::Int(7)])),
        };
        let view = view_excluding(&[5], 10, 99);
        assert_eq!(engine.read_visible(&head, &view), None);
    }

    #[test]
    fn test_deleted_head_visible_to_later_view_is_none() {
        let engine = MvccEngine::new();
        let head = VersionHead {
            trx_id: TrxId::new(2),
            roll_ptr: None,
            row: None,
        };
        let view = view_excluding(&[], 10, 99);
        assert_eq!(engine.read_visible(&head, &view), None);
    }
}
