//! Transaction state (spec §3 "Transaction").

use crate::common::TrxId;
use crate::lock::LockResource;
use crate::mvcc::read_view::ReadView;
use crate::mvcc::undo::RollPtr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Whether this level retains one ReadView for the transaction's
    /// whole lifetime rather than rebuilding per statement.
    pub fn snapshot_at_start(&self) -> bool {
        matches!(self, IsolationLevel::RepeatableRead | IsolationLevel::Serializable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxStatus {
    Active,
    Committed,
    Aborted,
}

/// A single transaction's state: id, isolation level, status, snapshot,
/// held locks, and its own undo entries (for rollback).
pub struct Transaction {
    pub id: TrxId,
    pub isolation: IsolationLevel,
    pub status: TrxStatus,
    pub read_view: Option<ReadView>,
    pub held_locks: Vec<LockResource>,
    /// This transaction's own writes, oldest first; rollback walks in
    /// reverse (spec §4.5).
    pub undo_log: Vec<RollPtr>,
}

impl Transaction {
    pub fn new(id: TrxId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            status: TrxStatus::Active,
            read_view: None,
            held_locks: Vec::new(),
            undo_log: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TrxStatus::Active
    }
}
