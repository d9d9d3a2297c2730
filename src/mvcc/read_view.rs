//! ReadView - the snapshot a transaction sees (spec §3, §4.5).

use std::collections::BTreeSet;

use crate::common::TrxId;

/// An immutable snapshot description used to decide version visibility.
///
/// Constructed once (at transaction start for REPEATABLE READ/SERIALIZABLE,
/// or fresh per statement for READ COMMITTED) and never mutated afterward.
#[derive(Debug, Clone)]
pub struct ReadView {
    creator_trx: TrxId,
    min_trx: TrxId,
    max_trx: TrxId,
    active_trx_set: BTreeSet<TrxId>,
}

impl ReadView {
    /// Capture a view. `min_active` is the lowest trx-id among currently
    /// active transactions (or `next_trx_id` if none are active);
    /// `next_trx_id` is the id that will be handed to the next `begin`;
    /// `active` is the current active-transaction set, snapshotted
    /// atomically by the caller (the transaction coordinator).
    pub fn new(creator_trx: TrxId, next_trx_id: TrxId, active: BTreeSet<TrxId>) -> Self {
        let min_trx = active.iter().copied().min().unwrap_or(next_trx_id);
        Self {
            creator_trx,
            min_trx,
            max_trx: next_trx_id,
            active_trx_set: active,
        }
    }

    pub fn creator(&self) -> TrxId {
        self.creator_trx
    }

    pub fn min_trx(&self) -> TrxId {
        self.min_trx
    }

    /// `T == creator_trx ∨ T < min_trx ∨ (T < max_trx ∧ T ∉ active_trx_set)`
    pub fn is_visible(&self, version_trx: TrxId) -> bool {
        version_trx == self.creator_trx
            || version_trx < self.min_trx
            || (version_trx < self.max_trx && !self.active_trx_set.contains(&version_trx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u64]) -> BTreeSet<TrxId> {
        ids.iter().map(|&i| TrxId::new(i)).collect()
    }

    #[test]
    fn test_creator_always_visible() {
        let view = ReadView::new(TrxId::new(5), TrxId::new(10), set(&[5, 7]));
        assert!(view.is_visible(TrxId::new(5)));
    }

    #[test]
    fn test_below_min_trx_visible() {
        let view = ReadView::new(TrxId::new(5), TrxId::new(10), set(&[7, 8]));
        assert!(view.is_visible(TrxId::new(3)));
    }

    #[test]
    fn test_active_at_snapshot_time_not_visible() {
        let view = ReadView::new(TrxId::new(5), TrxId::new(10), set(&[7, 8]));
        assert!(!view.is_visible(TrxId::new(7)));
    }

    #[test]
    fn test_committed_before_snapshot_visible() {
        let view = ReadView::new(TrxId::new(5), TrxId::new(10), set(&[7, 8]));
        assert!(view.is_visible(TrxId::new(6)));
    }

    #[test]
    fn test_started_after_snapshot_not_visible() {
        let view = ReadView::new(TrxId::new(5), TrxId::new(10), set(&[]));
        assert!(!view.is_visible(TrxId::new(11)));
    }
}
