//! Table handle (spec §4.3, §6): row-level scan/get/insert/update/delete,
//! wiring the clustered B+Tree, the MVCC engine's version chains, and
//! the transaction coordinator's locking together.
//!
//! Deletes never physically unlink a record — they flip its header's
//! `deleted` bit and rewrite its trailing trx-id/roll-pointer fields in
//! place so a reader on an older snapshot can still reach it by key and
//! then walk the version chain to the pre-delete row, which the undo
//! manager holds in full (see DESIGN.md). Updates, which change the
//! row's encoded length, instead remove the old slot and insert a fresh
//! one under the same key — the freed heap bytes are never reclaimed,
//! consistent with the page layer's no-compaction policy.

use std::ops::Bound;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{Error, PageId, Result, SpaceId, TrxId};
use crate::index::{self, BTree, Cursor, StoredRecord};
use crate::lock::{LockMode, LockResource};
use crate::mvcc::{MvccEngine, ReadView, RollPtr, UndoImage, VersionHead};
use crate::storage::record::{self, RecordHeader, RecordType};
use crate::table::row::Row;
use crate::table::schema::Schema;
use crate::txn::TrxCoordinator;

pub struct TableHandle {
    schema: Schema,
    index: Arc<BTree>,
}

impl TableHandle {
    /// Allocate a brand-new, empty clustered index for this table.
    pub fn create(bpm: Arc<BufferPoolManager>, space_id: SpaceId, segment_id: u64, index_id: u64, schema: Schema) -> Result<Self> {
        let root = BTree::create_root(&bpm, space_id, segment_id, index_id)?;
        Ok(Self {
            schema,
            index: Arc::new(BTree::new(bpm, space_id, segment_id, index_id, root)),
        })
    }

    /// Reopen a table whose clustered index root was recovered from the
    /// data dictionary (spec §9: table metadata lives outside this core).
    pub fn open(bpm: Arc<BufferPoolManager>, space_id: SpaceId, segment_id: u64, index_id: u64, root_page: PageId, schema: Schema) -> Self {
        Self {
            schema,
            index: Arc::new(BTree::new(bpm, space_id, segment_id, index_id, root_page)),
        }
    }

    pub fn root_page(&self) -> PageId {
        self.index.root_page()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn decode(&self, rec: &StoredRecord) -> (Row, TrxId, RollPtr) {
        match record::decode_clustered_leaf(&rec.payload, &self.schema) {
            record::Record::ClusteredLeaf { row, trx_id, roll_ptr } => {
                let roll_ptr = RollPtr::from_bytes7(roll_ptr);
                (row, trx_id, roll_ptr)
            }
            other => panic!("clustered index holds a non-leaf record: {other:?}"),
        }
    }

    fn version_head(&self, rec: &StoredRecord) -> VersionHead {
        let (row, trx_id, roll_ptr) = self.decode(rec);
        VersionHead {
            trx_id,
            roll_ptr: if roll_ptr.is_none() { None } else { Some(roll_ptr) },
            row: if rec.header.deleted { None } else { Some(row) },
        }
    }

    /// Exact-match lookup, filtered through `view`'s visibility rule.
    pub fn point_get(&self, mvcc: &MvccEngine, view: &ReadView, key: &[u8]) -> Result<Option<Row>> {
        match self.index.search(key)? {
            None => Ok(None),
            Some(rec) => Ok(mvcc.read_visible(&self.version_head(&rec), view)),
        }
    }

    /// A range scan over `[start, end)` (per the given bounds), filtered
    /// through `view`'s visibility rule one record at a time.
    pub fn scan<'a>(&'a self, mvcc: &'a MvccEngine, view: ReadView, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> RowScan<'a> {
        RowScan {
            handle: self,
            cursor: Cursor::new(Arc::clone(&self.index), start, end),
            mvcc,
            view,
        }
    }

    /// Insert a new row, failing with [`Error::DuplicateKey`] if a live
    /// (non-deleted) version already occupies its primary key.
    pub fn insert(&self, trx: &TrxCoordinator, trx_id: TrxId, row: Row) -> Result<()> {
        let key = row.key_bytes(&self.schema.primary_key);

        let leaf_id = self.index.leaf_for_key(&key)?;
        trx.acquire_lock(
            trx_id,
            LockResource::Page { space: self.index.space_id(), page: leaf_id },
            LockMode::X,
        )?;

        if let Some(existing) = self.index.search(&key)? {
            if !existing.header.deleted {
                return Err(Error::DuplicateKey);
            }
        }

        let roll_ptr = trx.mvcc().record_insert(row.clone());
        trx.record_write(trx_id, roll_ptr)?;

        let header = RecordHeader::new(RecordType::ClusteredLeaf, 0);
        let payload = record::encode_clustered_leaf(header, &row, &self.schema, trx_id, roll_ptr.to_bytes7());
        self.index.insert(key, payload, RecordType::ClusteredLeaf)
    }

    /// Replace the row at `key` with `new_row`, recording the prior
    /// value so older snapshots keep seeing it (spec §4.5).
    pub fn update(&self, trx: &TrxCoordinator, trx_id: TrxId, key: &[u8], new_row: Row) -> Result<()> {
        let leaf_id = self.index.leaf_for_key(key)?;
        trx.acquire_lock(
            trx_id,
            LockResource::Page { space: self.index.space_id(), page: leaf_id },
            LockMode::X,
        )?;

        let mvcc = trx.mvcc();
        let new_ptr = self
            .index
            .with_leaf_mut(key, |guard, idx| -> RollPtr {
                let rec = index::record_at_slot(guard, idx);
                let (prior_row, prior_trx, prior_ptr) = self.decode(&rec);
                let prior_ptr = if prior_ptr.is_none() { None } else { Some(prior_ptr) };
                let new_ptr = mvcc.record_update(prior_trx, prior_ptr, prior_row);
                index::remove_record(guard, idx);
                new_ptr
            })?
            .ok_or(Error::KeyNotFound)?;

        trx.record_write(trx_id, new_ptr)?;

        let header = RecordHeader::new(RecordType::ClusteredLeaf, 0);
        let payload = record::encode_clustered_leaf(header, &new_row, &self.schema, trx_id, new_ptr.to_bytes7());
        self.index.insert(key.to_vec(), payload, RecordType::ClusteredLeaf)
    }

    /// Tombstone the row at `key`: it stays in the page, reachable by
    /// key, but its head now reads as deleted and its version chain
    /// leads back to the pre-delete row.
    pub fn delete(&self, trx: &TrxCoordinator, trx_id: TrxId, key: &[u8]) -> Result<()> {
        let leaf_id = self.index.leaf_for_key(key)?;
        trx.acquire_lock(
            trx_id,
            LockResource::Page { space: self.index.space_id(), page: leaf_id },
            LockMode::X,
        )?;

        let mvcc = trx.mvcc();
        let new_ptr = self
            .index
            .with_leaf_mut(key, |guard, idx| -> RollPtr {
                let rec = index::record_at_slot(guard, idx);
                let (prior_row, prior_trx, prior_ptr) = self.decode(&rec);
                let prior_ptr = if prior_ptr.is_none() { None } else { Some(prior_ptr) };
                let new_ptr = mvcc.record_delete(prior_trx, prior_ptr, prior_row);

                let mut tail = Vec::with_capacity(13);
                tail.extend_from_slice(&trx_id.0.to_le_bytes()[0..6]);
                tail.extend_from_slice(&new_ptr.to_bytes7());
                index::overwrite_payload_tail(guard, idx, &tail);
                index::mark_deleted(guard, idx, true);

                new_ptr
            })?
            .ok_or(Error::KeyNotFound)?;

        trx.record_write(trx_id, new_ptr)
    }

    /// Undo every write `trx_id` made before it aborts. A ReadView's
    /// visibility rule has no notion of "aborted" — once `trx_id` drops
    /// out of the active set it reads as `< min_trx` to any later
    /// snapshot, same as a committed trx would. So dropping the locks
    /// and the active-set entry (which [`TrxCoordinator::rollback`]
    /// does) isn't enough on its own: the page itself has to go back to
    /// showing the pre-transaction version. This walks the undo chain
    /// oldest-last, reapplying each before-image in turn.
    pub fn rollback(&self, coord: &TrxCoordinator, trx_id: TrxId) -> Result<()> {
        let ptrs = coord.rollback(trx_id)?;
        let mvcc = coord.mvcc();

        for ptr in ptrs.into_iter().rev() {
            let rec = mvcc
                .undo_manager()
                .get(ptr)
                .expect("undo record referenced by an in-flight rollback must still exist");

            match rec.image {
                UndoImage::Insert(row) => {
                    let key = row.key_bytes(&self.schema.primary_key);
                    self.index.with_leaf_mut(&key, |guard, idx| {
                        index::remove_record(guard, idx);
                    })?;
                }
                UndoImage::Update(prior_row) | UndoImage::Delete(prior_row) => {
                    let key = prior_row.key_bytes(&self.schema.primary_key);
                    self.index.with_leaf_mut(&key, |guard, idx| {
                        index::remove_record(guard, idx);
                    })?;

                    let roll_ptr = rec.prev.unwrap_or(RollPtr::NONE);
                    let header = RecordHeader::new(RecordType::ClusteredLeaf, 0);
                    let payload =
                        record::encode_clustered_leaf(header, &prior_row, &self.schema, rec.trx_id, roll_ptr.to_bytes7());
                    self.index.insert(key, payload, RecordType::ClusteredLeaf)?;
                }
            }
        }

        Ok(())
    }
}

/// A lazy, MVCC-filtered iterator produced by [`TableHandle::scan`].
pub struct RowScan<'a> {
    handle: &'a TableHandle,
    cursor: Cursor,
    mvcc: &'a MvccEngine,
    view: ReadView,
}

impl RowScan<'_> {
    pub fn next(&mut self) -> Result<Option<Row>> {
        loop {
            match self.cursor.next()? {
                None => return Ok(None),
                Some(rec) => {
                    let head = self.handle.version_head(&rec);
                    if let Some(row) = self.mvcc.read_visible(&head, &self.view) {
                        return Ok(Some(row));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SpaceId;
    use crate::mvcc::IsolationLevel;
    use crate::storage::tablespace::Tablespace;
    use crate::table::row::Value;
    use crate::table::schema::{ColumnSchema, ColumnType};
    use std::time::Duration;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(
            vec![
                ColumnSchema::new("id", ColumnType::Int, false),
                ColumnSchema::new("v", ColumnType::VarChar(64), false),
            ],
            vec![0],
        )
    }

    fn row(id: i32, v: &str) -> Row {
        Row::new(vec![Value::Int(id), Value::VarChar(v.to_string())])
    }

    fn setup() -> (TableHandle, TrxCoordinator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let space_id = SpaceId::new(1);
        let ts = Tablespace::create(dir.path().join("t.ibd"), space_id).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(256, Duration::from_secs(3600)));
        bpm.register_tablespace(ts);
        let table = TableHandle::create(bpm, space_id, 1, 1, schema()).unwrap();
        let coord = TrxCoordinator::new(1, Duration::from_secs(1));
        (table, coord, dir)
    }

    #[test]
    fn test_insert_then_point_get() {
        let (table, coord, _dir) = setup();
        let t1 = coord.begin(IsolationLevel::ReadCommitted);
        table.insert(&coord, t1, row(1, "a")).unwrap();
        coord.commit(t1).unwrap();

        let t2 = coord.begin(IsolationLevel::ReadCommitted);
        let view = coord.statement_read_view(t2).unwrap();
        let key = row(1, "a").key_bytes(&table.schema().primary_key);
        let found = table.point_get(coord.mvcc(), &view, &key).unwrap();
        assert_eq!(found, Some(row(1, "a")));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (table, coord, _dir) = setup();
        let t1 = coord.begin(IsolationLevel::ReadCommitted);
        table.insert(&coord, t1, row(1, "a")).unwrap();
        assert!(matches!(table.insert(&coord, t1, row(1, "b")), Err(Error::DuplicateKey)));
    }

    #[test]
    fn test_update_visible_to_new_reads_but_not_old_snapshot() {
        let (table, coord, _dir) = setup();
        let t1 = coord.begin(IsolationLevel::ReadCommitted);
        table.insert(&coord, t1, row(1, "a")).unwrap();
        coord.commit(t1).unwrap();

        let reader = coord.begin(IsolationLevel::RepeatableRead);
        let old_view = coord.statement_read_view(reader).unwrap();

        let t2 = coord.begin(IsolationLevel::ReadCommitted);
        let key = row(1, "a").key_bytes(&table.schema().primary_key);
        table.update(&coord, t2, &key, row(1, "b")).unwrap();
        coord.commit(t2).unwrap();

        let old_row = table.point_get(coord.mvcc(), &old_view, &key).unwrap();
        assert_eq!(old_row, Some(row(1, "a")), "repeatable-read snapshot must not see the update");

        let t3 = coord.begin(IsolationLevel::ReadCommitted);
        let fresh_view = coord.statement_read_view(t3).unwrap();
        let new_row = table.point_get(coord.mvcc(), &fresh_view, &key).unwrap();
        assert_eq!(new_row, Some(row(1, "b")));
    }

    #[test]
    fn test_delete_hides_row_from_new_snapshot_but_not_old_one() {
        let (table, coord, _dir) = setup();
        let t1 = coord.begin(IsolationLevel::ReadCommitted);
        table.insert(&coord, t1, row(1, "a")).unwrap();
        coord.commit(t1).unwrap();

        let reader = coord.begin(IsolationLevel::RepeatableRead);
        let old_view = coord.statement_read_view(reader).unwrap();

        let t2 = coord.begin(IsolationLevel::ReadCommitted);
        let key = row(1, "a").key_bytes(&table.schema().primary_key);
        table.delete(&coord, t2, &key).unwrap();
        coord.commit(t2).unwrap();

        assert_eq!(table.point_get(coord.mvcc(), &old_view, &key).unwrap(), Some(row(1, "a")));

        let t3 = coord.begin(IsolationLevel::ReadCommitted);
        let fresh_view = coord.statement_read_view(t3).unwrap();
        assert_eq!(table.point_get(coord.mvcc(), &fresh_view, &key).unwrap(), None);
    }

    #[test]
    fn test_scan_returns_only_visible_rows_in_key_order() {
        let (table, coord, _dir) = setup();
        let t1 = coord.begin(IsolationLevel::ReadCommitted);
        for id in [3, 1, 4, 1_000, 2] {
            table.insert(&coord, t1, row(id, "x")).unwrap();
        }
        coord.commit(t1).unwrap();

        let t2 = coord.begin(IsolationLevel::ReadCommitted);
        let key_1000 = row(1_000, "x").key_bytes(&table.schema().primary_key);
        table.delete(&coord, t2, &key_1000).unwrap();
        coord.commit(t2).unwrap();

        let t3 = coord.begin(IsolationLevel::ReadCommitted);
        let view = coord.statement_read_view(t3).unwrap();
        let mut scan = table.scan(coord.mvcc(), view, Bound::Unbounded, Bound::Unbounded);
        let mut ids = Vec::new();
        while let Some(r) = scan.next().unwrap() {
            match r.values[0] {
                Value::Int(id) => ids.push(id),
                _ => unreachable!(),
            }
        }
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
