//! End-to-end tests across the table, MVCC, and locking layers: the
//! scenarios a single module's unit tests can't exercise on their own.

use innocore::buffer::BufferPoolManager;
use innocore::common::{Error, SpaceId};
use innocore::mvcc::IsolationLevel;
use innocore::storage::tablespace::Tablespace;
use innocore::table::row::{Row, Value};
use innocore::table::schema::{ColumnSchema, ColumnType, Schema};
use innocore::table::TableHandle;
use innocore::txn::TrxCoordinator;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn schema() -> Schema {
    Schema::new(
        vec![
            ColumnSchema::new("id", ColumnType::Int, false),
            ColumnSchema::new("balance", ColumnType::BigInt, false),
        ],
        vec![0],
    )
}

fn row(id: i32, balance: i64) -> Row {
    Row::new(vec![Value::Int(id), Value::BigInt(balance)])
}

fn setup() -> (TableHandle, TrxCoordinator, tempfile::TempDir) {
    let _ = env_logger::try_init();

    let dir = tempdir().unwrap();
    let space_id = SpaceId::new(1);
    let ts = Tablespace::create(dir.path().join("accounts.ibd"), space_id).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(512, Duration::from_secs(3600)));
    bpm.register_tablespace(ts);
    let table = TableHandle::create(bpm, space_id, 1, 1, schema()).unwrap();
    let coord = TrxCoordinator::new(1, Duration::from_millis(200));
    (table, coord, dir)
}

/// A repeatable-read transaction's snapshot must stay stable even as
/// other transactions commit inserts, updates, and deletes around it.
#[test]
fn test_repeatable_read_snapshot_survives_concurrent_writes() {
    let (table, coord, _dir) = setup();

    let t0 = coord.begin(IsolationLevel::ReadCommitted);
    for i in 0..10 {
        table.insert(&coord, t0, row(i, 100)).unwrap();
    }
    coord.commit(t0).unwrap();

    let reader = coord.begin(IsolationLevel::RepeatableRead);
    let snapshot = coord.statement_read_view(reader).unwrap();

    let writer = coord.begin(IsolationLevel::ReadCommitted);
    let key5 = row(5, 0).key_bytes(&table.schema().primary_key);
    table.update(&coord, writer, &key5, row(5, 999)).unwrap();
    let key7 = row(7, 0).key_bytes(&table.schema().primary_key);
    table.delete(&coord, writer, &key7).unwrap();
    table.insert(&coord, writer, row(10, 100)).unwrap();
    coord.commit(writer).unwrap();

    assert_eq!(table.point_get(coord.mvcc(), &snapshot, &key5).unwrap(), Some(row(5, 100)));
    assert_eq!(table.point_get(coord.mvcc(), &snapshot, &key7).unwrap(), Some(row(7, 100)));
    let key10 = row(10, 0).key_bytes(&table.schema().primary_key);
    assert_eq!(table.point_get(coord.mvcc(), &snapshot, &key10).unwrap(), None);

    let t1 = coord.begin(IsolationLevel::ReadCommitted);
    let fresh = coord.statement_read_view(t1).unwrap();
    assert_eq!(table.point_get(coord.mvcc(), &fresh, &key5).unwrap(), Some(row(5, 999)));
    assert_eq!(table.point_get(coord.mvcc(), &fresh, &key7).unwrap(), None);
    assert_eq!(table.point_get(coord.mvcc(), &fresh, &key10).unwrap(), Some(row(10, 100)));
}

/// Rolling back a transaction must undo its writes' visible effect:
/// once rolled back, later transactions must see the pre-transaction
/// state, and the coordinator must release its locks.
#[test]
fn test_rollback_undoes_writes_and_releases_locks() {
    let (table, coord, _dir) = setup();

    let t0 = coord.begin(IsolationLevel::ReadCommitted);
    table.insert(&coord, t0, row(1, 500)).unwrap();
    coord.commit(t0).unwrap();

    let key1 = row(1, 0).key_bytes(&table.schema().primary_key);

    let t1 = coord.begin(IsolationLevel::ReadCommitted);
    table.update(&coord, t1, &key1, row(1, 1_000)).unwrap();
    table.rollback(&coord, t1).unwrap();

    // Once trx 1 aborts, its trx-id drops out of the active set just
    // like a committed one would — a ReadView can't tell the
    // difference on its own. table.rollback() physically restores the
    // pre-update row, so any later snapshot sees it rather than
    // mistaking the aborted write for a committed one.
    let t2 = coord.begin(IsolationLevel::ReadCommitted);
    let view = coord.statement_read_view(t2).unwrap();
    assert_eq!(table.point_get(coord.mvcc(), &view, &key1).unwrap(), Some(row(1, 500)));

    // The coordinator must be willing to grant a fresh transaction the
    // same page lock trx 1 held.
    let t3 = coord.begin(IsolationLevel::ReadCommitted);
    assert!(table.insert(&coord, t3, row(2, 1)).is_ok());
}

/// A second insert under the same primary key must be rejected while
/// the first is still the live (non-deleted) version.
#[test]
fn test_duplicate_key_insert_is_rejected_end_to_end() {
    let (table, coord, _dir) = setup();
    let t0 = coord.begin(IsolationLevel::ReadCommitted);
    table.insert(&coord, t0, row(1, 1)).unwrap();
    coord.commit(t0).unwrap();

    let t1 = coord.begin(IsolationLevel::ReadCommitted);
    assert!(matches!(table.insert(&coord, t1, row(1, 2)), Err(Error::DuplicateKey)));
}

/// A scan over a range spanning several leaf splits must yield exactly
/// the live rows, in key order, regardless of page boundaries.
#[test]
fn test_scan_across_splits_is_complete_and_ordered() {
    let (table, coord, _dir) = setup();

    let t0 = coord.begin(IsolationLevel::ReadCommitted);
    for i in 0..800 {
        table.insert(&coord, t0, row(i, i as i64)).unwrap();
    }
    coord.commit(t0).unwrap();

    let t1 = coord.begin(IsolationLevel::ReadCommitted);
    let view = coord.statement_read_view(t1).unwrap();
    let start = row(100, 0).key_bytes(&table.schema().primary_key);
    let end = row(200, 0).key_bytes(&table.schema().primary_key);
    let mut scan = table.scan(coord.mvcc(), view, Bound::Included(start), Bound::Excluded(end));

    let mut ids = Vec::new();
    while let Some(r) = scan.next().unwrap() {
        match r.values[0] {
            Value::Int(id) => ids.push(id),
            _ => unreachable!(),
        }
    }
    assert_eq!(ids, (100..200).collect::<Vec<_>>());
}
