//! Range-scan cursor over a B+Tree's leaves (spec §4.3 "range scan").
//!
//! Walks the leaf linked list left to right, buffering one leaf's
//! records at a time and applying the caller's range bounds. Restartable:
//! on a transient I/O error the caller can build a fresh cursor with
//! [`Cursor::resume_after`] and pick up strictly after the last key it
//! had already yielded, instead of re-descending from the original
//! start bound (see DESIGN.md).

use std::ops::Bound;
use std::sync::Arc;

use crate::common::{PageId, Result};

use super::btree::BTree;
use super::slotted_page::{self, StoredRecord};

pub struct Cursor {
    tree: Arc<BTree>,
    start: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    current_leaf: Option<PageId>,
    buffer: Vec<StoredRecord>,
    buffer_pos: usize,
    started: bool,
    last_key: Option<Vec<u8>>,
    exhausted: bool,
}

impl Cursor {
    pub fn new(tree: Arc<BTree>, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        Self {
            tree,
            start,
            end,
            current_leaf: None,
            buffer: Vec::new(),
            buffer_pos: 0,
            started: false,
            last_key: None,
            exhausted: false,
        }
    }

    /// Build a cursor that resumes a scan right after `last_key`,
    /// re-descending from the tree's root rather than trusting a stale
    /// page reference. Used to recover from a transient fetch error
    /// mid-scan without skipping or repeating rows.
    pub fn resume_after(tree: Arc<BTree>, last_key: Vec<u8>, end: Bound<Vec<u8>>) -> Self {
        Self::new(tree, Bound::Excluded(last_key), end)
    }

    /// The key of the last record this cursor yielded, if any — the
    /// bookmark a caller should pass to `resume_after` after an error.
    pub fn last_key(&self) -> Option<&[u8]> {
        self.last_key.as_deref()
    }

    fn below_start(&self, key: &[u8]) -> bool {
        match &self.start {
            Bound::Unbounded => false,
            Bound::Included(k) => key < k.as_slice(),
            Bound::Excluded(k) => key <= k.as_slice(),
        }
    }

    fn past_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Unbounded => false,
            Bound::Included(k) => key > k.as_slice(),
            Bound::Excluded(k) => key >= k.as_slice(),
        }
    }

    fn load_start_leaf(&mut self) -> Result<()> {
        let leaf_id = match &self.start {
            Bound::Unbounded => self.tree.first_leaf()?,
            Bound::Included(k) | Bound::Excluded(k) => self.tree.leaf_for_key(k)?,
        };
        self.fill_buffer_from(leaf_id)?;
        self.started = true;
        Ok(())
    }

    fn fill_buffer_from(&mut self, leaf_id: PageId) -> Result<()> {
        let guard = self.tree.bpm().fetch_page_read(self.tree.space_id(), leaf_id)?;
        self.buffer = slotted_page::user_records(&guard);
        self.buffer_pos = 0;
        self.current_leaf = Some(leaf_id);
        Ok(())
    }

    /// The next record in range, or `None` once the scan is exhausted.
    /// Includes tombstoned (deleted) records — MVCC visibility is the
    /// caller's concern, applied against each record's version chain.
    pub fn next(&mut self) -> Result<Option<StoredRecord>> {
        if self.exhausted {
            return Ok(None);
        }
        if !self.started {
            self.load_start_leaf()?;
        }
        loop {
            while self.buffer_pos < self.buffer.len() {
                let rec = self.buffer[self.buffer_pos].clone();
                self.buffer_pos += 1;
                if self.below_start(&rec.key) {
                    continue;
                }
                if self.past_end(&rec.key) {
                    self.exhausted = true;
                    return Ok(None);
                }
                self.last_key = Some(rec.key.clone());
                return Ok(Some(rec));
            }
            let leaf_id = match self.current_leaf {
                Some(id) => id,
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            };
            let next_id = {
                let guard = self.tree.bpm().fetch_page_read(self.tree.space_id(), leaf_id)?;
                guard.fil_header().next
            };
            if next_id == PageId::INVALID.0 {
                self.exhausted = true;
                return Ok(None);
            }
            self.fill_buffer_from(PageId::new(next_id))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::common::SpaceId;
    use crate::storage::record::{self, RecordHeader, RecordType};
    use crate::storage::tablespace::Tablespace;
    use crate::table::row::{Row, Value};
    use crate::table::schema::{ColumnSchema, ColumnType, Schema};
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(vec![ColumnSchema::new("v", ColumnType::Int, false)], vec![0])
    }

    fn key_for(v: i32) -> Vec<u8> {
        let mut out = Vec::new();
        record::encode_value_for_key(&Value::Int(v), &mut out);
        out
    }

    fn payload_for(v: i32) -> Vec<u8> {
        let row = Row::new(vec![Value::Int(v)]);
        let header = RecordHeader::new(RecordType::ClusteredLeaf, 0);
        record::encode_clustered_leaf(header, &row, &schema(), crate::common::TrxId::new(1), [0; 7])
    }

    fn build_tree(n: i32) -> (Arc<BTree>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let space_id = SpaceId::new(1);
        let ts = Tablespace::create(dir.path().join("t.ibd"), space_id).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(256, std::time::Duration::from_secs(3600)));
        bpm.register_tablespace(ts);

        let root = BTree::create_root(&bpm, space_id, 1, 1).unwrap();
        let tree = Arc::new(BTree::new(bpm, space_id, 1, 1, root));
        for v in 0..n {
            tree.insert(key_for(v), payload_for(v), RecordType::ClusteredLeaf).unwrap();
        }
        (tree, dir)
    }

    #[test]
    fn test_full_scan_yields_every_key_in_order() {
        let (tree, _dir) = build_tree(300);
        let mut cursor = Cursor::new(Arc::clone(&tree), Bound::Unbounded, Bound::Unbounded);

        let mut seen = Vec::new();
        while let Some(rec) = cursor.next().unwrap() {
            seen.push(rec.key);
        }
        let expected: Vec<Vec<u8>> = (0..300).map(key_for).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_bounded_scan_respects_range() {
        let (tree, _dir) = build_tree(100);
        let mut cursor = Cursor::new(
            Arc::clone(&tree),
            Bound::Included(key_for(10)),
            Bound::Excluded(key_for(20)),
        );

        let mut seen = Vec::new();
        while let Some(rec) = cursor.next().unwrap() {
            seen.push(rec.key);
        }
        let expected: Vec<Vec<u8>> = (10..20).map(key_for).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_resume_after_continues_without_repeats() {
        let (tree, _dir) = build_tree(50);
        let mut cursor = Cursor::new(Arc::clone(&tree), Bound::Unbounded, Bound::Unbounded);

        let mut first_half = Vec::new();
        for _ in 0..20 {
            first_half.push(cursor.next().unwrap().unwrap().key);
        }

        let bookmark = cursor.last_key().unwrap().to_vec();
        let mut resumed = Cursor::resume_after(Arc::clone(&tree), bookmark, Bound::Unbounded);
        let mut second_half = Vec::new();
        while let Some(rec) = resumed.next().unwrap() {
            second_half.push(rec.key);
        }

        first_half.extend(second_half);
        let expected: Vec<Vec<u8>> = (0..50).map(key_for).collect();
        assert_eq!(first_half, expected);
    }
}
