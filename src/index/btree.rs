//! B+Tree manager (spec §4.3): search, range search, and insert-with-split
//! over INDEX pages, built on the slotted-page layout in
//! [`crate::index::slotted_page`].
//!
//! Every operation that can structurally modify the tree (insert, and the
//! splits it may trigger) takes write latches top-down from the root and
//! holds all of them for the call's duration — the pessimistic mode the
//! spec allows, not optimistic latch-then-upgrade crabbing (see
//! DESIGN.md). Reads release a page's latch before fetching its child,
//! since they never need to backtrack.

use std::sync::Arc;

use crate::buffer::{BufferPoolManager, PageWriteGuard};
use crate::common::{PageId, Result, SpaceId};
use crate::storage::page::PageType;
use crate::storage::record::{self, RecordHeader, RecordType};

use super::slotted_page::{self, PageFull, StoredRecord};

/// Owns one B+Tree's shape: which tablespace and segment its pages live
/// in, and its stable root page number.
pub struct BTree {
    bpm: Arc<BufferPoolManager>,
    space_id: SpaceId,
    segment_id: u64,
    index_id: u64,
    root_page: PageId,
}

/// The internal-node record type that points at children of a leaf of
/// type `leaf_type`.
fn internal_type_for(leaf_type: RecordType) -> RecordType {
    match leaf_type {
        RecordType::ClusteredLeaf => RecordType::ClusteredInternal,
        RecordType::SecondaryLeaf => RecordType::SecondaryInternal,
        other => panic!("not a leaf record type: {other:?}"),
    }
}

/// Encode a child-pointer record. The header is a placeholder;
/// `insert_record` overwrites heap-no and next-offset to fit the page.
fn encode_child(record_type: RecordType, key: &[u8], child_page: u32) -> Vec<u8> {
    let header = RecordHeader::new(record_type, 0);
    record::encode_internal(header, key, child_page)
}

fn child_page_of(stored: &StoredRecord) -> u32 {
    match record::decode_internal(&stored.payload) {
        record::Record::ClusteredInternal { child_page, .. } => child_page,
        record::Record::SecondaryInternal { child_page, .. } => child_page,
        other => panic!("expected internal record, got {other:?}"),
    }
}

impl BTree {
    /// Allocate and initialize a brand-new, empty root (a leaf).
    pub fn create_root(bpm: &BufferPoolManager, space_id: SpaceId, segment_id: u64, index_id: u64) -> Result<PageId> {
        let mut guard = bpm.new_page(space_id, segment_id, PageType::Index)?;
        slotted_page::init_node(&mut guard, index_id, 0, true);
        guard.update_checksum();
        Ok(guard.page_id())
    }

    pub fn new(bpm: Arc<BufferPoolManager>, space_id: SpaceId, segment_id: u64, index_id: u64, root_page: PageId) -> Self {
        Self {
            bpm,
            space_id,
            segment_id,
            index_id,
            root_page,
        }
    }

    pub fn root_page(&self) -> PageId {
        self.root_page
    }

    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    pub fn bpm(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Exact-match lookup. Releases each page's read latch before
    /// descending to its child.
    pub fn search(&self, key: &[u8]) -> Result<Option<StoredRecord>> {
        let mut guard = self.bpm.fetch_page_read(self.space_id, self.root_page)?;
        loop {
            let header = guard.index_header();
            if header.is_leaf() {
                return Ok(slotted_page::exact_match(&guard, key));
            }
            let idx = slotted_page::find_slot(&guard, key);
            let rec = slotted_page::record_at_slot(&guard, idx);
            let child = PageId::new(child_page_of(&rec));
            guard = self.bpm.fetch_page_read(self.space_id, child)?;
        }
    }

    /// The leftmost leaf page of this tree (the start of a full scan).
    pub fn first_leaf(&self) -> Result<PageId> {
        let mut page_id = self.root_page;
        loop {
            let guard = self.bpm.fetch_page_read(self.space_id, page_id)?;
            let header = guard.index_header();
            if header.is_leaf() {
                return Ok(page_id);
            }
            // Slot 1 is always the leftmost child (key = [], tied with
            // infimum; find_slot resolves the tie to the later slot).
            let rec = slotted_page::record_at_slot(&guard, 1);
            page_id = PageId::new(child_page_of(&rec));
        }
    }

    /// The leaf that would contain `key`, without requiring an exact
    /// match — used to seed a range scan.
    pub fn leaf_for_key(&self, key: &[u8]) -> Result<PageId> {
        let mut page_id = self.root_page;
        loop {
            let guard = self.bpm.fetch_page_read(self.space_id, page_id)?;
            let header = guard.index_header();
            if header.is_leaf() {
                return Ok(page_id);
            }
            let idx = slotted_page::find_slot(&guard, key);
            let rec = slotted_page::record_at_slot(&guard, idx);
            page_id = PageId::new(child_page_of(&rec));
        }
    }

    /// Every leaf page in key order, left to right.
    pub fn all_leaves(&self) -> Result<Vec<PageId>> {
        let mut out = Vec::new();
        let mut page_id = self.first_leaf()?;
        loop {
            out.push(page_id);
            let guard = self.bpm.fetch_page_read(self.space_id, page_id)?;
            let next = guard.fil_header().next;
            if next == PageId::INVALID.0 {
                break;
            }
            page_id = PageId::new(next);
        }
        Ok(out)
    }

    /// Write-latch the leaf that would hold `key` and, if it has an
    /// exact-match record, pass it to `f` by slot index. Used by
    /// in-place updates and tombstone deletes, which never change the
    /// tree's shape and so need only one page latched, not a full
    /// root-to-leaf stack.
    pub fn with_leaf_mut<R>(&self, key: &[u8], f: impl FnOnce(&mut PageWriteGuard<'_>, usize) -> R) -> Result<Option<R>> {
        let page_id = self.leaf_for_key(key)?;
        let mut guard = self.bpm.fetch_page_write(self.space_id, page_id)?;
        let idx = slotted_page::find_slot(&guard, key);
        if idx == 0 {
            return Ok(None);
        }
        let rec = slotted_page::record_at_slot(&guard, idx);
        if rec.key != key {
            return Ok(None);
        }
        let result = f(&mut guard, idx);
        guard.update_checksum();
        Ok(Some(result))
    }

    /// Insert `key`/`payload` (a fully-encoded leaf record) into the tree,
    /// splitting pages top-down as needed. `record_type` is the leaf
    /// variant being inserted (clustered vs. secondary).
    pub fn insert(&self, key: Vec<u8>, payload: Vec<u8>, record_type: RecordType) -> Result<()> {
        let mut stack: Vec<PageWriteGuard<'_>> = vec![self.bpm.fetch_page_write(self.space_id, self.root_page)?];
        loop {
            let is_leaf = stack.last().unwrap().index_header().is_leaf();
            if is_leaf {
                break;
            }
            let child_id = {
                let top = stack.last().unwrap();
                let idx = slotted_page::find_slot(top, &key);
                let rec = slotted_page::record_at_slot(top, idx);
                PageId::new(child_page_of(&rec))
            };
            stack.push(self.bpm.fetch_page_write(self.space_id, child_id)?);
        }
        self.insert_into_leaf(stack, key, payload, record_type)
    }

    fn insert_into_leaf(
        &self,
        mut stack: Vec<PageWriteGuard<'_>>,
        key: Vec<u8>,
        payload: Vec<u8>,
        record_type: RecordType,
    ) -> Result<()> {
        let mut leaf = stack.pop().unwrap();
        match slotted_page::insert_record(&mut leaf, key.clone(), payload.clone(), record_type) {
            Ok(_) => {
                leaf.update_checksum();
                Ok(())
            }
            Err(PageFull) => {
                let (sibling_id, sep_key) = self.split_node(&mut leaf)?;
                if key.as_slice() >= sep_key.as_slice() {
                    let mut sibling = self.bpm.fetch_page_write(self.space_id, sibling_id)?;
                    slotted_page::insert_record(&mut sibling, key, payload, record_type)
                        .expect("fits immediately after a fresh split");
                    sibling.update_checksum();
                } else {
                    slotted_page::insert_record(&mut leaf, key, payload, record_type)
                        .expect("fits immediately after a fresh split");
                }
                leaf.update_checksum();

                if stack.is_empty() {
                    self.promote_root(leaf, sep_key, sibling_id, record_type)
                } else {
                    self.propagate_split(stack, sep_key, sibling_id, record_type)
                }
            }
        }
    }

    /// Insert the separator produced by a child split into `stack`'s top
    /// page, recursively splitting ancestors (and finally the root) as
    /// needed.
    fn propagate_split(
        &self,
        mut stack: Vec<PageWriteGuard<'_>>,
        sep_key: Vec<u8>,
        new_child: PageId,
        leaf_record_type: RecordType,
    ) -> Result<()> {
        let mut parent = stack.pop().unwrap();
        let internal_type = internal_type_for(leaf_record_type);
        let payload = encode_child(internal_type, &sep_key, new_child.0);

        match slotted_page::insert_record(&mut parent, sep_key.clone(), payload.clone(), internal_type) {
            Ok(_) => {
                parent.update_checksum();
                Ok(())
            }
            Err(PageFull) => {
                let (sibling_id, parent_sep) = self.split_node(&mut parent)?;
                if sep_key.as_slice() >= parent_sep.as_slice() {
                    let mut sibling = self.bpm.fetch_page_write(self.space_id, sibling_id)?;
                    slotted_page::insert_record(&mut sibling, sep_key, payload, internal_type)
                        .expect("fits immediately after a fresh split");
                    sibling.update_checksum();
                } else {
                    slotted_page::insert_record(&mut parent, sep_key, payload, internal_type)
                        .expect("fits immediately after a fresh split");
                }
                parent.update_checksum();

                if stack.is_empty() {
                    self.promote_root(parent, parent_sep, sibling_id, leaf_record_type)
                } else {
                    self.propagate_split(stack, parent_sep, sibling_id, leaf_record_type)
                }
            }
        }
    }

    /// Split a full page (leaf or internal) in place: the lower half of
    /// its records stays, the upper half moves to a freshly allocated
    /// sibling. Returns the sibling's page id and the key that separates
    /// the two halves (the sibling's first record's key).
    fn split_node(&self, page: &mut PageWriteGuard<'_>) -> Result<(PageId, Vec<u8>)> {
        let header = page.index_header();
        let level = header.level;
        let index_id = header.index_id;
        let was_root = header.is_root;
        let old_next = page.fil_header().next;

        let records = slotted_page::user_records(page);
        let mid = records.len() / 2;
        let (left, right) = records.split_at(mid);
        let sep_key = right[0].key.clone();

        let mut sibling = self.bpm.new_page(self.space_id, self.segment_id, PageType::Index)?;
        slotted_page::init_node(&mut sibling, index_id, level, false);
        for rec in right {
            slotted_page::insert_record(&mut sibling, rec.key.clone(), rec.payload.clone(), rec.header.record_type)
                .expect("half of a full page fits in an empty one");
        }

        // Reinitializing `page` only rewrites its body and index header;
        // the fil header (page number, sibling links) is untouched, so
        // the leaf chain below still points at the same page ids.
        slotted_page::init_node(page, index_id, level, was_root);
        for rec in left {
            slotted_page::insert_record(page, rec.key.clone(), rec.payload.clone(), rec.header.record_type)
                .expect("half of a full page fits in an empty one");
        }

        // Thread the new sibling into the leaf-level linked list. Internal
        // pages have no such chain (searches only ever follow child
        // pointers), so skip this for level > 0.
        if level == 0 {
            let mut sibling_fil = sibling.fil_header();
            sibling_fil.prev = page.page_id().0;
            sibling_fil.next = old_next;
            sibling.set_fil_header(&sibling_fil);

            let mut page_fil = page.fil_header();
            page_fil.next = sibling.page_id().0;
            page.set_fil_header(&page_fil);

            if old_next != PageId::INVALID.0 {
                let mut next_guard = self.bpm.fetch_page_write(self.space_id, PageId::new(old_next))?;
                let mut next_fil = next_guard.fil_header();
                next_fil.prev = sibling.page_id().0;
                next_guard.set_fil_header(&next_fil);
                next_guard.update_checksum();
            }
        }

        sibling.update_checksum();
        Ok((sibling.page_id(), sep_key))
    }

    /// `old_root` just overflowed and was split, producing `right_child`
    /// separated by `sep_key`. Grow the tree by one level: move
    /// `old_root`'s current (left-half) content into a brand-new page,
    /// then reinitialize `old_root`'s own page in place as an internal
    /// node pointing at the moved-aside content and at `right_child`.
    /// The root's page number never changes.
    fn promote_root(
        &self,
        mut old_root: PageWriteGuard<'_>,
        sep_key: Vec<u8>,
        right_child: PageId,
        leaf_record_type: RecordType,
    ) -> Result<()> {
        let header = old_root.index_header();
        let level = header.level;
        let index_id = header.index_id;
        let old_next = old_root.fil_header().next;

        let mut new_left = self.bpm.new_page(self.space_id, self.segment_id, PageType::Index)?;
        new_left.as_mut_slice().copy_from_slice(old_root.as_slice());
        let new_left_id = new_left.page_id();

        let mut new_left_fil = new_left.fil_header();
        new_left_fil.page_no = new_left_id.0;
        new_left.set_fil_header(&new_left_fil);

        let mut new_left_idx = new_left.index_header();
        new_left_idx.is_root = false;
        new_left.set_index_header(&new_left_idx);
        new_left.update_checksum();
        drop(new_left);

        // The content copied into `new_left` kept the old root's leaf-chain
        // pointers, which referred to the old root's page id; the
        // predecessor in that chain no longer exists (the root had none,
        // it was the first leaf), but its successor's `prev` must now
        // point at `new_left_id` instead.
        if level == 0 && old_next != PageId::INVALID.0 {
            let mut next_guard = self.bpm.fetch_page_write(self.space_id, PageId::new(old_next))?;
            let mut next_fil = next_guard.fil_header();
            next_fil.prev = new_left_id.0;
            next_guard.set_fil_header(&next_fil);
            next_guard.update_checksum();
        }

        let internal_type = internal_type_for(leaf_record_type);
        slotted_page::init_node(&mut old_root, index_id, level + 1, true);
        slotted_page::insert_record(
            &mut old_root,
            Vec::new(),
            encode_child(internal_type, &[], new_left_id.0),
            internal_type,
        )
        .expect("an empty root page fits two children");
        slotted_page::insert_record(
            &mut old_root,
            sep_key.clone(),
            encode_child(internal_type, &sep_key, right_child.0),
            internal_type,
        )
        .expect("an empty root page fits two children");
        old_root.update_checksum();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::common::SpaceId;
    use crate::storage::record::RecordHeader;
    use crate::storage::tablespace::Tablespace;
    use crate::table::row::{Row, Value};
    use crate::table::schema::{ColumnSchema, ColumnType, Schema};
    use tempfile::tempdir;

    fn setup(n_frames: usize) -> (Arc<BufferPoolManager>, SpaceId, u64, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let space_id = SpaceId::new(1);
        let ts = Tablespace::create(dir.path().join("t.ibd"), space_id).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(n_frames, std::time::Duration::from_secs(3600)));
        bpm.register_tablespace(ts);
        let segment_id = 1;
        (bpm, space_id, segment_id, dir)
    }

    fn schema() -> Schema {
        Schema::new(vec![ColumnSchema::new("v", ColumnType::Int, false)], vec![0])
    }

    fn leaf_payload(v: i32) -> Vec<u8> {
        let row = Row::new(vec![Value::Int(v)]);
        let header = RecordHeader::new(RecordType::ClusteredLeaf, 0);
        record::encode_clustered_leaf(header, &row, &schema(), crate::common::TrxId::new(1), [0; 7])
    }

    fn key_for(v: i32) -> Vec<u8> {
        let mut out = Vec::new();
        record::encode_value_for_key(&Value::Int(v), &mut out);
        out
    }

    #[test]
    fn test_insert_and_search_no_split() {
        let (bpm, space_id, segment_id, _dir) = setup(64);
        let root = BTree::create_root(&bpm, space_id, segment_id, 1).unwrap();
        let tree = BTree::new(Arc::clone(&bpm), space_id, segment_id, 1, root);

        for v in [5, 1, 9, 3] {
            tree.insert(key_for(v), leaf_payload(v), RecordType::ClusteredLeaf).unwrap();
        }

        for v in [5, 1, 9, 3] {
            let found = tree.search(&key_for(v)).unwrap();
            assert!(found.is_some());
        }
        assert!(tree.search(&key_for(42)).unwrap().is_none());
    }

    #[test]
    fn test_insert_many_triggers_split_and_root_promotion() {
        let (bpm, space_id, segment_id, _dir) = setup(256);
        let root = BTree::create_root(&bpm, space_id, segment_id, 1).unwrap();
        let tree = BTree::new(Arc::clone(&bpm), space_id, segment_id, 1, root);

        for v in 0..500i32 {
            tree.insert(key_for(v), leaf_payload(v), RecordType::ClusteredLeaf).unwrap();
        }

        assert_eq!(tree.root_page(), root, "root page number must stay stable across splits");

        for v in 0..500i32 {
            let found = tree.search(&key_for(v)).unwrap();
            assert!(found.is_some(), "missing key {v}");
        }

        let leaves = tree.all_leaves().unwrap();
        assert!(leaves.len() > 1, "500 rows should not fit in a single leaf");

        let mut seen = Vec::new();
        for leaf in &leaves {
            let guard = bpm.fetch_page_read(space_id, *leaf).unwrap();
            for rec in slotted_page::user_records(&guard) {
                seen.push(rec.key);
            }
        }
        let mut expected: Vec<Vec<u8>> = (0..500i32).map(key_for).collect();
        expected.sort();
        seen.sort();
        assert_eq!(seen, expected, "leaf chain must cover every inserted key exactly once, in order");
    }

    #[test]
    fn test_first_leaf_and_leaf_for_key_agree_after_splits() {
        let (bpm, space_id, segment_id, _dir) = setup(256);
        let root = BTree::create_root(&bpm, space_id, segment_id, 1).unwrap();
        let tree = BTree::new(Arc::clone(&bpm), space_id, segment_id, 1, root);

        for v in 0..300i32 {
            tree.insert(key_for(v), leaf_payload(v), RecordType::ClusteredLeaf).unwrap();
        }

        let first = tree.first_leaf().unwrap();
        let via_key = tree.leaf_for_key(&key_for(0)).unwrap();
        assert_eq!(first, via_key);
    }
}
