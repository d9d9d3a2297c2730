//! Slotted INDEX page body (spec §6 "Index page"): a heap of variable-length
//! records linked in key order, plus a slot directory for binary search.
//!
//! Every stored record — including the infimum/supremum sentinels — is
//! wrapped in a small envelope on top of the record codec's own bytes:
//!
//! ```text
//! [u16 key_len][key bytes][u16 payload_len][payload bytes]
//! ```
//!
//! `payload` is exactly whatever `storage::record::encode_*` produced
//! (header first, type-specific body after). Wrapping it this way lets the
//! B+Tree compare and order records without decoding rows or knowing a
//! schema (see DESIGN.md on the record-key duplication this costs).
//!
//! The slot directory grows backward from the trailer; slot 0 always
//! points at the infimum record, which carries an empty key and so sorts
//! before everything by plain byte-lexicographic `Vec<u8>` order. Internal
//! nodes additionally store their leftmost child as a record with an empty
//! key (tied with infimum) — `find_slot`'s partition-point search always
//! resolves duplicate empty keys to the *later* slot, so this falls out
//! without special-casing.

use crate::storage::page::{IndexPageHeader, Page};
use crate::storage::record::RecordHeader;

/// A fully parsed record as it exists on a page.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub offset: u16,
    pub key: Vec<u8>,
    pub header: RecordHeader,
    /// Header + type-specific body, exactly as the record codec produced it.
    pub payload: Vec<u8>,
}

/// A structural page-modification request that needs a split: the page
/// doesn't have room for the new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFull;

const SLOT_SIZE: usize = 2;
const ENVELOPE_OVERHEAD: usize = 4; // key_len + payload_len

fn slot_addr(i: usize) -> usize {
    Page::trailer_offset() - (i + 1) * SLOT_SIZE
}

fn get_slot(page: &Page, i: usize) -> u16 {
    let addr = slot_addr(i);
    u16::from_le_bytes(page.as_slice()[addr..addr + 2].try_into().unwrap())
}

fn set_slot(page: &mut Page, i: usize, value: u16) {
    let addr = slot_addr(i);
    page.as_mut_slice()[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
}

/// Parse `(key_len, key, payload_len)` at a stored record's offset, without
/// copying the payload.
fn read_envelope_header(page: &Page, offset: usize) -> (usize, Vec<u8>, usize) {
    let buf = page.as_slice();
    let key_len = u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap()) as usize;
    let key = buf[offset + 2..offset + 2 + key_len].to_vec();
    let plen_at = offset + 2 + key_len;
    let payload_len = u16::from_le_bytes(buf[plen_at..plen_at + 2].try_into().unwrap()) as usize;
    (key_len, key, payload_len)
}

fn read_key_at(page: &Page, offset: usize) -> Vec<u8> {
    let (_, key, _) = read_envelope_header(page, offset);
    key
}

fn read_record_at(page: &Page, offset: usize) -> StoredRecord {
    let (key_len, key, payload_len) = read_envelope_header(page, offset);
    let payload_start = offset + 2 + key_len + 2;
    let payload = page.as_slice()[payload_start..payload_start + payload_len].to_vec();
    let header = RecordHeader::from_bytes(&payload);
    StoredRecord {
        offset: offset as u16,
        key,
        header,
        payload,
    }
}

fn envelope_total_len(key_len: usize, payload_len: usize) -> usize {
    ENVELOPE_OVERHEAD + key_len + payload_len
}

fn write_envelope(page: &mut Page, offset: usize, key: &[u8], payload: &[u8]) {
    let buf = page.as_mut_slice();
    let mut cursor = offset;
    buf[cursor..cursor + 2].copy_from_slice(&(key.len() as u16).to_le_bytes());
    cursor += 2;
    buf[cursor..cursor + key.len()].copy_from_slice(key);
    cursor += key.len();
    buf[cursor..cursor + 2].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    cursor += 2;
    buf[cursor..cursor + payload.len()].copy_from_slice(payload);
}

fn write_header_at(page: &mut Page, offset: usize, key_len: usize, header: RecordHeader) {
    let header_pos = offset + 2 + key_len + 2;
    page.as_mut_slice()[header_pos..header_pos + RecordHeader::SIZE].copy_from_slice(&header.to_bytes());
}

fn free_space(page: &Page) -> usize {
    let h = page.index_header();
    let slot_dir_start = Page::trailer_offset() - (h.n_slots as usize) * SLOT_SIZE;
    slot_dir_start.saturating_sub(h.heap_top as usize)
}

/// Initialize a freshly allocated INDEX page as an empty node (infimum and
/// supremum only, one slot for the infimum).
pub fn init_node(page: &mut Page, index_id: u64, level: u16, is_root: bool) {
    let infimum = crate::storage::record::encode_infimum(0, 0);
    let supremum = crate::storage::record::encode_supremum(1);

    let body_start = IndexPageHeader::PAGE_OFFSET + IndexPageHeader::SIZE;
    let inf_offset = body_start;
    let inf_total = envelope_total_len(0, infimum.len());
    let sup_offset = inf_offset + inf_total;
    let sup_total = envelope_total_len(0, supremum.len());

    write_envelope(page, inf_offset, &[], &infimum);
    write_envelope(page, sup_offset, &[], &supremum);

    // Link infimum -> supremum; supremum's own next_offset (0) is terminal.
    let mut inf_header = RecordHeader::from_bytes(&infimum);
    inf_header.next_offset = (sup_offset as i32 - inf_offset as i32) as i16;
    write_header_at(page, inf_offset, 0, inf_header);

    let mut header = IndexPageHeader::new(level, index_id, is_root, (sup_offset + sup_total) as u16);
    header.n_heap = 2;
    header.n_slots = 1;
    page.set_index_header(&header);
    set_slot(page, 0, inf_offset as u16);
}

/// Binary search the slot directory for the largest index whose key is
/// `<= target` (the infimum's empty key guarantees this is always >= 0).
pub fn find_slot(page: &Page, target: &[u8]) -> usize {
    let n = page.index_header().n_slots as usize;
    let mut lo = 0usize;
    let mut hi = n;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let offset = get_slot(page, mid) as usize;
        let key = read_key_at(page, offset);
        if key.as_slice() <= target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.saturating_sub(1)
}

pub fn record_at_slot(page: &Page, i: usize) -> StoredRecord {
    let offset = get_slot(page, i) as usize;
    read_record_at(page, offset)
}

pub fn slot_count(page: &Page) -> usize {
    page.index_header().n_slots as usize
}

/// Look up a key directly (slot index 0 means "not found" since that's
/// always the infimum sentinel, never a real record).
pub fn exact_match(page: &Page, key: &[u8]) -> Option<StoredRecord> {
    let idx = find_slot(page, key);
    if idx == 0 {
        return None;
    }
    let rec = record_at_slot(page, idx);
    if rec.key == key {
        Some(rec)
    } else {
        None
    }
}

/// All user records (excludes infimum/supremum), in ascending key order.
pub fn user_records(page: &Page) -> Vec<StoredRecord> {
    let n = slot_count(page);
    (1..n).map(|i| record_at_slot(page, i)).collect()
}

/// Insert one record, keyed by `key`. `payload` must already be a fully
/// encoded record (header + body, as the record codec produces); its
/// header's heap-no and next-offset are overwritten here to fit this page,
/// so the caller may pass any placeholder values when first encoding it.
pub fn insert_record(
    page: &mut Page,
    key: Vec<u8>,
    mut payload: Vec<u8>,
    record_type: crate::storage::record::RecordType,
) -> Result<u16, PageFull> {
    let mut header_idx = page.index_header();
    let heap_no = header_idx.n_heap;

    let total_len = envelope_total_len(key.len(), payload.len());
    if free_space(page) < total_len + SLOT_SIZE {
        return Err(PageFull);
    }

    let idx = find_slot(page, &key);
    let pred_offset = get_slot(page, idx) as usize;
    let (pred_key_len, _pred_key, pred_payload_len) = read_envelope_header(page, pred_offset);
    let pred_header_pos = pred_offset + 2 + pred_key_len + 2;
    let mut pred_header = RecordHeader::from_bytes(&page.as_slice()[pred_header_pos..pred_header_pos + RecordHeader::SIZE]);
    let succ_offset = (pred_offset as i32 + pred_header.next_offset as i32) as usize;
    let _ = pred_payload_len;

    let new_offset = header_idx.heap_top as usize;

    let mut header = RecordHeader::new(record_type, heap_no);
    header.next_offset = (succ_offset as i32 - new_offset as i32) as i16;
    payload[0..RecordHeader::SIZE].copy_from_slice(&header.to_bytes());

    write_envelope(page, new_offset, &key, &payload);

    pred_header.next_offset = (new_offset as i32 - pred_offset as i32) as i16;
    write_header_at(page, pred_offset, pred_key_len, pred_header);

    // Shift slots [idx+1..n) up by one, then place the new slot at idx+1.
    let n = header_idx.n_slots as usize;
    for i in (idx + 1..n).rev() {
        let v = get_slot(page, i);
        set_slot(page, i + 1, v);
    }
    set_slot(page, idx + 1, new_offset as u16);

    header_idx.n_records += 1;
    header_idx.n_heap += 1;
    header_idx.heap_top = (new_offset + total_len) as u16;
    header_idx.n_slots += 1;
    page.set_index_header(&header_idx);

    Ok(heap_no)
}

/// Remove the user record at logical slot `idx` (must be `>= 1`). The
/// deleted record's heap space is not reclaimed — pages only grow until a
/// split; there is no page-reorganize routine (see DESIGN.md).
pub fn remove_record(page: &mut Page, idx: usize) {
    assert!(idx >= 1, "cannot remove the infimum sentinel");

    let mut header_idx = page.index_header();
    let n = header_idx.n_slots as usize;

    let removed_offset = get_slot(page, idx) as usize;
    let (removed_key_len, _removed_key, _) = read_envelope_header(page, removed_offset);
    let removed_header_pos = removed_offset + 2 + removed_key_len + 2;
    let removed_header =
        RecordHeader::from_bytes(&page.as_slice()[removed_header_pos..removed_header_pos + RecordHeader::SIZE]);
    let succ_offset = (removed_offset as i32 + removed_header.next_offset as i32) as usize;

    let pred_offset = get_slot(page, idx - 1) as usize;
    let (pred_key_len, _pred_key, _) = read_envelope_header(page, pred_offset);
    let pred_header_pos = pred_offset + 2 + pred_key_len + 2;
    let mut pred_header =
        RecordHeader::from_bytes(&page.as_slice()[pred_header_pos..pred_header_pos + RecordHeader::SIZE]);
    pred_header.next_offset = (succ_offset as i32 - pred_offset as i32) as i16;
    write_header_at(page, pred_offset, pred_key_len, pred_header);

    for i in idx..n - 1 {
        let v = get_slot(page, i + 1);
        set_slot(page, i, v);
    }

    header_idx.n_records -= 1;
    header_idx.n_slots -= 1;
    page.set_index_header(&header_idx);
}

/// True if the page (a leaf) has no user records.
pub fn is_empty(page: &Page) -> bool {
    page.index_header().n_records == 0
}

/// Overwrite the trailing `tail.len()` bytes of the record at slot `idx`'s
/// payload, in place. Used to rewrite a clustered-leaf record's trailing
/// 6-byte trx-id + 7-byte roll-pointer fields after a delete, without
/// touching the row body ahead of them or changing the record's length.
pub fn overwrite_payload_tail(page: &mut Page, idx: usize, tail: &[u8]) {
    let offset = get_slot(page, idx) as usize;
    let (key_len, _key, payload_len) = read_envelope_header(page, offset);
    let payload_start = offset + 2 + key_len + 2;
    let start = payload_start + payload_len - tail.len();
    page.as_mut_slice()[start..start + tail.len()].copy_from_slice(tail);
}

/// Flip the deleted bit on the record at slot `idx`, in place. The
/// record stays in the page and reachable via `find_slot`/`exact_match`
/// so a reader holding an older snapshot can still locate it and walk
/// its version chain; nothing physically moves until a future split or
/// page reorganize (see DESIGN.md).
pub fn mark_deleted(page: &mut Page, idx: usize, deleted: bool) {
    assert!(idx >= 1, "cannot mark the infimum sentinel deleted");
    let offset = get_slot(page, idx) as usize;
    let (key_len, _key, _) = read_envelope_header(page, offset);
    let header_pos = offset + 2 + key_len + 2;
    let mut header = RecordHeader::from_bytes(&page.as_slice()[header_pos..header_pos + RecordHeader::SIZE]);
    header.deleted = deleted;
    write_header_at(page, offset, key_len, header);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SpaceId};
    use crate::storage::page::PageType;
    use crate::storage::record::RecordType;

    fn new_leaf() -> Page {
        let mut page = Page::init(SpaceId::new(0), PageId::new(1), PageType::Index);
        init_node(&mut page, 1, 0, true);
        page
    }

    fn encode_leaf_payload(value: u8) -> Vec<u8> {
        let row = crate::table::row::Row::new(vec![crate::table::row::Value::TinyInt(value as i8)]);
        let schema = crate::table::schema::Schema::new(
            vec![crate::table::schema::ColumnSchema::new(
                "v",
                crate::table::schema::ColumnType::TinyInt,
                false,
            )],
            vec![0],
        );
        let placeholder = RecordHeader::new(RecordType::ClusteredLeaf, 0);
        crate::storage::record::encode_clustered_leaf(placeholder, &row, &schema, crate::common::TrxId::new(1), [0; 7])
    }

    fn insert_kv(page: &mut Page, key: &[u8], value: u8) -> u16 {
        insert_record(page, key.to_vec(), encode_leaf_payload(value), RecordType::ClusteredLeaf).unwrap()
    }

    #[test]
    fn test_init_node_has_one_slot() {
        let page = new_leaf();
        assert_eq!(slot_count(&page), 1);
        assert!(is_empty(&page));
    }

    #[test]
    fn test_insert_and_exact_match() {
        let mut page = new_leaf();
        insert_kv(&mut page, b"b", 2);
        insert_kv(&mut page, b"a", 1);
        insert_kv(&mut page, b"c", 3);

        assert!(exact_match(&page, b"a").is_some());
        assert!(exact_match(&page, b"b").is_some());
        assert!(exact_match(&page, b"z").is_none());

        let records = user_records(&page);
        let keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_remove_record_fixes_links() {
        let mut page = new_leaf();
        insert_kv(&mut page, b"a", 1);
        insert_kv(&mut page, b"b", 2);
        insert_kv(&mut page, b"c", 3);

        let idx = find_slot(&page, b"b");
        remove_record(&mut page, idx);

        let keys: Vec<_> = user_records(&page).iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
        assert!(exact_match(&page, b"b").is_none());
    }

    #[test]
    fn test_page_full_triggers_split() {
        let mut page = new_leaf();
        let mut inserted = 0;
        for i in 0..2000u16 {
            let key = i.to_be_bytes().to_vec();
            let res = insert_record(&mut page, key, encode_leaf_payload(0), RecordType::ClusteredLeaf);
            match res {
                Ok(_) => inserted += 1,
                Err(PageFull) => break,
            }
        }
        assert!(inserted > 0 && inserted < 2000);
    }
}
