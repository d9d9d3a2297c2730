//! Index structures (spec §4.3, §6): the slotted-page record layout
//! shared by every INDEX page, and the B+Tree built on top of it.

mod btree;
mod cursor;
mod slotted_page;

pub use btree::BTree;
pub use cursor::Cursor;
pub use slotted_page::{mark_deleted, overwrite_payload_tail, record_at_slot, remove_record, PageFull, StoredRecord};
