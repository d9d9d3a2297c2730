//! Lockable resources (spec §3 "Lock table").

use std::fmt;

use crate::common::{PageId, SpaceId};

/// A resource the lock manager can grant locks on: either a single
/// record (identified by its heap-no within a page) or a whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockResource {
    Record { space: SpaceId, page: PageId, heap_no: u16 },
    Page { space: SpaceId, page: PageId },
}

impl fmt::Display for LockResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockResource::Record { space, page, heap_no } => {
                write!(f, "Record({space}, {page}, {heap_no})")
            }
            LockResource::Page { space, page } => write!(f, "Page({space}, {page})"),
        }
    }
}
