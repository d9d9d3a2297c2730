//! Error types for the storage core.
//!
//! A single flat enum, derived with `thiserror`, covers every failure kind
//! named in spec §7. `LockConflict` is deliberately absent: the spec marks
//! it internal-only ("turns into a wait"), so it is never surfaced as an
//! `Error` value — the lock manager represents it as a private wait
//! outcome instead.

use crate::common::{PageId, SpaceId};

/// Convenient `Result` alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors produced by the storage core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from disk operations. The affected operation aborts; the
    /// subsystem itself remains consistent.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checksum or page-type mismatch detected on read.
    #[error("page {space}:{page} failed checksum or type validation")]
    PageCorrupted { space: SpaceId, page: PageId },

    /// Allocator consistency error: double-free, bad extent id, etc.
    #[error("invalid extent {0} in space {1}")]
    InvalidExtent(u32, SpaceId),

    /// Page id out of range or otherwise invalid for the operation.
    #[error("invalid page id {0} in space {1}")]
    InvalidPageId(u32, SpaceId),

    /// Requested page does not exist on disk.
    #[error("page {1} not found in space {0}")]
    PageNotFound(SpaceId, u32),

    /// Buffer pool has no evictable frame (every frame pinned).
    #[error("no free frames available in buffer pool")]
    NoFreeFrames,

    /// Buffer pool is at capacity and the requested page is not resident.
    #[error("buffer pool is full")]
    BufferPoolFull,

    /// Attempted to unpin a page that was not pinned.
    #[error("page {0} is not pinned")]
    PageNotPinned(u32),

    /// Closing the buffer pool while dirty frames remain.
    #[error("cannot close buffer pool: {0} dirty frame(s) remain, call flush_all first")]
    DirtyFramesOnClose(usize),

    /// B+Tree search found no matching key.
    #[error("key not found")]
    KeyNotFound,

    /// B+Tree insert found an existing record with the same unique key.
    #[error("duplicate key")]
    DuplicateKey,

    /// A lock wait exceeded `lock_wait_timeout`.
    #[error("lock wait timed out for transaction {0}")]
    LockTimeout(u64),

    /// The transaction was chosen as a deadlock victim and must roll back.
    #[error("transaction {0} aborted: deadlock detected")]
    DeadlockDetected(u64),

    /// A transaction-level cancellation token fired mid-wait.
    #[error("transaction {0} aborted: cancelled")]
    TransactionAborted(u64),

    /// Operation attempted on a committed or aborted transaction.
    #[error("transaction {0} is not active")]
    InvalidTransactionState(u64),

    /// A ReadView needed a version that purge already removed. Diagnostic
    /// only — should not occur under correct purge rules (spec §7).
    #[error("snapshot expired: version needed by read view is no longer available")]
    SnapshotExpired,

    /// Invalid runtime configuration (e.g. wrong page size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(SpaceId::new(1), 42);
        assert_eq!(format!("{err}"), "page 42 not found in space Space(1)");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{err}"), "no free frames available in buffer pool");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }
        assert_eq!(might_fail().unwrap(), 42);
    }
}
