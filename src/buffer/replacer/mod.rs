//! Eviction policy implementation (replacer).
//!
//! [`LruReplacer`] is the core's sole replacement policy: midpoint
//! insertion LRU with young/old sublists, per spec §4.2.

mod lru;

pub use lru::{LruReplacer, DEFAULT_OLD_BLOCK_TIME};
