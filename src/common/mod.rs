//! Common types and utilities shared across the storage core.
//!
//! This module contains fundamental primitives used throughout the
//! codebase: configuration constants, the unified error type, and the
//! identifiers (`SpaceId`, `PageId`, `FrameId`, `ExtentId`, `TrxId`) that
//! every other module keys its data structures by.

pub mod config;
pub mod error;
mod extent_id;
mod frame_id;
mod page_id;
mod space_id;
mod trx_id;

pub use error::{Error, Result};
pub use extent_id::ExtentId;
pub use frame_id::FrameId;
pub use page_id::PageId;
pub use space_id::SpaceId;
pub use trx_id::TrxId;
