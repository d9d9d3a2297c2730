//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - the raw 16 KiB data container with FIL header/trailer access
//! - [`FilHeader`] / [`PageType`] - the 38-byte file-level header every page
//!   starts with, and its page-type discriminator
//! - [`IndexPageHeader`] - the body-level header specific to `INDEX` pages
//! - [`record`] - the record codec (clustered/secondary leaf/internal,
//!   infimum/supremum)

mod fil_header;
mod index_header;
#[allow(clippy::module_inception)]
mod page;

pub use fil_header::{FilHeader, PageType};
pub use index_header::IndexPageHeader;
pub use page::Page;
