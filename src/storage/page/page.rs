//! Page - the fundamental 16 KiB unit of storage.
//!
//! A [`Page`] is a raw 16 KiB byte array that serves as the unit of I/O
//! between disk and memory. Pages are stored in [`Frame`](crate::buffer::Frame)s
//! within the buffer pool. Every page starts with a 38-byte [`FilHeader`]
//! and ends with an 8-byte trailer; the bytes between belong to whatever
//! body format the header's `page_type` names.

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, SpaceId};

use super::fil_header::{FilHeader, PageType};
use super::index_header::IndexPageHeader;

/// A page of data (16 KiB, 16 KiB-aligned).
///
/// # Memory Layout
/// - Size: 16384 bytes, matching InnoDB's default `innodb_page_size`.
/// - Alignment: 16 KiB, so pages can be handed to `O_DIRECT` I/O without
///   a bounce buffer.
///
/// # Clone
/// `Page` does not implement `Clone` outside tests: copying 16 KiB is
/// never something that should happen implicitly.
#[repr(align(16384))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Create a page pre-initialized with a FIL header for the given
    /// space, page number, and body type.
    pub fn init(space_id: SpaceId, page_no: PageId, page_type: PageType) -> Self {
        let mut page = Self::new();
        let header = FilHeader::new(space_id, page_no, page_type);
        page.set_fil_header(&header);
        page
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    /// Read the FIL header.
    pub fn fil_header(&self) -> FilHeader {
        FilHeader::from_bytes(&self.data)
    }

    /// Overwrite the FIL header.
    pub fn set_fil_header(&mut self, header: &FilHeader) {
        header.write_to(&mut self.data);
    }

    /// Read the INDEX page body header. Only meaningful when
    /// `fil_header().page_type == PageType::Index`.
    pub fn index_header(&self) -> IndexPageHeader {
        IndexPageHeader::from_bytes(&self.data)
    }

    pub fn set_index_header(&mut self, header: &IndexPageHeader) {
        header.write_to(&mut self.data);
    }

    /// Offset where the page body begins, just past the FIL header.
    #[inline]
    pub const fn body_offset() -> usize {
        FilHeader::SIZE
    }

    /// Offset where the trailer begins.
    #[inline]
    pub const fn trailer_offset() -> usize {
        PAGE_SIZE - FilHeader::TRAILER_SIZE
    }

    /// Compute and store the checksum in both the header and trailer.
    /// Call this after all modifications to the page are complete and
    /// before handing it to the buffer pool's flush path.
    pub fn update_checksum(&mut self) {
        let checksum = FilHeader::compute_checksum(&self.data);
        self.data[FilHeader::OFFSET_CHECKSUM..FilHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum.to_le_bytes());
        let lsn = self.fil_header().lsn;
        FilHeader::write_trailer(&mut self.data, checksum, lsn);
    }

    /// Verify the page's stored checksum matches its contents, and that
    /// the header and trailer checksums agree with each other.
    pub fn verify_checksum(&self) -> bool {
        let expected = FilHeader::compute_checksum(&self.data);
        let header_checksum = self.fil_header().checksum;
        let (trailer_checksum, _low_lsn) = FilHeader::read_trailer(&self.data);
        header_checksum == expected && trailer_checksum == expected
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}
