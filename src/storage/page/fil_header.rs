//! FIL header/trailer — the file-level metadata every page carries.
//!
//! # Layout (spec §6)
//! ```text
//! Offset  Size  Field                           Endianness
//! ------  ----  -----                           ----------
//! 0       4     checksum                        little-endian
//! 4       4     page-number                     big-endian (MySQL compat)
//! 8       4     previous page pointer            little-endian
//! 12      4     next page pointer                little-endian
//! 16      8     LSN                              little-endian
//! 24      2     page-type                        little-endian
//! 26      8     flush-LSN                        little-endian
//! 34      4     space-id                         big-endian (MySQL compat)
//! ```
//! followed by the body (bytes 38..page_size-8) and an 8-byte trailer:
//! bytes -8..-5 checksum, -4..-1 low 32 bits of the LSN.

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, SpaceId};

/// Discriminates the format of a page's body.
#[repr(u16)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Uninitialized or corrupted page.
    #[default]
    Invalid = 0,
    /// Page 0 of a tablespace: space header plus the first extent map.
    FspHdr = 1,
    /// An extent-descriptor page recurring every extent.
    Xdes = 2,
    /// A page holding segment inode entries.
    Inode = 3,
    /// A B+Tree node (leaf or internal; see `IndexPageHeader::level`).
    Index = 4,
    /// An undo-log page (rollback segment).
    Undo = 5,
    /// The transaction-system bookkeeping page (next trx-id, active list).
    TrxSys = 6,
}

impl PageType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => PageType::FspHdr,
            2 => PageType::Xdes,
            3 => PageType::Inode,
            4 => PageType::Index,
            5 => PageType::Undo,
            6 => PageType::TrxSys,
            _ => PageType::Invalid,
        }
    }
}

/// The 38-byte FIL header parsed out of (or written into) a page buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilHeader {
    /// Stored checksum, little-endian at offset 0.
    pub checksum: u32,
    /// This page's number within its tablespace.
    pub page_no: u32,
    /// Previous page in a leaf-sibling chain, or `PageId::INVALID`.
    pub prev: u32,
    /// Next page in a leaf-sibling chain, or `PageId::INVALID`.
    pub next: u32,
    /// Log sequence number of the last modification.
    pub lsn: u64,
    /// Format discriminator for the body.
    pub page_type: PageType,
    /// LSN at which this page was last flushed (page-0 only; 0 elsewhere).
    pub flush_lsn: u64,
    /// Owning tablespace.
    pub space_id: u32,
}

impl FilHeader {
    /// Size of the FIL header in bytes.
    pub const SIZE: usize = 38;
    /// Size of the FIL trailer in bytes.
    pub const TRAILER_SIZE: usize = 8;

    pub const OFFSET_CHECKSUM: usize = 0;
    pub const OFFSET_PAGE_NO: usize = 4;
    pub const OFFSET_PREV: usize = 8;
    pub const OFFSET_NEXT: usize = 12;
    pub const OFFSET_LSN: usize = 16;
    pub const OFFSET_PAGE_TYPE: usize = 24;
    pub const OFFSET_FLUSH_LSN: usize = 26;
    pub const OFFSET_SPACE_ID: usize = 34;

    pub const TRAILER_OFFSET_CHECKSUM: usize = PAGE_SIZE - 8;
    pub const TRAILER_OFFSET_LOW_LSN: usize = PAGE_SIZE - 4;

    /// Construct a fresh header for a brand-new page.
    pub fn new(space_id: SpaceId, page_no: PageId, page_type: PageType) -> Self {
        Self {
            checksum: 0,
            page_no: page_no.0,
            prev: PageId::INVALID.0,
            next: PageId::INVALID.0,
            lsn: 0,
            page_type,
            flush_lsn: 0,
            space_id: space_id.0,
        }
    }

    /// Parse a header from the start of a page buffer.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for FilHeader");

        let checksum = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let page_no = u32::from_be_bytes(data[4..8].try_into().unwrap());
        let prev = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let next = u32::from_le_bytes(data[12..16].try_into().unwrap());
        let lsn = u64::from_le_bytes(data[16..24].try_into().unwrap());
        let page_type = PageType::from_u16(u16::from_le_bytes(data[24..26].try_into().unwrap()));
        let flush_lsn = u64::from_le_bytes(data[26..34].try_into().unwrap());
        let space_id = u32::from_be_bytes(data[34..38].try_into().unwrap());

        Self {
            checksum,
            page_no,
            prev,
            next,
            lsn,
            page_type,
            flush_lsn,
            space_id,
        }
    }

    /// Write this header to the start of a page buffer.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for FilHeader");

        data[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        data[4..8].copy_from_slice(&self.page_no.to_be_bytes());
        data[8..12].copy_from_slice(&self.prev.to_le_bytes());
        data[12..16].copy_from_slice(&self.next.to_le_bytes());
        data[16..24].copy_from_slice(&self.lsn.to_le_bytes());
        data[24..26].copy_from_slice(&(self.page_type as u16).to_le_bytes());
        data[26..34].copy_from_slice(&self.flush_lsn.to_le_bytes());
        data[34..38].copy_from_slice(&self.space_id.to_be_bytes());
    }

    /// Compute the CRC32 checksum of a full page, with the header checksum
    /// field and trailer checksum field both zeroed out for the hash.
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[0u8; 4]); // header checksum field, zeroed
        hasher.update(&page_data[4..Self::TRAILER_OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]); // trailer checksum field, zeroed
        hasher.finalize()
    }

    /// Read the trailer's checksum and low-LSN fields.
    pub fn read_trailer(page_data: &[u8]) -> (u32, u32) {
        let checksum = u32::from_le_bytes(
            page_data[Self::TRAILER_OFFSET_CHECKSUM..Self::TRAILER_OFFSET_CHECKSUM + 4]
                .try_into()
                .unwrap(),
        );
        let low_lsn = u32::from_le_bytes(
            page_data[Self::TRAILER_OFFSET_LOW_LSN..Self::TRAILER_OFFSET_LOW_LSN + 4]
                .try_into()
                .unwrap(),
        );
        (checksum, low_lsn)
    }

    /// Write the trailer's checksum and low-LSN fields.
    pub fn write_trailer(page_data: &mut [u8], checksum: u32, lsn: u64) {
        page_data[Self::TRAILER_OFFSET_CHECKSUM..Self::TRAILER_OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum.to_le_bytes());
        page_data[Self::TRAILER_OFFSET_LOW_LSN..Self::TRAILER_OFFSET_LOW_LSN + 4]
            .copy_from_slice(&(lsn as u32).to_le_bytes());
    }
}
