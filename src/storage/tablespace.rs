//! Tablespace - the `.ibd` file abstraction (spec §2, "Space/extent allocator").
//!
//! A [`Tablespace`] owns one [`DiskManager`] and the extent bookkeeping on
//! top of it: which extents are free, which are fragment-allocated, and
//! which belong (partially or fully) to a segment. Page 0 of every
//! tablespace is reserved as the space header; extent descriptor pages are
//! not separately modeled here (the allocator keeps its extent list
//! in-memory and persists it as a flat table in the space header page's
//! body on `sync`, which is sufficient for this core's scope — see
//! DESIGN.md).

use std::collections::HashMap;
use std::io;
use std::path::Path;

use log::{debug, info};

use crate::common::config::PAGES_PER_EXTENT;
use crate::common::{Error, ExtentId, PageId, Result, SpaceId};
use crate::storage::disk_manager::DiskManager;
use crate::storage::extent::{Extent, ExtentState};
use crate::storage::page::{Page, PageType};

/// Page 0 of every tablespace is reserved for the space header and is
/// never handed out by the allocator.
pub const SPACE_HEADER_PAGE: u32 = 0;

/// On-disk encoding of one extent's allocation state in the space
/// header's extent table: id (u32) + bitmap (u64) + state tag (u8) +
/// owning segment id (u64, `0` when the state doesn't carry one).
const EXTENT_RECORD_SIZE: usize = 4 + 8 + 1 + 8;

const STATE_FREE: u8 = 0;
const STATE_FREE_FRAG: u8 = 1;
const STATE_PARTIAL: u8 = 2;
const STATE_FULL: u8 = 3;

/// How many extent records fit in the space header page's body, after
/// the leading 4-byte record count.
fn extent_table_capacity() -> usize {
    let body_len = Page::trailer_offset() - Page::body_offset();
    (body_len - 4) / EXTENT_RECORD_SIZE
}

/// Owns one tablespace file plus its extent allocator state.
pub struct Tablespace {
    space_id: SpaceId,
    disk: DiskManager,
    extents: HashMap<ExtentId, Extent>,
    free_list: Vec<ExtentId>,
    free_frag_list: Vec<ExtentId>,
    segment_partial: HashMap<u64, Vec<ExtentId>>,
    segment_full: HashMap<u64, Vec<ExtentId>>,
}

impl Tablespace {
    /// Create a brand-new tablespace file at `path`, writing the space
    /// header into page 0.
    pub fn create<P: AsRef<Path>>(path: P, space_id: SpaceId) -> Result<Self> {
        let mut disk = DiskManager::create(path, space_id)?;
        let header_id = disk.allocate_page()?;
        debug_assert_eq!(header_id.0, SPACE_HEADER_PAGE);

        let mut header_page = Page::init(space_id, header_id, PageType::FspHdr);
        header_page.update_checksum();
        disk.write_page(header_id.0, &header_page)?;

        info!("created tablespace {space_id} at page_count=1");

        Ok(Self {
            space_id,
            disk,
            extents: HashMap::new(),
            free_list: Vec::new(),
            free_frag_list: Vec::new(),
            segment_partial: HashMap::new(),
            segment_full: HashMap::new(),
        })
    }

    /// Open an existing tablespace file, rebuilding the in-memory extent
    /// lists from the extent table persisted in the space header page.
    /// An extent drawn from the file but missing from that table (e.g.
    /// a tablespace written before this table existed) is treated as
    /// free, which is only safe for a file with no real allocations.
    pub fn open<P: AsRef<Path>>(path: P, space_id: SpaceId) -> Result<Self> {
        let mut disk = DiskManager::open(path, space_id)?;
        let header_page = disk.read_page(SPACE_HEADER_PAGE)?;
        let persisted = Self::decode_extent_table(&header_page);

        let mut ts = Self {
            space_id,
            disk,
            extents: HashMap::new(),
            free_list: Vec::new(),
            free_frag_list: Vec::new(),
            segment_partial: HashMap::new(),
            segment_full: HashMap::new(),
        };

        let n_extents = ts.disk.page_count() / PAGES_PER_EXTENT;
        for i in 0..n_extents {
            let id = ExtentId::new(i);
            let (bitmap, state) = persisted.get(&id).copied().unwrap_or((0, ExtentState::Free));

            let mut extent = Extent::new(id);
            extent.set_bitmap(bitmap);
            extent.state = state;

            match state {
                ExtentState::Free => ts.free_list.push(id),
                ExtentState::FreeFrag => ts.free_frag_list.push(id),
                ExtentState::Partial(seg) => ts.segment_partial.entry(seg).or_default().push(id),
                ExtentState::Full(seg) => ts.segment_full.entry(seg).or_default().push(id),
            }
            ts.extents.insert(id, extent);
        }

        info!("reopened tablespace {space_id}, restored {} extent(s)", persisted.len());
        Ok(ts)
    }

    /// Parse the extent table out of the space header page's body, if
    /// one was ever persisted there (a freshly `create`d tablespace has
    /// a zeroed body and decodes to an empty table).
    fn decode_extent_table(header_page: &Page) -> HashMap<ExtentId, (u64, ExtentState)> {
        let data = header_page.as_slice();
        let body = &data[Page::body_offset()..Page::trailer_offset()];

        let mut out = HashMap::new();
        if body.len() < 4 {
            return out;
        }
        let n = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
        let capacity = extent_table_capacity();
        if n > capacity {
            // Corrupt or foreign count; treat as "nothing persisted" rather
            // than reading garbage entries.
            return out;
        }

        for i in 0..n {
            let off = 4 + i * EXTENT_RECORD_SIZE;
            if off + EXTENT_RECORD_SIZE > body.len() {
                break;
            }
            let rec = &body[off..off + EXTENT_RECORD_SIZE];
            let id = ExtentId::new(u32::from_le_bytes(rec[0..4].try_into().unwrap()));
            let bitmap = u64::from_le_bytes(rec[4..12].try_into().unwrap());
            let tag = rec[12];
            let seg = u64::from_le_bytes(rec[13..21].try_into().unwrap());
            let state = match tag {
                STATE_FREE_FRAG => ExtentState::FreeFrag,
                STATE_PARTIAL => ExtentState::Partial(seg),
                STATE_FULL => ExtentState::Full(seg),
                _ => ExtentState::Free,
            };
            out.insert(id, (bitmap, state));
        }
        out
    }

    /// Encode the current extent table into the space header page's
    /// body. Returns an error if there are more extents than fit in a
    /// single page (spec scope: no overflow/continuation page).
    fn encode_extent_table(&self, header_page: &mut Page) -> Result<()> {
        let capacity = extent_table_capacity();
        if self.extents.len() > capacity {
            return Err(Error::Io(io::Error::other(format!(
                "space {} has {} extents, more than the {capacity} the header page's extent table can hold",
                self.space_id,
                self.extents.len(),
            ))));
        }

        let data = header_page.as_mut_slice();
        let body = &mut data[Page::body_offset()..Page::trailer_offset()];
        body.fill(0);
        body[0..4].copy_from_slice(&(self.extents.len() as u32).to_le_bytes());

        for (i, extent) in self.extents.values().enumerate() {
            let off = 4 + i * EXTENT_RECORD_SIZE;
            let (tag, seg) = match extent.state {
                ExtentState::Free => (STATE_FREE, 0u64),
                ExtentState::FreeFrag => (STATE_FREE_FRAG, 0u64),
                ExtentState::Partial(seg) => (STATE_PARTIAL, seg),
                ExtentState::Full(seg) => (STATE_FULL, seg),
            };
            body[off..off + 4].copy_from_slice(&extent.id.0.to_le_bytes());
            body[off + 4..off + 12].copy_from_slice(&extent.bitmap().to_le_bytes());
            body[off + 12] = tag;
            body[off + 13..off + 21].copy_from_slice(&seg.to_le_bytes());
        }
        Ok(())
    }

    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    /// Allocate a new extent, claimed by `segment_id` (or a fragment
    /// extent if `segment_id` is `None`), extending the file if no free
    /// extent is already tracked.
    pub fn allocate_extent(&mut self, segment_id: Option<u64>) -> Result<ExtentId> {
        let id = match self.free_list.pop() {
            Some(id) => id,
            None => {
                let first_page = self.disk.allocate_extent()?;
                ExtentId::new(first_page / PAGES_PER_EXTENT)
            }
        };

        let mut extent = self.extents.remove(&id).unwrap_or_else(|| Extent::new(id));
        match segment_id {
            Some(seg) => {
                extent.state = ExtentState::Partial(seg);
                self.segment_partial.entry(seg).or_default().push(id);
            }
            None => {
                extent.state = ExtentState::FreeFrag;
                self.free_frag_list.push(id);
            }
        }
        self.extents.insert(id, extent);
        debug!("allocated extent {id} for segment {segment_id:?} in space {}", self.space_id);
        Ok(id)
    }

    /// Return an extent to the free list. The extent must be fully empty.
    pub fn free_extent(&mut self, id: ExtentId) -> Result<()> {
        let extent = self
            .extents
            .get_mut(&id)
            .ok_or(Error::InvalidExtent(id.0, self.space_id))?;

        if !extent.is_empty() {
            return Err(Error::InvalidExtent(id.0, self.space_id));
        }

        match extent.state {
            ExtentState::Partial(seg) | ExtentState::Full(seg) => {
                if let Some(list) = self.segment_partial.get_mut(&seg) {
                    list.retain(|e| *e != id);
                }
                if let Some(list) = self.segment_full.get_mut(&seg) {
                    list.retain(|e| *e != id);
                }
            }
            ExtentState::FreeFrag => {
                self.free_frag_list.retain(|e| *e != id);
            }
            ExtentState::Free => {}
        }

        extent.state = ExtentState::Free;
        self.free_list.push(id);
        Ok(())
    }

    /// Allocate a single page for `segment_id`, reusing space in an
    /// already-partial extent for that segment before drawing a new one
    /// from the fragment or free lists.
    pub fn allocate_page(&mut self, segment_id: u64) -> Result<PageId> {
        let extent_id = if let Some(candidate) = self
            .segment_partial
            .get(&segment_id)
            .and_then(|list| list.last().copied())
        {
            candidate
        } else if let Some(candidate) = self.free_frag_list.last().copied() {
            candidate
        } else {
            self.allocate_extent(Some(segment_id))?
        };

        let extent = self
            .extents
            .get_mut(&extent_id)
            .ok_or(Error::InvalidExtent(extent_id.0, self.space_id))?;

        let offset = extent
            .allocate_page()
            .ok_or(Error::InvalidExtent(extent_id.0, self.space_id))?;

        if extent.is_full() {
            extent.state = ExtentState::Full(segment_id);
            self.free_frag_list.retain(|e| *e != extent_id);
            if let Some(list) = self.segment_partial.get_mut(&segment_id) {
                list.retain(|e| *e != extent_id);
            }
            self.segment_full.entry(segment_id).or_default().push(extent_id);
        } else if matches!(extent.state, ExtentState::FreeFrag) {
            // stays on the fragment list; nothing to move
        } else {
            extent.state = ExtentState::Partial(segment_id);
            if !self
                .segment_partial
                .get(&segment_id)
                .is_some_and(|l| l.contains(&extent_id))
            {
                self.segment_partial.entry(segment_id).or_default().push(extent_id);
            }
        }

        let page_no = extent_id.first_page() + offset;
        Ok(PageId::new(page_no))
    }

    /// Return a page to its extent's free bitmap. If the extent becomes
    /// entirely empty it is moved back onto the global free list.
    pub fn free_page(&mut self, page_id: PageId) -> Result<()> {
        let extent_id = ExtentId::containing(page_id.0);
        let offset = page_id.0 - extent_id.first_page();

        let extent = self
            .extents
            .get_mut(&extent_id)
            .ok_or(Error::InvalidPageId(page_id.0, self.space_id))?;
        extent.free_page(offset);

        if extent.is_empty() {
            self.free_extent(extent_id)?;
        }
        Ok(())
    }

    /// Read and checksum-verify a page.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let page = self.disk.read_page(page_id.0)?;
        if !page.verify_checksum() {
            return Err(Error::PageCorrupted {
                space: self.space_id,
                page: page_id,
            });
        }
        Ok(page)
    }

    /// Stamp the checksum and write a page back to disk.
    pub fn write_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        page.update_checksum();
        self.disk.write_page(page_id.0, page)
    }

    /// Persist the extent allocation table into the space header page
    /// and fsync the file. Must be called before a tablespace is
    /// dropped and later reopened, or the reopen will not know which
    /// extents are actually occupied.
    pub fn sync(&mut self) -> Result<()> {
        let mut header_page = self.disk.read_page(SPACE_HEADER_PAGE)?;
        self.encode_extent_table(&mut header_page)?;
        header_page.update_checksum();
        self.disk.write_page(SPACE_HEADER_PAGE, &header_page)?;
        self.disk.sync()
    }

    pub fn page_count(&self) -> u32 {
        self.disk.page_count()
    }
}
