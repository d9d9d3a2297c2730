//! Buffer Pool Manager - the core page caching layer (spec §4.2).
//!
//! Caches pages from any number of open tablespaces behind a single
//! fixed-size frame pool, using midpoint-insertion LRU for eviction and
//! a background thread for periodic dirty-page flushing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::config::DEFAULT_FLUSH_BATCH_SIZE;
use crate::common::{Error, FrameId, PageId, Result, SpaceId};
use crate::storage::page::PageType;
use crate::storage::tablespace::Tablespace;

type PageKey = (SpaceId, PageId);

/// Shared state the flush worker thread also touches.
struct Shared {
    frames: Vec<Frame>,
    page_table: RwLock<HashMap<PageKey, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    replacer: Mutex<LruReplacer>,
    tablespaces: RwLock<HashMap<SpaceId, Mutex<Tablespace>>>,
    stats: BufferPoolStats,
    pool_size: usize,
    /// Flush-eligibility bound. This core does not drive a write-ahead
    /// log, so there is no independently advancing checkpoint LSN;
    /// every dirty frame is flush-eligible (kept as a named field so the
    /// policy point spec §4.2 describes is explicit, see DESIGN.md).
    checkpoint_lsn: AtomicU64,
}

pub struct BufferPoolManager {
    shared: Arc<Shared>,
    flush_stop: Arc<AtomicBool>,
    flush_wake: Arc<Condvar>,
    flush_wake_lock: Arc<Mutex<()>>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager and start its background flush
    /// worker. `flush_interval` is the sweep cadence (spec default 1 s).
    pub fn new(pool_size: usize, flush_interval: Duration) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: Vec<FrameId> = (0..pool_size).map(FrameId::new).collect();

        let shared = Arc::new(Shared {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(LruReplacer::new()),
            tablespaces: RwLock::new(HashMap::new()),
            stats: BufferPoolStats::new(),
            pool_size,
            checkpoint_lsn: AtomicU64::new(u64::MAX),
        });

        let flush_stop = Arc::new(AtomicBool::new(false));
        let flush_wake = Arc::new(Condvar::new());
        let flush_wake_lock = Arc::new(Mutex::new(()));

        let handle = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&flush_stop);
            let wake = Arc::clone(&flush_wake);
            let wake_lock = Arc::clone(&flush_wake_lock);
            std::thread::spawn(move || {
                flush_worker_loop(shared, stop, wake, wake_lock, flush_interval);
            })
        };

        Self {
            shared,
            flush_stop,
            flush_wake,
            flush_wake_lock,
            flush_handle: Mutex::new(Some(handle)),
        }
    }

    /// Register an already-open tablespace so its pages can be cached.
    pub fn register_tablespace(&self, tablespace: Tablespace) {
        let space_id = tablespace.space_id();
        self.shared
            .tablespaces
            .write()
            .insert(space_id, Mutex::new(tablespace));
    }

    pub fn fetch_page_read(&self, space_id: SpaceId, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_internal(space_id, page_id)?;
        let lock = self.shared.frames[frame_id.0].page();
        Ok(PageReadGuard::new(self, frame_id, space_id, page_id, lock))
    }

    pub fn fetch_page_write(&self, space_id: SpaceId, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_internal(space_id, page_id)?;
        let lock = self.shared.frames[frame_id.0].page_mut();
        Ok(PageWriteGuard::new(self, frame_id, space_id, page_id, lock))
    }

    /// Allocate a new page in `space_id` for `segment_id` and load it
    /// into the pool pinned for write.
    pub fn new_page(
        &self,
        space_id: SpaceId,
        segment_id: u64,
        page_type: PageType,
    ) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.get_free_frame()?;

        let page_id = {
            let tablespaces = self.shared.tablespaces.read();
            let mut ts = tablespaces
                .get(&space_id)
                .ok_or(Error::InvalidPageId(0, space_id))?
                .lock();
            ts.allocate_page(segment_id)?
        };

        let frame = &self.shared.frames[frame_id.0];
        {
            let mut page = frame.page_mut();
            page.reset();
            *page = crate::storage::page::Page::init(space_id, page_id, page_type);
        }
        frame.set_identity(Some((space_id, page_id)));
        frame.pin();

        self.shared.page_table.write().insert((space_id, page_id), frame_id);
        {
            let mut replacer = self.shared.replacer.lock();
            replacer.record_access(frame_id, space_id, page_id);
            replacer.set_evictable(frame_id, false);
        }

        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, space_id, page_id, lock))
    }

    pub fn delete_page(&self, space_id: SpaceId, page_id: PageId) -> Result<()> {
        let mut pt = self.shared.page_table.write();
        let key = (space_id, page_id);
        let frame_id = match pt.get(&key) {
            Some(&fid) => fid,
            None => return Ok(()),
        };

        let frame = &self.shared.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::PageNotPinned(page_id.0));
        }

        pt.remove(&key);
        drop(pt);

        frame.set_identity(None);
        frame.clear_dirty();

        self.shared.replacer.lock().remove(frame_id);
        self.shared.free_list.lock().push(frame_id);

        Ok(())
    }

    pub fn flush_page(&self, space_id: SpaceId, page_id: PageId) -> Result<()> {
        let frame_id = {
            let pt = self.shared.page_table.read();
            match pt.get(&(space_id, page_id)) {
                Some(&fid) => fid,
                None => return Ok(()),
            }
        };
        self.flush_frame(frame_id, space_id, page_id)
    }

    /// Drain the dirty list synchronously. Must be called before
    /// `close()`.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<PageKey> = {
            let pt = self.shared.page_table.read();
            pt.keys().copied().collect()
        };
        for (space_id, page_id) in pages {
            self.flush_page(space_id, page_id)?;
        }
        Ok(())
    }

    /// Stop the background flush worker and require every frame to
    /// already be clean. Closing with dirty frames is an error (spec
    /// §4.2). Also syncs every registered tablespace, which persists
    /// its extent allocation table so a later `Tablespace::open` does
    /// not rediscover every extent as free.
    pub fn close(&self) -> Result<()> {
        let dirty_count = self.shared.frames.iter().filter(|f| f.is_dirty()).count();
        if dirty_count > 0 {
            return Err(Error::DirtyFramesOnClose(dirty_count));
        }

        self.flush_stop.store(true, Ordering::SeqCst);
        self.flush_wake.notify_all();
        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }

        for ts in self.shared.tablespaces.read().values() {
            ts.lock().sync()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &BufferPoolStats {
        &self.shared.stats
    }

    pub fn pool_size(&self) -> usize {
        self.shared.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.free_list.lock().len()
    }

    pub fn page_count(&self) -> usize {
        self.shared.page_table.read().len()
    }

    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.shared.frames[frame_id.0];
        if is_dirty {
            frame.mark_dirty();
        }
        let new_pin_count = frame.unpin();
        if new_pin_count == 0 {
            self.shared.replacer.lock().set_evictable(frame_id, true);
        }
    }

    fn fetch_page_internal(&self, space_id: SpaceId, page_id: PageId) -> Result<FrameId> {
        {
            let pt = self.shared.page_table.read();
            if let Some(&frame_id) = pt.get(&(space_id, page_id)) {
                self.handle_cache_hit(frame_id, space_id, page_id);
                return Ok(frame_id);
            }
        }
        self.handle_cache_miss(space_id, page_id)
    }

    fn handle_cache_hit(&self, frame_id: FrameId, space_id: SpaceId, page_id: PageId) {
        let frame = &self.shared.frames[frame_id.0];
        frame.pin();
        {
            let mut replacer = self.shared.replacer.lock();
            replacer.record_access(frame_id, space_id, page_id);
            replacer.set_evictable(frame_id, false);
        }
        self.shared.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn handle_cache_miss(&self, space_id: SpaceId, page_id: PageId) -> Result<FrameId> {
        self.shared.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.get_free_frame()?;

        let page_data = {
            let tablespaces = self.shared.tablespaces.read();
            let mut ts = tablespaces
                .get(&space_id)
                .ok_or(Error::PageNotFound(space_id, page_id.0))?
                .lock();
            ts.read_page(page_id)?
        };
        self.shared.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        let frame = &self.shared.frames[frame_id.0];
        frame.page_mut().as_mut_slice().copy_from_slice(page_data.as_slice());
        frame.set_identity(Some((space_id, page_id)));
        frame.pin();

        self.shared
            .page_table
            .write()
            .insert((space_id, page_id), frame_id);
        {
            let mut replacer = self.shared.replacer.lock();
            replacer.record_access(frame_id, space_id, page_id);
            replacer.set_evictable(frame_id, false);
        }

        Ok(frame_id)
    }

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.shared.free_list.lock().pop() {
            return Ok(frame_id);
        }
        self.evict_page()
    }

    fn evict_page(&self) -> Result<FrameId> {
        let frame_id = {
            let frames = &self.shared.frames;
            let mut replacer = self.shared.replacer.lock();
            replacer
                .evict_with(|fid| frames[fid.0].is_dirty())
                .ok_or(Error::NoFreeFrames)?
        };

        self.shared.stats.evictions.fetch_add(1, Ordering::Relaxed);

        let frame = &self.shared.frames[frame_id.0];
        let old_identity = frame.identity();

        if frame.is_dirty() {
            if let Some((space_id, page_id)) = old_identity {
                self.flush_frame(frame_id, space_id, page_id)?;
            }
        }

        if let Some(key) = old_identity {
            self.shared.page_table.write().remove(&key);
        }

        frame.clear_dirty();
        frame.set_identity(None);

        Ok(frame_id)
    }

    fn flush_frame(&self, frame_id: FrameId, space_id: SpaceId, page_id: PageId) -> Result<()> {
        let frame = &self.shared.frames[frame_id.0];
        if !frame.is_dirty() {
            return Ok(());
        }

        let mut page = frame.page_mut();
        let tablespaces = self.shared.tablespaces.read();
        let mut ts = tablespaces
            .get(&space_id)
            .ok_or(Error::PageNotFound(space_id, page_id.0))?
            .lock();
        ts.write_page(page_id, &mut page)?;
        drop(page);

        frame.clear_dirty();
        self.shared.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        self.flush_stop.store(true, Ordering::SeqCst);
        self.flush_wake.notify_all();
        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn flush_worker_loop(
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    wake: Arc<Condvar>,
    wake_lock: Arc<Mutex<()>>,
    interval: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        let mut guard = wake_lock.lock();
        let timed_out = wake.wait_for(&mut guard, interval).timed_out();
        drop(guard);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if !timed_out {
            continue;
        }

        let checkpoint_lsn = shared.checkpoint_lsn.load(Ordering::Relaxed);
        let mut flushed = 0usize;

        let candidates: Vec<PageKey> = {
            let pt = shared.page_table.read();
            pt.keys().copied().collect()
        };

        for (space_id, page_id) in candidates {
            if flushed >= DEFAULT_FLUSH_BATCH_SIZE {
                break;
            }
            let frame_id = match shared.page_table.read().get(&(space_id, page_id)).copied() {
                Some(fid) => fid,
                None => continue,
            };
            let frame = &shared.frames[frame_id.0];
            if !frame.is_dirty() {
                continue;
            }
            if frame.page().fil_header().lsn > checkpoint_lsn {
                continue;
            }

            let mut page = frame.page_mut();
            let tablespaces = shared.tablespaces.read();
            let ts = tablespaces.get(&space_id);
            if let Some(ts) = ts {
                let mut ts = ts.lock();
                match ts.write_page(page_id, &mut page) {
                    Ok(()) => {
                        drop(page);
                        frame.clear_dirty();
                        shared.stats.pages_written.fetch_add(1, Ordering::Relaxed);
                        flushed += 1;
                    }
                    Err(e) => {
                        warn!("background flush of {space_id}:{page_id} failed: {e}");
                    }
                }
            }
        }

        if flushed > 0 {
            debug!("background flush sweep wrote {flushed} page(s)");
        }
    }
}
