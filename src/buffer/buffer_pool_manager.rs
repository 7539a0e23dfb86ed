use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::common::{FrameId, PageId, Result, DEFAULT_BUCKET_SIZE, PAGE_SIZE};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Pool state shared with the page guards so a guard drop can unpin.
///
/// The free-list mutex doubles as the pool latch: every frame-state
/// transition happens while it is held, which keeps the page table, the
/// replacer and the frame metadata mutually consistent.
pub(crate) struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    free_list: Mutex<VecDeque<FrameId>>,
    replacer: LruKReplacer,
}

impl PoolState {
    /// Unpins a page, OR-ing the dirty flag. Fails if the page is not
    /// resident or its pin count is already zero.
    pub(crate) fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _latch = self.free_list.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }
}

/// BufferPoolManager mediates all access to disk pages through a bounded
/// frame cache. Pages are pinned while in use, written back when evicted
/// dirty, and replaced under the LRU-K policy. The pool owns the page-id
/// counter; ids are handed out monotonically and never reused.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    next_page_id: AtomicI32,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over the given disk manager,
    /// with an LRU-K replacer of the given `k`.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            frames,
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            free_list: Mutex::new(free_list),
            replacer: LruKReplacer::new(replacer_k, pool_size),
        });

        Self {
            pool_size,
            state,
            next_page_id: AtomicI32::new(0),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page and returns it pinned for writing.
    /// Returns `Ok(None)` when every frame is pinned.
    pub fn new_page(&self) -> Result<Option<WritePageGuard>> {
        let frame_id = {
            let mut free_list = self.state.free_list.lock();
            let Some(frame_id) = self.acquire_frame(&mut free_list)? else {
                return Ok(None);
            };

            let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.set_page_id(page_id);
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            self.state.page_table.insert(page_id, frame_id);
            frame_id
        };

        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let page_id = frame.page_id();
        // Safety: the page was pinned above, so the frame stays resident.
        let guard = unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) };
        Ok(Some(guard))
    }

    /// Fetches a page for shared read access.
    /// Returns `Ok(None)` when the page is absent and no frame can be freed.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        // Safety: fetch_frame pinned the page.
        let guard = unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) };
        Ok(Some(guard))
    }

    /// Fetches a page for exclusive write access.
    /// Returns `Ok(None)` when the page is absent and no frame can be freed.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        // Safety: fetch_frame pinned the page.
        let guard = unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) };
        Ok(Some(guard))
    }

    /// Unpins a page, OR-ing the dirty flag into the frame. Returns false
    /// if the page is not resident or was not pinned. Guards call this on
    /// drop; it is public for callers that manage pins by hand.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes a resident page's bytes to disk. Returns false when the page
    /// is not resident. The dirty flag is left as-is, so the page may be
    /// written once more at eviction.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        // Pin to keep the frame resident while writing outside the latch;
        // copying under the latch would block against a live write guard.
        let frame = {
            let _latch = self.state.free_list.lock();
            let Some(frame_id) = self.state.page_table.find(&page_id) else {
                return Ok(false);
            };
            let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
            frame.pin();
            self.state.replacer.set_evictable(frame_id, false);
            frame
        };

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        let result = self.disk_scheduler.schedule_write_sync(page_id, &data);
        self.state.unpin(page_id, false);
        result?;

        Ok(true)
    }

    /// Writes every resident page to disk, dirty or not.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageId> = {
            let _latch = self.state.free_list.lock();
            self.state
                .frames
                .iter()
                .map(|f| f.page_id())
                .filter(|pid| pid.is_valid())
                .collect()
        };

        for page_id in resident {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the pool. A page that is not resident is already
    /// gone (returns true); a pinned page cannot be deleted (returns
    /// false). The disk block is not reclaimed and the id is never reused.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut free_list = self.state.free_list.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return true;
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return false;
        }

        self.state.replacer.remove(frame_id);
        self.state.page_table.remove(&page_id);
        frame.reset();
        free_list.push_back(frame_id);
        debug!("deleted {} from frame {}", page_id, frame_id);
        true
    }

    /// Pin count of a resident page, None when not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _latch = self.state.free_list.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|fid| self.state.frames[fid.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    /// Pins the frame holding `page_id`, reading it from disk on a miss.
    /// Returns `Ok(None)` when no frame is free or evictable.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<FrameId>> {
        let mut free_list = self.state.free_list.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.acquire_frame(&mut free_list)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;
        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Some(frame_id))
    }

    /// Takes a frame off the free list, or evicts a victim (writing it
    /// back first if dirty) and returns it reset.
    fn acquire_frame(&self, free_list: &mut MutexGuard<'_, VecDeque<FrameId>>) -> Result<Option<FrameId>> {
        if let Some(frame_id) = free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
            debug!("wrote back dirty {} from frame {}", old_page_id, frame_id);
        }

        self.state.page_table.remove(&old_page_id);
        frame.reset();
        Ok(Some(frame_id))
    }
}
