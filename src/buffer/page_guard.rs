use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::FrameHeader;

/// RAII guard for read access to a pinned page.
///
/// Holding the guard holds the pin: the frame cannot be evicted or deleted
/// until the guard drops, at which point the page is unpinned (clean).
pub struct ReadPageGuard {
    page_id: PageId,
    state: Arc<PoolState>,
    /// Keeps the frame alive for the transmuted lock guard below.
    _frame: Arc<FrameHeader>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The caller must have pinned the page in `state` so the frame stays
    /// resident for the guard's lifetime.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, state: Arc<PoolState>) -> Self {
        let data_guard = frame.data.read();
        // The guard's borrow of the frame is re-tied to the Arc held in
        // `_frame`, which outlives it.
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            state,
            _frame: frame,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the data lock before unpinning.
        self.data_guard.take();
        self.state.unpin(self.page_id, false);
    }
}

/// RAII guard for write access to a pinned page.
///
/// Taking a mutable view of the bytes marks the page dirty; the drop
/// reports the dirty bit to the pool along with the unpin.
pub struct WritePageGuard {
    page_id: PageId,
    state: Arc<PoolState>,
    _frame: Arc<FrameHeader>,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// The caller must have pinned the page in `state` so the frame stays
    /// resident for the guard's lifetime.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<FrameHeader>, state: Arc<PoolState>) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            state,
            _frame: frame,
            data_guard: Some(data_guard),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.state.unpin(self.page_id, self.is_dirty);
    }
}
