use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::FrameId;

struct FrameEntry {
    /// Access count, clamped at k.
    hits: usize,
    evictable: bool,
}

struct ReplacerInner {
    entries: HashMap<FrameId, FrameEntry>,
    /// Frames with fewer than k accesses, in first-insertion order.
    fifo: VecDeque<FrameId>,
    /// Frames with at least k accesses; most recently referenced at the tail.
    lru: VecDeque<FrameId>,
    /// Number of tracked frames currently evictable.
    curr_size: usize,
}

/// LRU-K replacement policy.
///
/// Frames whose access history is shorter than k live in a FIFO queue in
/// arrival order; a frame's k-th access promotes it to the LRU queue, and
/// every access after that moves it to the LRU tail. Eviction prefers the
/// FIFO queue (history too short to estimate a backward k-distance), then
/// takes the least recently used frame from the LRU queue. Only frames
/// marked evictable are candidates.
pub struct LruKReplacer {
    k: usize,
    /// Frames at or beyond this index are ignored.
    max_frames: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            max_frames,
            inner: Mutex::new(ReplacerInner {
                entries: HashMap::new(),
                fifo: VecDeque::new(),
                lru: VecDeque::new(),
                curr_size: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance: the first
    /// evictable frame in FIFO order, else the least recently used frame of
    /// the >= k class. The victim is dropped from tracking entirely.
    pub fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let victim = inner
            .fifo
            .iter()
            .position(|f| inner.entries[f].evictable)
            .map(|pos| (true, pos))
            .or_else(|| {
                inner
                    .lru
                    .iter()
                    .position(|f| inner.entries[f].evictable)
                    .map(|pos| (false, pos))
            });

        let (in_fifo, pos) = victim?;
        let frame_id = if in_fifo {
            inner.fifo.remove(pos).unwrap()
        } else {
            inner.lru.remove(pos).unwrap()
        };
        inner.entries.remove(&frame_id);
        inner.curr_size -= 1;
        Some(frame_id)
    }

    /// Records an access to the given frame, promoting it from FIFO to LRU
    /// on its k-th access. A frame starts non-evictable; the buffer pool
    /// flips the flag when its pin count reaches zero.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let entry = inner.entries.entry(frame_id).or_insert(FrameEntry {
            hits: 0,
            evictable: false,
        });
        entry.hits = (entry.hits + 1).min(self.k);
        let hits = entry.hits;

        if hits < self.k {
            // Arrival order only: a repeat access below k does not reorder.
            if !inner.fifo.contains(&frame_id) {
                inner.fifo.push_back(frame_id);
            }
        } else {
            // k-th access promotes; later accesses move to the tail.
            if let Some(pos) = inner.fifo.iter().position(|f| *f == frame_id) {
                inner.fifo.remove(pos);
            } else if let Some(pos) = inner.lru.iter().position(|f| *f == frame_id) {
                inner.lru.remove(pos);
            }
            inner.lru.push_back(frame_id);
        }
    }

    /// Sets whether a frame may be chosen as a victim. Queue position is
    /// unaffected. Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(entry) = inner.entries.get_mut(&frame_id) {
            if entry.evictable != evictable {
                entry.evictable = evictable;
                if evictable {
                    inner.curr_size += 1;
                } else {
                    inner.curr_size -= 1;
                }
            }
        }
    }

    /// Drops a frame from tracking. Only currently-evictable frames are
    /// removed; the buffer pool guarantees it never removes a pinned frame.
    pub fn remove(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let hits = match inner.entries.get(&frame_id) {
            Some(entry) if entry.evictable => entry.hits,
            _ => return,
        };

        if hits < self.k {
            if let Some(pos) = inner.fifo.iter().position(|f| *f == frame_id) {
                inner.fifo.remove(pos);
            }
        } else if let Some(pos) = inner.lru.iter().position(|f| *f == frame_id) {
            inner.lru.remove(pos);
        }
        inner.entries.remove(&frame_id);
        inner.curr_size -= 1;
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().curr_size
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacer_new() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_replacer_fifo_before_lru() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0 reaches k accesses, frame 1 does not.
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // The short-history frame goes first.
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_replacer_fifo_arrival_order_stable() {
        let replacer = LruKReplacer::new(3, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));
        // A second access below k must not reorder the FIFO queue.
        replacer.record_access(FrameId::new(0));

        for i in 0..3 {
            replacer.set_evictable(FrameId::new(i), true);
        }

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_replacer_lru_order() {
        let replacer = LruKReplacer::new(2, 10);

        for i in 0..3 {
            replacer.record_access(FrameId::new(i));
            replacer.record_access(FrameId::new(i));
        }
        // Touch frame 0 again: it moves to the LRU tail.
        replacer.record_access(FrameId::new(0));

        for i in 0..3 {
            replacer.set_evictable(FrameId::new(i), true);
        }

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_replacer_skips_non_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_replacer_toggle_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_replacer_remove() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        replacer.remove(FrameId::new(0));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_replacer_remove_non_evictable_is_noop() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.remove(FrameId::new(0));

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_replacer_out_of_range_ignored() {
        let replacer = LruKReplacer::new(2, 4);

        replacer.record_access(FrameId::new(9));
        replacer.set_evictable(FrameId::new(9), true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }
}
