//! Integration tests for the LRU-K replacer

use stratum::buffer::LruKReplacer;
use stratum::common::FrameId;

#[test]
fn test_lru_k_fifo_then_lru_order() {
    // Accesses 1,2,3,1,2 with k=2: frames 1 and 2 reach two hits and move
    // to the LRU queue in that order; frame 3 stays in FIFO.
    let replacer = LruKReplacer::new(2, 10);

    for id in [1u32, 2, 3, 1, 2] {
        replacer.record_access(FrameId::new(id));
    }
    for id in 1..=3 {
        replacer.set_evictable(FrameId::new(id), true);
    }
    assert_eq!(replacer.size(), 3);

    assert_eq!(replacer.evict(), Some(FrameId::new(3)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_lru_k_eviction_in_arrival_order() {
    let replacer = LruKReplacer::new(2, 10);

    for i in 0..5 {
        replacer.record_access(FrameId::new(i));
        replacer.set_evictable(FrameId::new(i), true);
    }
    assert_eq!(replacer.size(), 5);

    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(FrameId::new(i)));
    }
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_reaccess_moves_to_tail() {
    let replacer = LruKReplacer::new(2, 10);

    // All three frames reach the LRU class.
    for i in 0..3 {
        replacer.record_access(FrameId::new(i));
        replacer.record_access(FrameId::new(i));
    }
    // Accesses beyond k keep moving the frame to the tail.
    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn test_lru_k_pinned_frames_not_evicted() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));

    replacer.set_evictable(FrameId::new(1), true);
    replacer.set_evictable(FrameId::new(2), true);

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_toggle_does_not_reorder() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    // Toggling frame 0 off and on keeps its FIFO position at the head.
    replacer.set_evictable(FrameId::new(0), false);
    replacer.set_evictable(FrameId::new(0), true);

    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn test_lru_k_remove() {
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
fn test_lru_k_concurrent_access() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruKReplacer::new(2, 100));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    let frame_id = FrameId::new((t * 25 + i) as u32);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);
    for _ in 0..100 {
        assert!(replacer.evict().is_some());
    }
    assert_eq!(replacer.size(), 0);
}
