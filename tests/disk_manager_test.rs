//! Integration tests for the disk manager

use std::sync::Arc;
use std::thread;

use stratum::common::{PageId, PAGE_SIZE};
use stratum::storage::disk::{DiskManager, DiskScheduler};
use tempfile::NamedTempFile;

#[test]
fn test_disk_manager_write_read_cycle() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 0..8u8 {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i;
        data[PAGE_SIZE - 1] = i;
        dm.write_page(PageId::new(i as i32), &data).unwrap();
    }

    for i in 0..8u8 {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(i as i32), &mut data).unwrap();
        assert_eq!(data[0], i);
        assert_eq!(data[PAGE_SIZE - 1], i);
    }
}

#[test]
fn test_disk_manager_sparse_page_reads_zeros() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    // Write page 5, leaving 0..5 sparse.
    let data = [9u8; PAGE_SIZE];
    dm.write_page(PageId::new(5), &data).unwrap();

    let mut hole = [1u8; PAGE_SIZE];
    dm.read_page(PageId::new(2), &mut hole).unwrap();
    assert!(hole.iter().all(|b| *b == 0));
}

#[test]
fn test_disk_manager_concurrent_distinct_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let dm = Arc::clone(&dm);
            thread::spawn(move || {
                for i in 0..8 {
                    let page_id = PageId::new(t * 8 + i);
                    let mut data = [0u8; PAGE_SIZE];
                    data[0] = (t * 8 + i) as u8;
                    dm.write_page(page_id, &data).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for n in 0..32 {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(n), &mut data).unwrap();
        assert_eq!(data[0], n as u8);
    }
}

#[test]
fn test_disk_scheduler_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = DiskScheduler::new(dm);

    let mut write_data = [0u8; PAGE_SIZE];
    write_data[10] = 0xCC;
    scheduler
        .schedule_write_sync(PageId::new(2), &write_data)
        .unwrap();

    let mut read_data = [0u8; PAGE_SIZE];
    scheduler
        .schedule_read_sync(PageId::new(2), &mut read_data)
        .unwrap();
    assert_eq!(read_data[10], 0xCC);
}
