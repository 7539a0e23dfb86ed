use std::sync::Arc;

use stratum::buffer::BufferPoolManager;
use stratum::common::{PageId, RecordId, SlotId, Transaction};
use stratum::index::{BPlusTree, IntegerComparator};
use stratum::storage::disk::DiskManager;

fn main() {
    env_logger::init();

    println!("Stratum - storage and indexing core");
    println!("===================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool with 16 frames\n");

    // Page 0 is the header page; make sure it exists before the index.
    {
        let header = bpm.new_page().expect("I/O error").expect("pool full");
        assert_eq!(header.page_id(), PageId::new(0));
    }

    let txn = Transaction::default();
    let mut index = BPlusTree::new("demo", Arc::clone(&bpm), Arc::new(IntegerComparator), 4, 3)
        .expect("failed to open index");

    for key in 1..=10u64 {
        let rid = RecordId::new(PageId::new(100), SlotId::new(key as u16));
        index.insert(key, rid, &txn).expect("insert failed");
    }
    println!("Inserted keys 1..=10, root is {}", index.root_page_id());

    let value = index.get_value(7, &txn).expect("lookup failed");
    println!("get_value(7) -> {:?}", value);

    print!("scan:");
    let mut iter = index.begin().expect("iterator failed");
    while let Some((key, _)) = iter.next().expect("scan failed") {
        print!(" {}", key);
    }
    println!();

    bpm.flush_all_pages().expect("flush failed");
    println!("\nFlushed all pages to {}", db_path);
}
