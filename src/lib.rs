//! Stratum - the storage and indexing core of a disk-resident RDBMS
//!
//! The crate turns a fixed-size array of in-memory frames backed by a
//! block-addressed disk file into an indexed, concurrent key/value
//! substrate for the query layers above it.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): block I/O and reserved pages
//!   - `DiskManager`: reads and writes fixed-size blocks of the database file
//!   - `DiskScheduler`: background worker thread that performs the I/O
//!   - `HeaderPageRef`/`HeaderPageMut`: page-0 records mapping index names
//!     to root page ids
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: caches pages in frames, pins them while in use
//!     and writes dirty victims back on eviction
//!   - `LruKReplacer`: LRU-K eviction policy over unpinned frames
//!   - `FrameHeader`: per-frame metadata and data storage
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pins over frame bytes
//!
//! - **Containers** (`container`): `ExtendibleHashTable`, the pool's
//!   page table (`page_id -> frame_id`)
//!
//! - **Index** (`index`): `BPlusTree` over the buffer pool with a
//!   leaf-chain `IndexIterator` and injected key comparators
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratum::buffer::BufferPoolManager;
//! use stratum::common::{RecordId, PageId, SlotId, Transaction};
//! use stratum::index::{BPlusTree, IntegerComparator};
//! use stratum::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! // Page 0 is the header page; allocate it before the first index.
//! let header = bpm.new_page().unwrap().unwrap();
//! drop(header);
//!
//! let txn = Transaction::default();
//! let mut index =
//!     BPlusTree::new("orders", bpm, Arc::new(IntegerComparator), 128, 128).unwrap();
//! index
//!     .insert(42, RecordId::new(PageId::new(7), SlotId::new(0)), &txn)
//!     .unwrap();
//! assert!(index.get_value(42, &txn).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StratumError};
