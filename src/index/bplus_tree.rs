use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    PageId, RecordId, Result, StratumError, Transaction, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::{HeaderPageMut, HeaderPageRef};

use super::index_iterator::IndexIterator;
use super::key_comparator::{IndexKey, KeyComparator};
use super::tree_page::{TreePageMut, TreePageRef, INTERNAL_CAPACITY, LEAF_CAPACITY};

/// B+ tree index over the buffer pool.
///
/// Unique 64-bit keys ordered by an injected comparator map to record ids.
/// Nodes live in pages fetched through the pool; parent/child links are
/// page ids, never pointers. The tree records its root under its index
/// name in the header page (page 0), which must already be allocated, and
/// adopts a previously recorded root on construction.
///
/// The tree itself is single-writer: it holds no tree-level latch and
/// relies on the pool's latching only for frame consistency.
pub struct BPlusTree {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(
            (2..=LEAF_CAPACITY).contains(&leaf_max_size),
            "leaf_max_size out of range"
        );
        assert!(
            (3..=INTERNAL_CAPACITY).contains(&internal_max_size),
            "internal_max_size out of range"
        );

        let index_name = name.into();
        let root_page_id = {
            let guard = Self::fetch_read_from(&bpm, HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_root_id(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_name,
            root_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    /// Point lookup. `Ok(None)` when the key is absent.
    pub fn get_value(&self, key: IndexKey, _txn: &Transaction) -> Result<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_pid = self.find_leaf(key)?;
        let guard = self.fetch_read(leaf_pid)?;
        let node = TreePageRef::new(guard.data());
        Ok(node
            .find_key(key, &*self.comparator)
            .map(|pos| node.value_at(pos)))
    }

    /// Inserts a key/value pair. Returns false on a duplicate key.
    pub fn insert(&mut self, key: IndexKey, value: RecordId, _txn: &Transaction) -> Result<bool> {
        if self.is_empty() {
            return self.start_new_tree(key, value);
        }

        let leaf_pid = self.find_leaf(key)?;
        let (separator, new_pid, parent_pid) = {
            let mut guard = self.fetch_write(leaf_pid)?;
            let mut node = TreePageMut::new(guard.data_mut());
            if !node.leaf_insert(key, value, &*self.comparator) {
                return Ok(false);
            }
            if node.size() < node.max_size() {
                return Ok(true);
            }

            // Full leaf: move the upper half into a fresh sibling and
            // relink the chain.
            let mid = node.max_size() / 2;
            let parent_pid = node.parent_page_id();
            let old_next = node.next_page_id();
            let moved = node.leaf_split_off(mid);

            let mut new_guard = self.new_tree_page()?;
            let new_pid = new_guard.page_id();
            let mut new_node = TreePageMut::new(new_guard.data_mut());
            new_node.init_leaf(new_pid, parent_pid, self.leaf_max_size);
            new_node.leaf_extend(&moved);
            new_node.set_next_page_id(old_next);
            node.set_next_page_id(new_pid);

            (moved[0].0, new_pid, parent_pid)
        };

        self.insert_into_parent(leaf_pid, separator, new_pid, parent_pid)?;
        Ok(true)
    }

    /// Removes a key. Missing keys are a no-op.
    pub fn remove(&mut self, key: IndexKey, _txn: &Transaction) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let leaf_pid = self.find_leaf(key)?;
        self.delete_entry(key, leaf_pid)
    }

    /// Iterator over the whole tree in ascending key order.
    pub fn begin(&self) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::new(
                Arc::clone(&self.bpm),
                INVALID_PAGE_ID,
                0,
            ));
        }
        let leaf_pid = self.find_edge_leaf(true)?;
        Ok(IndexIterator::new(Arc::clone(&self.bpm), leaf_pid, 0))
    }

    /// Iterator positioned at the first key `>= key`.
    pub fn begin_at(&self, key: IndexKey) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::new(
                Arc::clone(&self.bpm),
                INVALID_PAGE_ID,
                0,
            ));
        }
        let leaf_pid = self.find_leaf(key)?;
        let pos = {
            let guard = self.fetch_read(leaf_pid)?;
            TreePageRef::new(guard.data()).lower_bound(key, &*self.comparator)
        };
        Ok(IndexIterator::new(Arc::clone(&self.bpm), leaf_pid, pos))
    }

    /// Iterator past the last element of the rightmost leaf.
    pub fn end(&self) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::new(
                Arc::clone(&self.bpm),
                INVALID_PAGE_ID,
                0,
            ));
        }
        let leaf_pid = self.find_edge_leaf(false)?;
        let size = {
            let guard = self.fetch_read(leaf_pid)?;
            TreePageRef::new(guard.data()).size()
        };
        Ok(IndexIterator::new(Arc::clone(&self.bpm), leaf_pid, size))
    }

    fn start_new_tree(&mut self, key: IndexKey, value: RecordId) -> Result<bool> {
        let mut guard = self.new_tree_page()?;
        let root_pid = guard.page_id();
        let mut node = TreePageMut::new(guard.data_mut());
        node.init_leaf(root_pid, INVALID_PAGE_ID, self.leaf_max_size);
        node.leaf_insert(key, value, &*self.comparator);
        drop(guard);

        self.root_page_id = root_pid;
        self.update_root_page_id(true)?;
        debug!("index {} rooted at {}", self.index_name, root_pid);
        Ok(true)
    }

    /// Descends to the leaf that owns `key`.
    fn find_leaf(&self, key: IndexKey) -> Result<PageId> {
        let mut pid = self.root_page_id;
        loop {
            let next = {
                let guard = self.fetch_read(pid)?;
                let node = TreePageRef::new(guard.data());
                if node.is_leaf() {
                    return Ok(pid);
                }
                node.find_child(key, &*self.comparator)
            };
            pid = next;
        }
    }

    /// Descends to the leftmost (or rightmost) leaf.
    fn find_edge_leaf(&self, leftmost: bool) -> Result<PageId> {
        let mut pid = self.root_page_id;
        loop {
            let next = {
                let guard = self.fetch_read(pid)?;
                let node = TreePageRef::new(guard.data());
                if node.is_leaf() {
                    return Ok(pid);
                }
                if leftmost {
                    node.child_at(0)
                } else {
                    node.child_at(node.size() - 1)
                }
            };
            pid = next;
        }
    }

    /// Hooks a freshly split-off node into the tree above `old_pid`.
    fn insert_into_parent(
        &mut self,
        old_pid: PageId,
        separator: IndexKey,
        new_pid: PageId,
        parent_pid: PageId,
    ) -> Result<()> {
        if !parent_pid.is_valid() {
            // The old node was the root: grow a new root above the pair.
            let mut root_guard = self.new_tree_page()?;
            let root_pid = root_guard.page_id();
            let mut root = TreePageMut::new(root_guard.data_mut());
            root.init_internal(root_pid, INVALID_PAGE_ID, self.internal_max_size);
            root.internal_populate_root(old_pid, separator, new_pid);
            drop(root_guard);

            for pid in [old_pid, new_pid] {
                let mut guard = self.fetch_write(pid)?;
                TreePageMut::new(guard.data_mut()).set_parent_page_id(root_pid);
            }

            self.root_page_id = root_pid;
            self.update_root_page_id(false)?;
            debug!("index {} grew new root {}", self.index_name, root_pid);
            return Ok(());
        }

        let needs_split = {
            let mut guard = self.fetch_write(parent_pid)?;
            let mut parent = TreePageMut::new(guard.data_mut());
            let idx = parent.child_index_of(old_pid).ok_or_else(|| {
                StratumError::IndexCorrupted(format!("{} missing from parent {}", old_pid, parent_pid))
            })?;
            parent.internal_insert_at(idx + 1, separator, new_pid);
            parent.size() == parent.max_size() + 1
        };

        if needs_split {
            self.split_internal(parent_pid)?;
        }
        Ok(())
    }

    /// Splits an over-full internal node (`size == max_size + 1`).
    fn split_internal(&mut self, pid: PageId) -> Result<()> {
        let (separator, moved, parent_pid) = {
            let mut guard = self.fetch_write(pid)?;
            let mut node = TreePageMut::new(guard.data_mut());
            let min = node.min_size();
            let parent_pid = node.parent_page_id();
            let moved = node.internal_split_off(min);
            (moved[0].0, moved, parent_pid)
        };

        let new_pid = {
            let mut guard = self.new_tree_page()?;
            let new_pid = guard.page_id();
            let mut node = TreePageMut::new(guard.data_mut());
            node.init_internal(new_pid, parent_pid, self.internal_max_size);
            node.internal_extend(&moved);
            new_pid
        };

        // Moved subtrees hang off the new node now.
        for (_, child) in &moved {
            let mut guard = self.fetch_write(*child)?;
            TreePageMut::new(guard.data_mut()).set_parent_page_id(new_pid);
        }

        self.insert_into_parent(pid, separator, new_pid, parent_pid)
    }

    /// Removes `key` from the node and rebalances upward as needed.
    fn delete_entry(&mut self, key: IndexKey, pid: PageId) -> Result<()> {
        let (is_leaf, size, min_size, max_size, parent_pid) = {
            let mut guard = self.fetch_write(pid)?;
            let mut node = TreePageMut::new(guard.data_mut());
            let removed = if node.is_leaf() {
                node.leaf_remove(key, &*self.comparator)
            } else {
                node.internal_remove(key, &*self.comparator)
            };
            if !removed {
                return Ok(());
            }
            (
                node.is_leaf(),
                node.size(),
                node.min_size(),
                node.max_size(),
                node.parent_page_id(),
            )
        };

        if pid == self.root_page_id {
            if !is_leaf && size == 1 {
                self.promote_root_child(pid)?;
            }
            return Ok(());
        }

        if size >= min_size {
            return Ok(());
        }
        self.rebalance(pid, size, max_size, parent_pid)
    }

    /// Collapses a single-child internal root onto that child.
    fn promote_root_child(&mut self, root_pid: PageId) -> Result<()> {
        let child_pid = {
            let guard = self.fetch_read(root_pid)?;
            TreePageRef::new(guard.data()).child_at(0)
        };
        {
            let mut guard = self.fetch_write(child_pid)?;
            TreePageMut::new(guard.data_mut()).set_parent_page_id(INVALID_PAGE_ID);
        }
        self.root_page_id = child_pid;
        self.update_root_page_id(false)?;
        self.bpm.delete_page(root_pid);
        debug!("index {} root collapsed to {}", self.index_name, child_pid);
        Ok(())
    }

    /// Resolves an underflow by merging with or borrowing from a sibling.
    /// The left sibling is preferred when both exist.
    fn rebalance(
        &mut self,
        pid: PageId,
        size: usize,
        max_size: usize,
        parent_pid: PageId,
    ) -> Result<()> {
        let (idx, left_pid, right_pid) = {
            let guard = self.fetch_read(parent_pid)?;
            let parent = TreePageRef::new(guard.data());
            let idx = parent.child_index_of(pid).ok_or_else(|| {
                StratumError::IndexCorrupted(format!("{} missing from parent {}", pid, parent_pid))
            })?;
            let left = (idx > 0).then(|| parent.child_at(idx - 1));
            let right = (idx + 1 < parent.size()).then(|| parent.child_at(idx + 1));
            (idx, left, right)
        };

        if let Some(left_pid) = left_pid {
            let left_size = {
                let guard = self.fetch_read(left_pid)?;
                TreePageRef::new(guard.data()).size()
            };
            if size + left_size < max_size {
                self.merge(left_pid, pid, parent_pid)
            } else {
                self.borrow_from_left(left_pid, pid, idx, parent_pid)
            }
        } else if let Some(right_pid) = right_pid {
            let right_size = {
                let guard = self.fetch_read(right_pid)?;
                TreePageRef::new(guard.data()).size()
            };
            if size + right_size < max_size {
                self.merge(pid, right_pid, parent_pid)
            } else {
                self.borrow_from_right(pid, right_pid, idx + 1, parent_pid)
            }
        } else {
            // An only child has nobody to merge with or borrow from; it
            // stays under-full until the tree around it changes.
            Ok(())
        }
    }

    /// Folds `right_pid` into `left_pid` and deletes the separator from the
    /// parent, cascading the underflow check upward.
    fn merge(&mut self, left_pid: PageId, right_pid: PageId, parent_pid: PageId) -> Result<()> {
        let separator = {
            let guard = self.fetch_read(parent_pid)?;
            let parent = TreePageRef::new(guard.data());
            let idx = parent.child_index_of(right_pid).ok_or_else(|| {
                StratumError::IndexCorrupted(format!(
                    "{} missing from parent {}",
                    right_pid, parent_pid
                ))
            })?;
            parent.key_at(idx)
        };

        let moved_children = {
            let mut left_guard = self.fetch_write(left_pid)?;
            let mut right_guard = self.fetch_write(right_pid)?;
            let mut left = TreePageMut::new(left_guard.data_mut());
            let mut right = TreePageMut::new(right_guard.data_mut());

            if left.is_leaf() {
                let pairs = right.leaf_split_off(0);
                left.leaf_extend(&pairs);
                left.set_next_page_id(right.next_page_id());
                Vec::new()
            } else {
                // The right node's slot-0 key is unused; the true lower
                // bound of that subtree is the parent separator.
                let mut entries = right.internal_split_off(0);
                entries[0].0 = separator;
                left.internal_extend(&entries);
                entries.into_iter().map(|(_, child)| child).collect()
            }
        };

        for child in moved_children {
            let mut guard = self.fetch_write(child)?;
            TreePageMut::new(guard.data_mut()).set_parent_page_id(left_pid);
        }

        self.bpm.delete_page(right_pid);
        self.delete_entry(separator, parent_pid)
    }

    /// Moves the left sibling's last entry into the head of `pid`.
    fn borrow_from_left(
        &mut self,
        left_pid: PageId,
        pid: PageId,
        node_idx: usize,
        parent_pid: PageId,
    ) -> Result<()> {
        let moved_child = {
            let mut left_guard = self.fetch_write(left_pid)?;
            let mut node_guard = self.fetch_write(pid)?;
            let mut parent_guard = self.fetch_write(parent_pid)?;
            let mut left = TreePageMut::new(left_guard.data_mut());
            let mut node = TreePageMut::new(node_guard.data_mut());
            let mut parent = TreePageMut::new(parent_guard.data_mut());

            if node.is_leaf() {
                let (key, value) = left.leaf_pop_back();
                node.leaf_insert_front(key, value);
                parent.set_key_at(node_idx, key);
                None
            } else {
                let old_separator = parent.key_at(node_idx);
                let last = left.size() - 1;
                let (key, child) = (left.key_at(last), left.child_at(last));
                left.internal_remove_at(last);
                node.internal_insert_at(0, key, child);
                // The shifted-down first entry now needs its real lower
                // bound, which was the old separator.
                node.set_key_at(1, old_separator);
                parent.set_key_at(node_idx, key);
                Some(child)
            }
        };

        if let Some(child) = moved_child {
            let mut guard = self.fetch_write(child)?;
            TreePageMut::new(guard.data_mut()).set_parent_page_id(pid);
        }
        Ok(())
    }

    /// Moves the right sibling's first entry onto the tail of `pid`.
    fn borrow_from_right(
        &mut self,
        pid: PageId,
        right_pid: PageId,
        right_idx: usize,
        parent_pid: PageId,
    ) -> Result<()> {
        let moved_child = {
            let mut node_guard = self.fetch_write(pid)?;
            let mut right_guard = self.fetch_write(right_pid)?;
            let mut parent_guard = self.fetch_write(parent_pid)?;
            let mut node = TreePageMut::new(node_guard.data_mut());
            let mut right = TreePageMut::new(right_guard.data_mut());
            let mut parent = TreePageMut::new(parent_guard.data_mut());

            if node.is_leaf() {
                let key = right.key_at(0);
                let value = right.value_at(0);
                right.leaf_remove_at(0);
                node.leaf_extend(&[(key, value)]);
                parent.set_key_at(right_idx, right.key_at(0));
                None
            } else {
                let separator = parent.key_at(right_idx);
                let child = right.child_at(0);
                let next_separator = right.key_at(1);
                right.internal_remove_at(0);
                let node_size = node.size();
                node.internal_insert_at(node_size, separator, child);
                parent.set_key_at(right_idx, next_separator);
                Some(child)
            }
        };

        if let Some(child) = moved_child {
            let mut guard = self.fetch_write(child)?;
            TreePageMut::new(guard.data_mut()).set_parent_page_id(pid);
        }
        Ok(())
    }

    /// Records the current root under the index name in the header page:
    /// a new record on first growth, an update on every later root change.
    fn update_root_page_id(&self, insert: bool) -> Result<()> {
        let mut guard = self.fetch_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPageMut::new(guard.data_mut());
        let ok = if insert {
            header.insert_record(&self.index_name, self.root_page_id)
        } else {
            header.update_record(&self.index_name, self.root_page_id)
        };
        if !ok {
            return Err(if insert {
                StratumError::HeaderFull
            } else {
                StratumError::IndexCorrupted(format!(
                    "no header record for index {}",
                    self.index_name
                ))
            });
        }
        Ok(())
    }

    fn fetch_read(&self, pid: PageId) -> Result<ReadPageGuard> {
        Self::fetch_read_from(&self.bpm, pid)
    }

    fn fetch_read_from(bpm: &BufferPoolManager, pid: PageId) -> Result<ReadPageGuard> {
        bpm.fetch_page_read(pid)?
            .ok_or(StratumError::PoolExhausted(pid))
    }

    fn fetch_write(&self, pid: PageId) -> Result<WritePageGuard> {
        self.bpm
            .fetch_page_write(pid)?
            .ok_or(StratumError::PoolExhausted(pid))
    }

    fn new_tree_page(&self) -> Result<WritePageGuard> {
        self.bpm
            .new_page()?
            .ok_or(StratumError::PoolExhausted(INVALID_PAGE_ID))
    }
}
