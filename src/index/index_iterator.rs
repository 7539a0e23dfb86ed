use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, StratumError};

use super::key_comparator::IndexKey;
use super::tree_page::TreePageRef;

/// Iterator over the leaf chain of a B+ tree, yielding `(key, record_id)`
/// pairs in ascending key order.
///
/// The position is `(leaf page id, slot)`; the past-the-end position is
/// one slot beyond the last pair of the rightmost leaf (an invalid page id
/// for an empty tree). Each step pins the current leaf only for the
/// duration of the read.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: PageId,
    pos: usize,
}

impl IndexIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, current_page_id: PageId, pos: usize) -> Self {
        Self {
            bpm,
            current_page_id,
            pos,
        }
    }

    /// Whether the iterator is past the last pair.
    pub fn is_end(&self) -> Result<bool> {
        if !self.current_page_id.is_valid() {
            return Ok(true);
        }
        let guard = self
            .bpm
            .fetch_page_read(self.current_page_id)?
            .ok_or(StratumError::PoolExhausted(self.current_page_id))?;
        let node = TreePageRef::new(guard.data());
        Ok(self.pos >= node.size() && !node.next_page_id().is_valid())
    }

    /// Yields the current pair and advances, following the sibling link
    /// across leaf boundaries. `Ok(None)` once past the end.
    pub fn next(&mut self) -> Result<Option<(IndexKey, RecordId)>> {
        loop {
            if !self.current_page_id.is_valid() {
                return Ok(None);
            }

            let (item, next_page) = {
                let guard = self
                    .bpm
                    .fetch_page_read(self.current_page_id)?
                    .ok_or(StratumError::PoolExhausted(self.current_page_id))?;
                let node = TreePageRef::new(guard.data());
                if self.pos < node.size() {
                    (
                        Some((node.key_at(self.pos), node.value_at(self.pos))),
                        node.next_page_id(),
                    )
                } else {
                    (None, node.next_page_id())
                }
            };

            if let Some(item) = item {
                self.pos += 1;
                return Ok(Some(item));
            }
            if !next_page.is_valid() {
                // Stay parked at the past-the-end position.
                return Ok(None);
            }
            self.current_page_id = next_page;
            self.pos = 0;
        }
    }
}

impl PartialEq for IndexIterator {
    fn eq(&self, other: &Self) -> bool {
        self.current_page_id == other.current_page_id && self.pos == other.pos
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match IndexIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
