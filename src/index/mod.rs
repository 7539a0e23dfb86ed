pub mod bplus_tree;
pub mod index_iterator;
pub mod key_comparator;
pub mod tree_page;

pub use bplus_tree::BPlusTree;
pub use index_iterator::IndexIterator;
pub use key_comparator::{IndexKey, IntegerComparator, KeyComparator, SignedComparator};
pub use tree_page::{PageKind, TreePageMut, TreePageRef};
