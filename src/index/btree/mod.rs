//! Disk-resident B+-tree.
//!
//! # Components
//! - [`BPlusTree`] - The tree handle: open, lookup, insert, delete
//! - [`KeyComparator`] - Key ordering, fingerprinted in the file header
//! - [`Iter`] - In-order traversal along the leaf chain
//! - [`TreeReport`] - Result of a structural check
//! - [`SharedBPlusTree`] - Mutex-guarded handle for use across threads
//!
//! Values live only in leaves. Internal nodes hold separator keys, each an
//! inclusive lower bound of the subtree to its right. Leaves are doubly
//! linked in key order. No node stores a parent link; mutations keep the
//! root-to-leaf path in memory and walk it back up.

mod check;
mod comparator;
mod delete;
mod insert;
mod iter;
pub(crate) mod node;
mod search;
mod shared;
mod tree;

pub use check::TreeReport;
pub use comparator::{BytewiseComparator, KeyComparator};
pub use iter::Iter;
pub use shared::SharedBPlusTree;
pub use tree::BPlusTree;
