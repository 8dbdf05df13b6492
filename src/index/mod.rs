//! Index structures.

pub mod btree;

pub use btree::{BPlusTree, BytewiseComparator, Iter, KeyComparator, SharedBPlusTree, TreeReport};
