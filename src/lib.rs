//! btreedb - An on-disk B+-tree index over fixed-size pages.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            btreedb                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Tree Handle (index/btree/)                  │   │
//! │  │   open → get / put / delete / iter / check → close       │   │
//! │  │          SharedBPlusTree (Mutex-guarded clone)           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                B+-Tree Engine (index/btree/)             │   │
//! │  │   descend + path stack │ split ↑ │ borrow / merge ↑      │   │
//! │  │          KeyComparator │ Node codec (leaf/internal)      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Storage Layer (storage/)                   │   │
//! │  │   PageStore: page I/O, allocate / free, free list        │   │
//! │  │   FileHeader (page 0) + Page + PageHeader (CRC32)        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │                    single file, N × page_size                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, config)
//! - [`storage`] - File I/O, page formats and page recycling
//! - [`index`] - The B+-tree
//!
//! # Quick Start
//! ```
//! use btreedb::{BPlusTree, Error, TreeOptions};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("quick.db");
//!
//! let mut tree = BPlusTree::open(&path, TreeOptions::default()).unwrap();
//! tree.put(b"hello", b"world").unwrap();
//! assert!(matches!(tree.put(b"hello", b"again"), Err(Error::KeyExists)));
//! tree.close().unwrap();
//!
//! let mut tree = BPlusTree::open(&path, TreeOptions::default()).unwrap();
//! assert_eq!(tree.get(b"hello").unwrap(), Some(b"world".to_vec()));
//! assert_eq!(tree.delete(b"hello").unwrap(), b"world".to_vec());
//! assert!(tree.is_empty());
//! ```

pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::DEFAULT_PAGE_SIZE;
pub use common::{Error, PageId, Result, TreeOptions};

pub use index::{BPlusTree, BytewiseComparator, Iter, KeyComparator, SharedBPlusTree, TreeReport};
pub use storage::{FileHeader, PageStore, PageStoreStats, StatsSnapshot};
