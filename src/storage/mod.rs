//! Storage layer - file I/O and page formats.
//!
//! This module handles persistent storage:
//! - [`PageStore`] - Page I/O, allocation and the free list
//! - [`FileHeader`] - Tree metadata in page 0
//! - [`page`] - Page types and layouts

mod file_header;
pub mod page;
mod page_store;
mod stats;

pub use file_header::FileHeader;
pub use page_store::PageStore;
pub use stats::{PageStoreStats, StatsSnapshot};
