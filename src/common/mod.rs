//! Common types and utilities shared across btreedb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`TreeOptions`]
//! - Error types
//! - Page identifiers

pub mod config;
pub mod error;
mod page_id;

pub use config::TreeOptions;
pub use error::{Error, Result};
pub use page_id::PageId;
