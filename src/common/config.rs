//! Configuration constants and runtime options for btreedb.

use crate::common::{Error, Result};

/// Default size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems. The page size of a tree is
/// chosen when the file is created and cannot change afterwards.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest accepted page size.
pub const MIN_PAGE_SIZE: usize = 1024;

/// Largest accepted page size.
///
/// Node entry counts and key lengths are stored as `u16`, so a page must
/// stay addressable with 16-bit offsets.
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Default maximum key length in bytes.
pub const DEFAULT_MAX_KEY_SIZE: usize = 64;

/// Default maximum value length in bytes.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 64;

/// Smallest usable order. Below 3 a split cannot leave both halves at
/// minimum occupancy.
pub const MIN_ORDER: usize = 3;

/// Maximum number of pages with u32 PageId (`u32::MAX` is the sentinel).
pub const MAX_PAGES: u64 = u32::MAX as u64;

/// Magic bytes at the start of the file header.
pub const MAGIC: [u8; 8] = *b"BTREEDB\0";

/// On-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Runtime options for creating or opening a tree.
///
/// Page size, key/value limits and order only apply when a new file is
/// created. For an existing file the values stored in its header win, except
/// the page size, which must match.
///
/// # Example
/// ```
/// use btreedb::TreeOptions;
///
/// let options = TreeOptions::default()
///     .with_page_size(8192)
///     .with_max_key_size(16)
///     .with_max_value_size(8);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOptions {
    /// Page size in bytes. Power of two in `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`.
    pub page_size: usize,
    /// Maximum key length in bytes.
    pub max_key_size: usize,
    /// Maximum value length in bytes.
    pub max_value_size: usize,
    /// Upper bound on the order. `None` uses the full page capacity.
    pub max_order: Option<usize>,
    /// Call `fsync` after every page write.
    pub sync_on_write: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_order: None,
            sync_on_write: false,
        }
    }
}

impl TreeOptions {
    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the maximum key length.
    pub fn with_max_key_size(mut self, max_key_size: usize) -> Self {
        self.max_key_size = max_key_size;
        self
    }

    /// Set the maximum value length.
    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = max_value_size;
        self
    }

    /// Cap the order below what the page could hold.
    ///
    /// Small orders produce deep trees from few keys, which is mostly
    /// useful for exercising splits and merges.
    pub fn with_max_order(mut self, max_order: usize) -> Self {
        self.max_order = Some(max_order);
        self
    }

    /// Enable or disable `fsync` after every page write.
    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// Check that the options describe a usable tree.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the page size is out of range or not
    /// a power of two, a size limit is zero or too large to encode, or the
    /// order cap is below `MIN_ORDER`.
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size)
        {
            return Err(Error::InvalidConfig(format!(
                "page size {} must be a power of two in {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if self.max_key_size == 0 || self.max_key_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max key size {} out of range",
                self.max_key_size
            )));
        }
        if self.max_value_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max value size {} out of range",
                self.max_value_size
            )));
        }
        if let Some(order) = self.max_order {
            if order < MIN_ORDER {
                return Err(Error::InvalidConfig(format!(
                    "order {} is below the minimum of {}",
                    order, MIN_ORDER
                )));
            }
        }
        Ok(())
    }
}
