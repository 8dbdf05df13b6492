//! Page store statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// I/O and allocation counters kept by the page store.
///
/// All fields are atomic so they can be read through a shared reference
/// (for example from a [`SharedBPlusTree`](crate::SharedBPlusTree) observer)
/// while the store itself is borrowed mutably elsewhere. `Ordering::Relaxed`
/// is enough: counters are independent and only need atomicity.
///
/// # Example
/// ```
/// use btreedb::PageStoreStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = PageStoreStats::new();
/// stats.pages_read.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().pages_read, 1);
/// ```
#[derive(Debug, Default)]
pub struct PageStoreStats {
    /// Pages read from the file.
    pub pages_read: AtomicU64,

    /// Pages written to the file.
    pub pages_written: AtomicU64,

    /// Pages obtained by extending the file.
    pub pages_allocated: AtomicU64,

    /// Pages obtained by popping the free list.
    pub pages_reused: AtomicU64,

    /// Pages pushed onto the free list.
    pub pages_freed: AtomicU64,
}

impl PageStoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of allocations served from the free list (0.0 to 1.0).
    pub fn reuse_rate(&self) -> f64 {
        let reused = self.pages_reused.load(Ordering::Relaxed);
        let fresh = self.pages_allocated.load(Ordering::Relaxed);
        let total = reused + fresh;

        if total == 0 {
            0.0
        } else {
            reused as f64 / total as f64
        }
    }

    /// Get a non-atomic copy for display/logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            pages_allocated: self.pages_allocated.load(Ordering::Relaxed),
            pages_reused: self.pages_reused.load(Ordering::Relaxed),
            pages_freed: self.pages_freed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of page store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pages_read: u64,
    pub pages_written: u64,
    pub pages_allocated: u64,
    pub pages_reused: u64,
    pub pages_freed: u64,
}

impl StatsSnapshot {
    /// Counter deltas between `earlier` and `self`.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            pages_read: self.pages_read.saturating_sub(earlier.pages_read),
            pages_written: self.pages_written.saturating_sub(earlier.pages_written),
            pages_allocated: self.pages_allocated.saturating_sub(earlier.pages_allocated),
            pages_reused: self.pages_reused.saturating_sub(earlier.pages_reused),
            pages_freed: self.pages_freed.saturating_sub(earlier.pages_freed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reads: {}, writes: {}, allocated: {}, reused: {}, freed: {}",
            self.pages_read,
            self.pages_written,
            self.pages_allocated,
            self.pages_reused,
            self.pages_freed
        )
    }
}
