//! Key ordering.

use std::cmp::Ordering;

/// Defines the order of keys in a tree.
///
/// The comparator is not stored in the file, only a fingerprint of its
/// [`name`](Self::name). Reopening a tree with a comparator of a different
/// name is rejected, since the on-disk order would no longer match.
pub trait KeyComparator {
    /// Compares two keys `a` and `b`.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Stable name identifying the ordering.
    fn name(&self) -> &str;

    /// Fingerprint persisted in the file header.
    fn fingerprint(&self) -> u32 {
        crc32fast::hash(self.name().as_bytes())
    }
}

/// Lexicographic byte-wise ordering. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "btreedb.BytewiseComparator"
    }
}
