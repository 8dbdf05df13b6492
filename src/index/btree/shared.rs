//! A cloneable, thread-safe handle around one tree.

use std::sync::Arc;

use parking_lot::Mutex;

use super::check::TreeReport;
use super::comparator::{BytewiseComparator, KeyComparator};
use super::tree::BPlusTree;
use crate::common::Result;

/// Serializes all operations on a [`BPlusTree`] behind a single mutex.
///
/// Lookups read pages through the same file handle as writes, so readers
/// take the lock too. Clones share the same tree.
///
/// # Example
/// ```no_run
/// use btreedb::{BPlusTree, SharedBPlusTree, TreeOptions};
/// use std::thread;
///
/// let tree = BPlusTree::open("shared.db", TreeOptions::default()).unwrap();
/// let shared = SharedBPlusTree::new(tree);
///
/// let handles: Vec<_> = (0..4u32)
///     .map(|t| {
///         let shared = shared.clone();
///         thread::spawn(move || shared.put(&t.to_be_bytes(), b"v").unwrap())
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(shared.len(), 4);
/// ```
pub struct SharedBPlusTree<C: KeyComparator = BytewiseComparator> {
    inner: Arc<Mutex<BPlusTree<C>>>,
}

impl<C: KeyComparator> Clone for SharedBPlusTree<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: KeyComparator> SharedBPlusTree<C> {
    pub fn new(tree: BPlusTree<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.lock().get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        self.inner.lock().contains_key(key)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.lock().put(key, value)
    }

    pub fn delete(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.inner.lock().delete(key)
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().depth()
    }

    pub fn check(&self) -> Result<TreeReport> {
        self.inner.lock().check()
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// Run `f` with exclusive access to the tree, for several operations
    /// that must not interleave with other handles.
    pub fn with_tree<R>(&self, f: impl FnOnce(&mut BPlusTree<C>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Take the tree back if this is the last handle.
    pub fn into_inner(self) -> Option<BPlusTree<C>> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}
