//! The tree handle: open/create, header persistence and node I/O.

use std::path::Path;

use tracing::{debug, info};

use super::comparator::{BytewiseComparator, KeyComparator};
use super::node::{page_order, InternalNode, LeafNode, Node};
use crate::common::config::MIN_ORDER;
use crate::common::{Error, PageId, Result, TreeOptions};
use crate::storage::{FileHeader, PageStore, PageStoreStats};

/// A persistent B+-tree stored in a single file.
///
/// Keys and values are byte strings bounded by the limits the file was
/// created with. Every mutation writes the touched nodes and the file header
/// before returning, so a handle that is dropped without [`close`] loses
/// nothing that was acknowledged; [`close`] additionally syncs the file.
///
/// The handle is single-owner. Wrap it in a
/// [`SharedBPlusTree`](super::SharedBPlusTree) to use it from several threads.
///
/// # Example
/// ```no_run
/// use btreedb::{BPlusTree, TreeOptions};
///
/// let mut tree = BPlusTree::open("index.db", TreeOptions::default()).unwrap();
/// tree.put(b"apple", b"red").unwrap();
/// assert_eq!(tree.get(b"apple").unwrap(), Some(b"red".to_vec()));
/// tree.close().unwrap();
/// ```
///
/// [`close`]: BPlusTree::close
pub struct BPlusTree<C: KeyComparator = BytewiseComparator> {
    pub(super) store: PageStore,
    pub(super) header: FileHeader,
    pub(super) comparator: C,
}

impl BPlusTree<BytewiseComparator> {
    /// Open the tree at `path`, creating it if the file is missing or empty.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if `options` are unusable, or the existing
    ///   file was created with a different page size or comparator
    /// - `Error::Corruption` if the existing file is not a valid tree
    /// - `Error::Io` on filesystem failures
    pub fn open<P: AsRef<Path>>(path: P, options: TreeOptions) -> Result<Self> {
        Self::open_with_comparator(path, options, BytewiseComparator)
    }
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Open the tree at `path` with a custom key order.
    ///
    /// See [`BPlusTree::open`].
    pub fn open_with_comparator<P: AsRef<Path>>(
        path: P,
        options: TreeOptions,
        comparator: C,
    ) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();

        let is_new = match std::fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if is_new {
            Self::create(path, &options, comparator)
        } else {
            Self::open_existing(path, &options, comparator)
        }
    }

    fn create(path: &Path, options: &TreeOptions, comparator: C) -> Result<Self> {
        let capacity = page_order(
            options.page_size,
            options.max_key_size,
            options.max_value_size,
        );
        let order = options.max_order.map_or(capacity, |cap| cap.min(capacity));
        if order < MIN_ORDER {
            return Err(Error::InvalidConfig(format!(
                "a {} byte page holds only {} entries of {} byte keys and {} byte values",
                options.page_size, order, options.max_key_size, options.max_value_size
            )));
        }

        let mut store = PageStore::create(path, options.page_size, options.sync_on_write)?;
        let header = FileHeader::new(
            options.page_size,
            options.max_key_size,
            options.max_value_size,
            order,
            comparator.fingerprint(),
        );

        let root = store.allocate_page()?;
        store.write_page(root, &Node::Leaf(LeafNode::new()).encode(options.page_size)?)?;

        let mut tree = Self {
            store,
            header: FileHeader { root, ..header },
            comparator,
        };
        tree.persist_header()?;

        info!(
            path = %path.display(),
            page_size = options.page_size,
            order,
            "btree.create"
        );
        Ok(tree)
    }

    fn open_existing(path: &Path, options: &TreeOptions, comparator: C) -> Result<Self> {
        let (store, header) = PageStore::open(path, options.sync_on_write)?;

        if header.page_size as usize != options.page_size {
            return Err(Error::InvalidConfig(format!(
                "file uses {} byte pages, options ask for {}",
                header.page_size, options.page_size
            )));
        }
        if header.comparator_id != comparator.fingerprint() {
            return Err(Error::InvalidConfig(format!(
                "file was created with a different comparator than {}",
                comparator.name()
            )));
        }

        let capacity = page_order(
            header.page_size as usize,
            header.max_key_size as usize,
            header.max_value_size as usize,
        );
        let order = header.order as usize;
        if !(MIN_ORDER..=capacity).contains(&order) {
            return Err(Error::corruption(format!(
                "stored order {} outside 3..={}",
                order, capacity
            )));
        }

        if header.max_key_size as usize != options.max_key_size
            || header.max_value_size as usize != options.max_value_size
        {
            debug!(
                max_key_size = header.max_key_size,
                max_value_size = header.max_value_size,
                "btree.open.stored_limits"
            );
        }

        info!(
            path = %path.display(),
            keys = header.key_count,
            depth = header.depth,
            pages = store.page_count(),
            "btree.open"
        );

        Ok(Self {
            store,
            header,
            comparator,
        })
    }

    /// Write the header and sync the file.
    pub fn flush(&mut self) -> Result<()> {
        self.persist_header()?;
        self.store.sync()
    }

    /// Flush and release the handle.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        info!(
            keys = self.header.key_count,
            pages = self.store.page_count(),
            "btree.close"
        );
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of levels. A tree whose root is a leaf has depth 1.
    pub fn depth(&self) -> usize {
        self.header.depth as usize
    }

    /// Number of stored keys.
    pub fn len(&self) -> u64 {
        self.header.key_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.key_count == 0
    }

    /// Maximum entries per leaf and children per internal node.
    pub fn order(&self) -> usize {
        self.header.order as usize
    }

    /// Minimum occupancy of a non-root node, `ceil(order / 2)`.
    pub fn min_occupancy(&self) -> usize {
        self.order().div_ceil(2)
    }

    pub fn page_size(&self) -> usize {
        self.store.page_size()
    }

    pub fn max_key_size(&self) -> usize {
        self.header.max_key_size as usize
    }

    pub fn max_value_size(&self) -> usize {
        self.header.max_value_size as usize
    }

    pub fn root_page(&self) -> PageId {
        self.header.root
    }

    /// Size of the backing file in bytes.
    pub fn file_size(&self) -> u64 {
        self.store.file_size()
    }

    /// Pages currently on the free list.
    pub fn free_page_count(&self) -> u32 {
        self.store.free_page_count()
    }

    pub fn stats(&self) -> &PageStoreStats {
        self.store.stats()
    }

    /// The key order this tree uses.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&mut self) -> Result<usize> {
        let mut count = 0;
        let mut stack = vec![self.header.root];
        while let Some(page_id) = stack.pop() {
            count += 1;
            if count > self.store.page_count() as usize {
                return Err(Error::corruption("node walk visits more pages than exist"));
            }
            if let Node::Internal(node) = self.load_node(page_id)? {
                stack.extend(node.children);
            }
        }
        Ok(count)
    }

    // ========================================================================
    // Node I/O
    // ========================================================================

    /// Read and decode a node, checking key order and maximum occupancy.
    pub(super) fn load_node(&mut self, page_id: PageId) -> Result<Node> {
        let page = self.store.read_page(page_id)?;
        let node = Node::decode(&page)?;

        let (keys, fill): (Vec<&[u8]>, usize) = match &node {
            Node::Leaf(leaf) => (
                leaf.entries.iter().map(|e| e.key.as_slice()).collect(),
                leaf.len(),
            ),
            Node::Internal(internal) => (
                internal.keys.iter().map(Vec::as_slice).collect(),
                internal.children.len(),
            ),
        };

        if fill > self.order() {
            return Err(Error::corruption(format!(
                "{} holds {} entries, order is {}",
                page_id,
                fill,
                self.order()
            )));
        }
        if keys
            .windows(2)
            .any(|pair| self.comparator.compare(pair[0], pair[1]).is_ge())
        {
            return Err(Error::corruption(format!("{} keys out of order", page_id)));
        }

        Ok(node)
    }

    pub(super) fn load_leaf(&mut self, page_id: PageId) -> Result<LeafNode> {
        match self.load_node(page_id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(Error::corruption(format!(
                "expected a leaf at {}, found an internal node",
                page_id
            ))),
        }
    }

    pub(super) fn load_internal(&mut self, page_id: PageId) -> Result<InternalNode> {
        match self.load_node(page_id)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(Error::corruption(format!(
                "expected an internal node at {}, found a leaf",
                page_id
            ))),
        }
    }

    pub(super) fn write_leaf(&mut self, page_id: PageId, leaf: &LeafNode) -> Result<()> {
        let page = leaf.encode(self.page_size())?;
        self.store.write_page(page_id, &page)
    }

    pub(super) fn write_internal(&mut self, page_id: PageId, node: &InternalNode) -> Result<()> {
        let page = node.encode(self.page_size())?;
        self.store.write_page(page_id, &page)
    }

    /// Copy the free-list state from the store and write page 0.
    pub(super) fn persist_header(&mut self) -> Result<()> {
        self.header.free_list_head = self.store.free_list_head();
        self.header.free_page_count = self.store.free_page_count();
        self.store.write_header(&self.header)
    }

    pub(super) fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() > self.max_key_size() {
            return Err(Error::ResourceExhausted(format!(
                "key of {} bytes exceeds the {} byte limit",
                key.len(),
                self.max_key_size()
            )));
        }
        Ok(())
    }

    pub(super) fn check_value(&self, value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_size() {
            return Err(Error::ResourceExhausted(format!(
                "value of {} bytes exceeds the {} byte limit",
                value.len(),
                self.max_value_size()
            )));
        }
        Ok(())
    }
}

impl<C: KeyComparator> std::fmt::Debug for BPlusTree<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("comparator", &self.comparator.name())
            .field("root", &self.header.root)
            .field("depth", &self.header.depth)
            .field("keys", &self.header.key_count)
            .field("order", &self.header.order)
            .finish()
    }
}
