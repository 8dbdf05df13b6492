//! Insertion with leaf and internal splits.

use tracing::debug;

use super::comparator::KeyComparator;
use super::node::{Entry, InternalNode, LeafNode};
use super::search::{Descent, PathFrame};
use super::tree::BPlusTree;
use crate::common::{Error, PageId, Result};

/// A split that still has to be recorded in the parent: the separator key
/// and the new right sibling it points at.
type Promotion = (Vec<u8>, PageId);

impl<C: KeyComparator> BPlusTree<C> {
    /// Insert a new key.
    ///
    /// # Errors
    /// - `Error::KeyExists` if `key` is already stored. Nothing is written.
    /// - `Error::ResourceExhausted` if the key or value exceeds its limit,
    ///   or a new page cannot be allocated
    /// - `Error::Corruption` if a node on the path is damaged
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        self.check_value(value)?;

        let Descent {
            mut path,
            leaf_id,
            mut leaf,
        } = self.descend(key)?;

        let pos = match self.search_leaf(&leaf, key) {
            Ok(_) => return Err(Error::KeyExists),
            Err(pos) => pos,
        };
        leaf.entries.insert(pos, Entry::new(key, value));

        let mut promotion = if leaf.len() > self.order() {
            Some(self.split_leaf(leaf_id, leaf)?)
        } else {
            self.write_leaf(leaf_id, &leaf)?;
            None
        };

        while let Some((separator, right_id)) = promotion.take() {
            match path.pop() {
                Some(PathFrame {
                    page_id,
                    mut node,
                    child_idx,
                }) => {
                    node.keys.insert(child_idx, separator);
                    node.children.insert(child_idx + 1, right_id);

                    if node.children.len() > self.order() {
                        promotion = Some(self.split_internal(page_id, node)?);
                    } else {
                        self.write_internal(page_id, &node)?;
                    }
                }
                None => self.grow_root(separator, right_id)?,
            }
        }

        self.header.key_count += 1;
        self.persist_header()
    }

    /// Split an overfull leaf in two. The lower half stays in place.
    fn split_leaf(&mut self, leaf_id: PageId, mut leaf: LeafNode) -> Result<Promotion> {
        let mid = leaf.len() / 2;
        let right_id = self.store.allocate_page()?;
        let right = LeafNode {
            prev: leaf_id,
            next: leaf.next,
            entries: leaf.entries.split_off(mid),
        };

        if let Some(next_id) = right.next.to_option() {
            let mut next = self.load_leaf(next_id)?;
            next.prev = right_id;
            self.write_leaf(next_id, &next)?;
        }
        leaf.next = right_id;

        self.write_leaf(right_id, &right)?;
        self.write_leaf(leaf_id, &leaf)?;

        debug!(
            left = leaf_id.0,
            right = right_id.0,
            left_entries = leaf.len(),
            right_entries = right.len(),
            "btree.split.leaf"
        );
        Ok((right.entries[0].key.clone(), right_id))
    }

    /// Split an overfull internal node. The middle separator moves up to
    /// the parent and is kept in neither half.
    fn split_internal(&mut self, page_id: PageId, mut node: InternalNode) -> Result<Promotion> {
        let left_children = node.children.len().div_ceil(2);
        let right_children = node.children.split_off(left_children);
        let mut right_keys = node.keys.split_off(left_children - 1);
        let promoted = right_keys.remove(0);

        let right = InternalNode {
            keys: right_keys,
            children: right_children,
        };
        let right_id = self.store.allocate_page()?;

        self.write_internal(right_id, &right)?;
        self.write_internal(page_id, &node)?;

        debug!(
            left = page_id.0,
            right = right_id.0,
            left_children = node.children.len(),
            right_children = right.children.len(),
            "btree.split.internal"
        );
        Ok((promoted, right_id))
    }

    /// Put a new internal root above the old one after it split.
    fn grow_root(&mut self, separator: Vec<u8>, right_id: PageId) -> Result<()> {
        let old_root = self.header.root;
        let new_root = self.store.allocate_page()?;
        self.write_internal(new_root, &InternalNode::new_root(separator, old_root, right_id))?;

        self.header.root = new_root;
        self.header.depth += 1;
        debug!(
            root = new_root.0,
            depth = self.header.depth,
            "btree.root.grow"
        );
        Ok(())
    }
}
