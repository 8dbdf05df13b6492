//! Deletion with sibling borrowing, merging and root collapse.
//!
//! An underfull node first tries to borrow from its left sibling, then
//! from its right sibling, and only merges when neither can spare an
//! entry. Merges can cascade up to the root; an internal root left with a
//! single child is freed and the child takes its place.

use tracing::debug;

use super::comparator::KeyComparator;
use super::node::{InternalNode, LeafNode};
use super::search::{Descent, PathFrame};
use super::tree::BPlusTree;
use crate::common::{Error, PageId, Result};

impl<C: KeyComparator> BPlusTree<C> {
    /// Remove `key` and return its value.
    ///
    /// # Errors
    /// - `Error::KeyNotFound` if `key` is absent. Nothing is written.
    /// - `Error::Corruption` if a node on the path is damaged
    pub fn delete(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let Descent {
            mut path,
            leaf_id,
            mut leaf,
        } = self.descend(key)?;

        let pos = self
            .search_leaf(&leaf, key)
            .map_err(|_| Error::KeyNotFound)?;
        let removed = leaf.entries.remove(pos);

        self.rebalance_leaf(&mut path, leaf_id, leaf)?;

        self.header.key_count = self.header.key_count.saturating_sub(1);
        self.persist_header()?;
        Ok(removed.value)
    }

    /// Write back a leaf that lost an entry, fixing underflow.
    fn rebalance_leaf(
        &mut self,
        path: &mut Vec<PathFrame>,
        leaf_id: PageId,
        mut leaf: LeafNode,
    ) -> Result<()> {
        let min = self.min_occupancy();
        let Some(PathFrame {
            page_id: parent_id,
            node: mut parent,
            child_idx: idx,
        }) = path.pop()
        else {
            // A root leaf may hold any number of entries, including none
            return self.write_leaf(leaf_id, &leaf);
        };

        if leaf.len() >= min {
            return self.write_leaf(leaf_id, &leaf);
        }

        let mut left = match idx.checked_sub(1) {
            Some(i) => {
                let id = parent.children[i];
                Some((id, self.load_leaf(id)?))
            }
            None => None,
        };
        if let Some((left_id, left_leaf)) = left.as_mut() {
            if left_leaf.len() > min {
                let entry = left_leaf.entries.pop().ok_or_else(|| {
                    Error::corruption(format!("{} is an empty sibling", left_id))
                })?;
                parent.keys[idx - 1] = entry.key.clone();
                leaf.entries.insert(0, entry);

                self.write_leaf(*left_id, left_leaf)?;
                self.write_leaf(leaf_id, &leaf)?;
                self.write_internal(parent_id, &parent)?;
                debug!(from = left_id.0, to = leaf_id.0, "btree.borrow.leaf.left");
                return Ok(());
            }
        }

        let mut right = match parent.children.get(idx + 1) {
            Some(&id) => Some((id, self.load_leaf(id)?)),
            None => None,
        };
        if let Some((right_id, right_leaf)) = right.as_mut() {
            if right_leaf.len() > min {
                let entry = right_leaf.entries.remove(0);
                leaf.entries.push(entry);
                parent.keys[idx] = right_leaf.entries[0].key.clone();

                self.write_leaf(*right_id, right_leaf)?;
                self.write_leaf(leaf_id, &leaf)?;
                self.write_internal(parent_id, &parent)?;
                debug!(from = right_id.0, to = leaf_id.0, "btree.borrow.leaf.right");
                return Ok(());
            }
        }

        match (left, right) {
            (Some((left_id, mut left_leaf)), _) => {
                left_leaf.entries.append(&mut leaf.entries);
                self.unlink_leaf(left_id, &mut left_leaf, leaf.next)?;
                self.write_leaf(left_id, &left_leaf)?;
                self.store.free_page(leaf_id)?;

                parent.keys.remove(idx - 1);
                parent.children.remove(idx);
                debug!(into = left_id.0, freed = leaf_id.0, "btree.merge.leaf");
            }
            (None, Some((right_id, mut right_leaf))) => {
                leaf.entries.append(&mut right_leaf.entries);
                self.unlink_leaf(leaf_id, &mut leaf, right_leaf.next)?;
                self.write_leaf(leaf_id, &leaf)?;
                self.store.free_page(right_id)?;

                parent.keys.remove(idx);
                parent.children.remove(idx + 1);
                debug!(into = leaf_id.0, freed = right_id.0, "btree.merge.leaf");
            }
            (None, None) => {
                return Err(Error::corruption(format!(
                    "{} has a single child below a non-root position",
                    parent_id
                )));
            }
        }

        self.rebalance_internal(path, parent_id, parent)
    }

    /// Point `survivor` past the leaf it absorbed, to `next`.
    fn unlink_leaf(
        &mut self,
        survivor_id: PageId,
        survivor: &mut LeafNode,
        next: PageId,
    ) -> Result<()> {
        survivor.next = next;
        if let Some(next_id) = next.to_option() {
            let mut after = self.load_leaf(next_id)?;
            after.prev = survivor_id;
            self.write_leaf(next_id, &after)?;
        }
        Ok(())
    }

    /// Write back an internal node that lost a child, fixing underflow all
    /// the way up.
    fn rebalance_internal(
        &mut self,
        path: &mut Vec<PathFrame>,
        mut node_id: PageId,
        mut node: InternalNode,
    ) -> Result<()> {
        let min = self.min_occupancy();

        loop {
            let Some(PathFrame {
                page_id: parent_id,
                node: mut parent,
                child_idx: idx,
            }) = path.pop()
            else {
                return self.settle_root(node_id, node);
            };

            if node.children.len() >= min {
                return self.write_internal(node_id, &node);
            }

            let mut left = match idx.checked_sub(1) {
                Some(i) => {
                    let id = parent.children[i];
                    Some((id, self.load_internal(id)?))
                }
                None => None,
            };
            if let Some((left_id, left_node)) = left.as_mut() {
                if left_node.children.len() > min {
                    Self::rotate_right(&mut parent.keys[idx - 1], left_node, &mut node)?;
                    self.write_internal(*left_id, left_node)?;
                    self.write_internal(node_id, &node)?;
                    self.write_internal(parent_id, &parent)?;
                    debug!(from = left_id.0, to = node_id.0, "btree.borrow.internal.left");
                    return Ok(());
                }
            }

            let mut right = match parent.children.get(idx + 1) {
                Some(&id) => Some((id, self.load_internal(id)?)),
                None => None,
            };
            if let Some((right_id, right_node)) = right.as_mut() {
                if right_node.children.len() > min {
                    Self::rotate_left(&mut parent.keys[idx], &mut node, right_node)?;
                    self.write_internal(*right_id, right_node)?;
                    self.write_internal(node_id, &node)?;
                    self.write_internal(parent_id, &parent)?;
                    debug!(from = right_id.0, to = node_id.0, "btree.borrow.internal.right");
                    return Ok(());
                }
            }

            match (left, right) {
                (Some((left_id, mut left_node)), _) => {
                    let separator = parent.keys.remove(idx - 1);
                    parent.children.remove(idx);
                    Self::absorb(&mut left_node, separator, node);
                    self.write_internal(left_id, &left_node)?;
                    self.store.free_page(node_id)?;
                    debug!(into = left_id.0, freed = node_id.0, "btree.merge.internal");
                }
                (None, Some((right_id, right_node))) => {
                    let separator = parent.keys.remove(idx);
                    parent.children.remove(idx + 1);
                    Self::absorb(&mut node, separator, right_node);
                    self.write_internal(node_id, &node)?;
                    self.store.free_page(right_id)?;
                    debug!(into = node_id.0, freed = right_id.0, "btree.merge.internal");
                }
                (None, None) => {
                    return Err(Error::corruption(format!(
                        "{} has a single child below a non-root position",
                        parent_id
                    )));
                }
            }

            node_id = parent_id;
            node = parent;
        }
    }

    /// Write the root after a child was removed from it. An internal root
    /// left with one child is freed and that child becomes the root.
    fn settle_root(&mut self, root_id: PageId, root: InternalNode) -> Result<()> {
        if root.children.len() > 1 {
            return self.write_internal(root_id, &root);
        }

        let child = root.children[0];
        self.store.free_page(root_id)?;
        self.header.root = child;
        self.header.depth -= 1;
        debug!(
            root = child.0,
            depth = self.header.depth,
            "btree.root.collapse"
        );
        Ok(())
    }

    /// Move the last child of `left` to the front of `node` through the
    /// parent separator.
    fn rotate_right(
        separator: &mut Vec<u8>,
        left: &mut InternalNode,
        node: &mut InternalNode,
    ) -> Result<()> {
        let (Some(child), Some(key)) = (left.children.pop(), left.keys.pop()) else {
            return Err(Error::corruption("borrowing from an empty internal node"));
        };
        node.children.insert(0, child);
        node.keys.insert(0, std::mem::replace(separator, key));
        Ok(())
    }

    /// Move the first child of `right` to the end of `node` through the
    /// parent separator.
    fn rotate_left(
        separator: &mut Vec<u8>,
        node: &mut InternalNode,
        right: &mut InternalNode,
    ) -> Result<()> {
        if right.keys.is_empty() {
            return Err(Error::corruption("borrowing from an empty internal node"));
        }
        let child = right.children.remove(0);
        let key = right.keys.remove(0);
        node.children.push(child);
        node.keys.push(std::mem::replace(separator, key));
        Ok(())
    }

    /// Append `right` to `left`, pulling the separator between them down.
    fn absorb(left: &mut InternalNode, separator: Vec<u8>, mut right: InternalNode) {
        left.keys.push(separator);
        left.keys.append(&mut right.keys);
        left.children.append(&mut right.children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TreeOptions;
    use tempfile::tempdir;

    fn open_order(dir: &tempfile::TempDir, order: usize) -> BPlusTree {
        let options = TreeOptions::default()
            .with_page_size(1024)
            .with_max_key_size(8)
            .with_max_value_size(8)
            .with_max_order(order);
        BPlusTree::open(dir.path().join("delete.db"), options).unwrap()
    }

    fn key(i: u32) -> [u8; 4] {
        i.to_be_bytes()
    }

    fn fill(tree: &mut BPlusTree, keys: impl IntoIterator<Item = u32>) {
        for i in keys {
            tree.put(&key(i), &i.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn test_delete_returns_value() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        tree.put(b"k", b"v").unwrap();

        assert_eq!(tree.delete(b"k").unwrap(), b"v".to_vec());
        assert_eq!(tree.get(b"k").unwrap(), None);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_delete_missing_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        fill(&mut tree, 0..20);

        let writes = tree.stats().snapshot().pages_written;
        assert!(matches!(tree.delete(&key(99)), Err(Error::KeyNotFound)));
        assert!(matches!(tree.delete(b"way too long"), Err(Error::KeyNotFound)));
        assert_eq!(tree.stats().snapshot().pages_written, writes);
        assert_eq!(tree.len(), 20);
    }

    #[test]
    fn test_delete_twice() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        tree.put(b"k", b"v").unwrap();
        tree.delete(b"k").unwrap();
        assert!(matches!(tree.delete(b"k"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn test_root_leaf_may_empty() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        fill(&mut tree, 0..3);
        for i in 0..3 {
            tree.delete(&key(i)).unwrap();
        }
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count().unwrap(), 1);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_borrow_from_left_sibling() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        // Leaves [10,20] [30,40,50] after the first split; grow the left one.
        fill(&mut tree, [10, 20, 30, 40, 50]);
        fill(&mut tree, [11, 12]);
        // Leaves: [10,11,12,20] [30,40,50]
        let root = tree.load_internal(tree.root_page()).unwrap();
        assert_eq!(root.children.len(), 2);

        tree.delete(&key(40)).unwrap();
        tree.delete(&key(50)).unwrap();

        let root = tree.load_internal(tree.root_page()).unwrap();
        let left = tree.load_leaf(root.children[0]).unwrap();
        let right = tree.load_leaf(root.children[1]).unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(right.len(), 2);
        assert_eq!(root.keys[0], right.entries[0].key);
        assert_eq!(right.entries[0].key, key(20).to_vec());
    }

    #[test]
    fn test_borrow_from_right_sibling() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        fill(&mut tree, [10, 20, 30, 40, 50, 60]);
        // Leaves: [10,20] [30,40,50,60]
        tree.delete(&key(10)).unwrap();

        let root = tree.load_internal(tree.root_page()).unwrap();
        let left = tree.load_leaf(root.children[0]).unwrap();
        let right = tree.load_leaf(root.children[1]).unwrap();
        assert_eq!(left.entries.len(), 2);
        assert_eq!(left.entries[1].key, key(30).to_vec());
        assert_eq!(root.keys[0], key(40).to_vec());
        assert_eq!(right.entries[0].key, key(40).to_vec());
    }

    #[test]
    fn test_merge_collapses_root() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        fill(&mut tree, 0..5);
        assert_eq!(tree.depth(), 2);
        let pages = tree.file_size();

        // [0,1] [2,3,4] -> deleting two from the right forces a merge
        tree.delete(&key(4)).unwrap();
        tree.delete(&key(3)).unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count().unwrap(), 1);
        assert_eq!(tree.free_page_count(), 2);
        assert_eq!(tree.file_size(), pages);

        let (_, leaf) = tree.leftmost_leaf().unwrap();
        assert_eq!(leaf.prev, PageId::INVALID);
        assert_eq!(leaf.next, PageId::INVALID);
        assert_eq!(leaf.len(), 3);
    }

    #[test]
    fn test_delete_everything_shrinks_to_single_leaf() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 3);
        fill(&mut tree, 0..200);
        assert!(tree.depth() > 3);

        for i in 0..200 {
            assert_eq!(tree.delete(&key(i)).unwrap(), i.to_le_bytes().to_vec());
        }

        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count().unwrap(), 1);
        // Every page except the header and the root leaf is free
        let pages = (tree.file_size() / 1024) as u32;
        assert_eq!(tree.free_page_count(), pages - 2);
    }

    #[test]
    fn test_interleaved_deletes_keep_remaining_keys() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 5);
        fill(&mut tree, 0..300);

        for i in (0..300).filter(|i| i % 3 != 0) {
            tree.delete(&key(i)).unwrap();
        }

        assert_eq!(tree.len(), 100);
        for i in 0..300u32 {
            let expected = (i % 3 == 0).then(|| i.to_le_bytes().to_vec());
            assert_eq!(tree.get(&key(i)).unwrap(), expected, "key {}", i);
        }
    }

    #[test]
    fn test_freed_pages_are_reused() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        fill(&mut tree, 0..100);
        for i in 0..100 {
            tree.delete(&key(i)).unwrap();
        }
        let size = tree.file_size();

        fill(&mut tree, 0..100);
        assert_eq!(tree.file_size(), size);
        assert!(tree.stats().snapshot().pages_reused > 0);
    }
}
