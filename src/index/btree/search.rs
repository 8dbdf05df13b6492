//! Root-to-leaf descent and point lookups.

use super::comparator::KeyComparator;
use super::node::{InternalNode, LeafNode, Node};
use super::tree::BPlusTree;
use crate::common::{Error, PageId, Result};

/// One internal node on the path from the root to a leaf, with the index
/// of the child that was followed.
///
/// Nodes carry no parent links, so mutations walk this path back up.
#[derive(Debug)]
pub(super) struct PathFrame {
    pub page_id: PageId,
    pub node: InternalNode,
    pub child_idx: usize,
}

/// Result of a descent: the internal nodes visited and the leaf reached.
pub(super) struct Descent {
    pub path: Vec<PathFrame>,
    pub leaf_id: PageId,
    pub leaf: LeafNode,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Look up `key`.
    ///
    /// Returns `Ok(None)` if the key is absent. Reads at most one page per
    /// level and never writes.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Descent { leaf, .. } = self.descend(key)?;
        Ok(match self.search_leaf(&leaf, key) {
            Ok(pos) => leaf.entries.into_iter().nth(pos).map(|e| e.value),
            Err(_) => None,
        })
    }

    /// Whether `key` is stored.
    pub fn contains_key(&mut self, key: &[u8]) -> Result<bool> {
        let Descent { leaf, .. } = self.descend(key)?;
        Ok(self.search_leaf(&leaf, key).is_ok())
    }

    /// Index of the child of an internal node whose range holds `key`.
    ///
    /// Separators are inclusive lower bounds of the right subtree, so a key
    /// equal to `keys[i]` goes to child `i + 1`.
    pub(super) fn child_index(&self, keys: &[Vec<u8>], key: &[u8]) -> usize {
        match keys.binary_search_by(|probe| self.comparator.compare(probe, key)) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Binary search a leaf. `Ok(pos)` if found, `Err(pos)` with the
    /// insertion point otherwise.
    pub(super) fn search_leaf(&self, leaf: &LeafNode, key: &[u8]) -> std::result::Result<usize, usize> {
        leaf.entries
            .binary_search_by(|entry| self.comparator.compare(&entry.key, key))
    }

    /// Walk from the root to the leaf whose range holds `key`.
    ///
    /// Every node on the way is checked for minimum occupancy and for
    /// sitting at the right level; a violation is reported as corruption
    /// instead of being carried into a mutation.
    pub(super) fn descend(&mut self, key: &[u8]) -> Result<Descent> {
        let depth = self.depth();
        let min = self.min_occupancy();
        let mut path = Vec::with_capacity(depth.saturating_sub(1));
        let mut page_id = self.header.root;

        for level in 0..depth {
            let is_root = level == 0;
            let is_leaf_level = level + 1 == depth;

            match self.load_node(page_id)? {
                Node::Internal(node) => {
                    if is_leaf_level {
                        return Err(Error::corruption(format!(
                            "internal node {} at leaf level {}",
                            page_id, level
                        )));
                    }
                    let floor = if is_root { 2 } else { min };
                    if node.children.len() < floor {
                        return Err(Error::corruption(format!(
                            "{} has {} children, minimum is {}",
                            page_id,
                            node.children.len(),
                            floor
                        )));
                    }

                    let child_idx = self.child_index(&node.keys, key);
                    let child = node.children[child_idx];
                    path.push(PathFrame {
                        page_id,
                        node,
                        child_idx,
                    });
                    page_id = child;
                }
                Node::Leaf(leaf) => {
                    if !is_leaf_level {
                        return Err(Error::corruption(format!(
                            "leaf {} at level {} of a depth {} tree",
                            page_id, level, depth
                        )));
                    }
                    if !is_root && leaf.len() < min {
                        return Err(Error::corruption(format!(
                            "{} has {} entries, minimum is {}",
                            page_id,
                            leaf.len(),
                            min
                        )));
                    }
                    return Ok(Descent {
                        path,
                        leaf_id: page_id,
                        leaf,
                    });
                }
            }
        }

        Err(Error::corruption(format!(
            "no leaf within depth {} below {}",
            depth, self.header.root
        )))
    }

    /// The leftmost leaf, following first children from the root.
    pub(super) fn leftmost_leaf(&mut self) -> Result<(PageId, LeafNode)> {
        let mut page_id = self.header.root;
        for _ in 0..self.depth() {
            match self.load_node(page_id)? {
                Node::Internal(node) => page_id = node.children[0],
                Node::Leaf(leaf) => return Ok((page_id, leaf)),
            }
        }
        Err(Error::corruption(format!(
            "no leaf within depth {} below {}",
            self.depth(),
            self.header.root
        )))
    }
}
