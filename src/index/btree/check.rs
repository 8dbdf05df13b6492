//! Structural verification and debug printing.

use std::collections::HashSet;
use std::fmt;

use tracing::info;

use super::comparator::KeyComparator;
use super::node::Node;
use super::tree::BPlusTree;
use crate::common::{Error, PageId, Result};

/// Summary of a successful [`BPlusTree::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeReport {
    pub depth: usize,
    /// Internal nodes plus leaves.
    pub node_count: usize,
    pub leaf_count: usize,
    pub key_count: u64,
    pub free_pages: usize,
    /// Pages in the file, header included.
    pub page_count: u32,
}

impl fmt::Display for TreeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "depth: {}, nodes: {}, leaves: {}, keys: {}, free: {}, pages: {}",
            self.depth,
            self.node_count,
            self.leaf_count,
            self.key_count,
            self.free_pages,
            self.page_count
        )
    }
}

/// Key range a subtree must stay within: `[lower, upper)`.
#[derive(Clone, Copy)]
struct Bounds<'a> {
    lower: Option<&'a [u8]>,
    upper: Option<&'a [u8]>,
}

/// Leaf as seen during the walk, for checking the sibling chain.
struct LeafLink {
    id: PageId,
    prev: PageId,
    next: PageId,
}

#[derive(Default)]
struct Walk {
    seen: HashSet<PageId>,
    leaves: Vec<LeafLink>,
    keys: u64,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Verify every structural property of the tree.
    ///
    /// Checks key order and separator bounds, occupancy, that all leaves
    /// sit at the same depth, the leaf sibling chain, the stored key count,
    /// and that every page is either a reachable node, on the free list, or
    /// the header.
    ///
    /// # Errors
    /// Returns `Error::Corruption` describing the first violation found.
    pub fn check(&mut self) -> Result<TreeReport> {
        let mut walk = Walk::default();
        let root = self.header.root;
        let unbounded = Bounds {
            lower: None,
            upper: None,
        };
        self.check_subtree(root, 0, unbounded, &mut walk)?;

        self.check_leaf_chain(&walk.leaves)?;

        if walk.keys != self.header.key_count {
            return Err(Error::corruption(format!(
                "header counts {} keys, leaves hold {}",
                self.header.key_count, walk.keys
            )));
        }

        let free = self.store.free_list()?;
        if let Some(shared) = free.iter().find(|&id| walk.seen.contains(id)) {
            return Err(Error::corruption(format!(
                "{} is both a node and on the free list",
                shared
            )));
        }

        let page_count = self.store.page_count();
        let accounted = walk.seen.len() + free.len() + 1;
        if accounted != page_count as usize {
            return Err(Error::corruption(format!(
                "{} pages in file, {} accounted for",
                page_count, accounted
            )));
        }

        let report = TreeReport {
            depth: self.depth(),
            node_count: walk.seen.len(),
            leaf_count: walk.leaves.len(),
            key_count: walk.keys,
            free_pages: free.len(),
            page_count,
        };
        info!(%report, "btree.check");
        Ok(report)
    }

    fn check_subtree(
        &mut self,
        page_id: PageId,
        level: usize,
        bounds: Bounds<'_>,
        walk: &mut Walk,
    ) -> Result<()> {
        if !walk.seen.insert(page_id) {
            return Err(Error::corruption(format!(
                "{} is reachable twice",
                page_id
            )));
        }

        let is_root = level == 0;
        let is_leaf_level = level + 1 == self.depth();
        let min = self.min_occupancy();

        match self.load_node(page_id)? {
            Node::Leaf(leaf) => {
                if !is_leaf_level {
                    return Err(Error::corruption(format!(
                        "leaf {} at level {}, expected depth {}",
                        page_id,
                        level,
                        self.depth()
                    )));
                }
                if !is_root && leaf.len() < min {
                    return Err(Error::corruption(format!(
                        "leaf {} holds {} entries, minimum is {}",
                        page_id,
                        leaf.len(),
                        min
                    )));
                }
                for entry in &leaf.entries {
                    self.check_range(page_id, &entry.key, bounds)?;
                }

                walk.keys += leaf.len() as u64;
                walk.leaves.push(LeafLink {
                    id: page_id,
                    prev: leaf.prev,
                    next: leaf.next,
                });
            }
            Node::Internal(node) => {
                if is_leaf_level {
                    return Err(Error::corruption(format!(
                        "internal node {} at leaf level",
                        page_id
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
                for key in &node.keys {
                    self.check_range(page_id, key, bounds)?;
                }

                for (i, &child) in node.children.iter().enumerate() {
                    let child_bounds = Bounds {
                        lower: if i == 0 {
                            bounds.lower
                        } else {
                            Some(node.keys[i - 1].as_slice())
                        },
                        upper: node.keys.get(i).map(Vec::as_slice).or(bounds.upper),
                    };
                    self.check_subtree(child, level + 1, child_bounds, walk)?;
                }
            }
        }
        Ok(())
    }

    fn check_range(&self, page_id: PageId, key: &[u8], bounds: Bounds<'_>) -> Result<()> {
        let below = bounds
            .lower
            .is_some_and(|lower| self.comparator.compare(key, lower).is_lt());
        let above = bounds
            .upper
            .is_some_and(|upper| self.comparator.compare(key, upper).is_ge());
        if below || above {
            return Err(Error::corruption(format!(
                "{} holds a key outside its separator range",
                page_id
            )));
        }
        Ok(())
    }

    fn check_leaf_chain(&self, leaves: &[LeafLink]) -> Result<()> {
        for (i, leaf) in leaves.iter().enumerate() {
            let prev = if i == 0 { PageId::INVALID } else { leaves[i - 1].id };
            let next = leaves.get(i + 1).map_or(PageId::INVALID, |l| l.id);
            if leaf.prev != prev || leaf.next != next {
                return Err(Error::corruption(format!(
                    "leaf {} links to {} and {}, expected {} and {}",
                    leaf.id, leaf.prev, leaf.next, prev, next
                )));
            }
        }
        Ok(())
    }

    /// Render the tree level by level, one node per line, with the bytes
    /// each node occupies in its page.
    ///
    /// Keys are shown as lossy UTF-8. Meant for debugging small trees.
    pub fn dump(&mut self) -> Result<String> {
        let mut out = String::new();
        let mut level = vec![self.header.root];
        let mut depth = 0;

        while !level.is_empty() {
            if depth >= self.depth() {
                return Err(Error::corruption("tree is deeper than its header says"));
            }
            out.push_str(&format!("level {}:\n", depth));
            let mut next_level = Vec::new();

            for page_id in level {
                let node = self.load_node(page_id)?;
                let used = node.encoded_size();
                match node {
                    Node::Internal(node) => {
                        let keys: Vec<_> = node.keys.iter().map(|k| show(k)).collect();
                        out.push_str(&format!(
                            "  {} internal {}B [{}]\n",
                            page_id,
                            used,
                            keys.join(", ")
                        ));
                        next_level.extend(node.children);
                    }
                    Node::Leaf(leaf) => {
                        let entries: Vec<_> = leaf
                            .entries
                            .iter()
                            .map(|e| format!("{}={}", show(&e.key), show(&e.value)))
                            .collect();
                        out.push_str(&format!(
                            "  {} leaf {}B [{}]\n",
                            page_id,
                            used,
                            entries.join(", ")
                        ));
                    }
                }
            }

            level = next_level;
            depth += 1;
        }
        Ok(out)
    }
}

fn show(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
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
        BPlusTree::open(dir.path().join("check.db"), options).unwrap()
    }

    #[test]
    fn test_check_empty_tree() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        let report = tree.check().unwrap();
        assert_eq!(
            report,
            TreeReport {
                depth: 1,
                node_count: 1,
                leaf_count: 1,
                key_count: 0,
                free_pages: 0,
                page_count: 2,
            }
        );
    }

    #[test]
    fn test_check_after_mixed_workload() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        for i in 0..150u32 {
            tree.put(&((i * 7) % 150).to_be_bytes(), b"v").unwrap();
        }
        tree.check().unwrap();

        for i in (0..150u32).step_by(3) {
            tree.delete(&i.to_be_bytes()).unwrap();
        }
        let report = tree.check().unwrap();
        assert_eq!(report.key_count, 100);
        assert_eq!(report.depth, tree.depth());
        assert_eq!(report.node_count, tree.node_count().unwrap());
        assert_eq!(report.free_pages, tree.free_page_count() as usize);
    }

    #[test]
    fn test_check_detects_bad_key_count() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        tree.put(b"a", b"1").unwrap();
        tree.header.key_count = 5;
        assert!(matches!(tree.check(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_check_detects_broken_sibling_link() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        for i in 0..10u32 {
            tree.put(&i.to_be_bytes(), b"v").unwrap();
        }
        let (first_id, mut first) = tree.leftmost_leaf().unwrap();
        first.next = PageId::INVALID;
        tree.write_leaf(first_id, &first).unwrap();

        assert!(matches!(tree.check(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_check_detects_leaked_page() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        tree.store.allocate_page().unwrap();
        assert!(matches!(tree.check(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_check_detects_key_outside_separator_range() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        for i in 0..5u32 {
            tree.put(&i.to_be_bytes(), b"v").unwrap();
        }
        // Root separator is 2; push a smaller key into the right leaf.
        let root = tree.load_internal(tree.root_page()).unwrap();
        let mut right = tree.load_leaf(root.children[1]).unwrap();
        right.entries[0].key = 1u32.to_be_bytes().to_vec();
        tree.write_leaf(root.children[1], &right).unwrap();

        assert!(matches!(tree.check(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_dump_lists_levels() {
        let dir = tempdir().unwrap();
        let mut tree = open_order(&dir, 4);
        for k in ["a", "b", "c", "d", "e"] {
            tree.put(k.as_bytes(), k.to_uppercase().as_bytes()).unwrap();
        }

        let dump = tree.dump().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "level 0:");
        // 11 byte header, one 1 byte separator with 6 bytes overhead
        assert!(lines[1].contains("internal 18B [c]"));
        assert_eq!(lines[2], "level 1:");
        assert!(lines[3].contains("leaf 27B [a=A, b=B]"));
        assert!(lines[4].contains("leaf 33B [c=C, d=D, e=E]"));
    }

    #[test]
    fn test_report_display() {
        let report = TreeReport {
            depth: 2,
            node_count: 3,
            leaf_count: 2,
            key_count: 5,
            free_pages: 0,
            page_count: 4,
        };
        assert_eq!(
            report.to_string(),
            "depth: 2, nodes: 3, leaves: 2, keys: 5, free: 0, pages: 4"
        );
    }
}
