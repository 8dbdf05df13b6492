//! In-order traversal along the leaf chain.

use super::comparator::KeyComparator;
use super::node::Entry;
use super::tree::BPlusTree;
use crate::common::{Error, PageId, Result};

/// Iterator over all `(key, value)` pairs in key order.
///
/// Created by [`BPlusTree::iter`]. Starts at the leftmost leaf and follows
/// `next` links, reading one leaf at a time. A read error is yielded once
/// and ends the iteration.
pub struct Iter<'a, C: KeyComparator> {
    tree: &'a mut BPlusTree<C>,
    entries: std::vec::IntoIter<Entry>,
    next_leaf: PageId,
    leaves_left: u32,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Running,
    Done,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Iterate over every entry in key order.
    ///
    /// # Example
    /// ```no_run
    /// use btreedb::{BPlusTree, TreeOptions};
    ///
    /// let mut tree = BPlusTree::open("index.db", TreeOptions::default()).unwrap();
    /// for item in tree.iter() {
    ///     let (key, value) = item.unwrap();
    ///     println!("{:?} => {:?}", key, value);
    /// }
    /// ```
    pub fn iter(&mut self) -> Iter<'_, C> {
        let leaves_left = self.store.page_count();
        Iter {
            tree: self,
            entries: Vec::new().into_iter(),
            next_leaf: PageId::INVALID,
            leaves_left,
            state: State::Start,
        }
    }
}

impl<C: KeyComparator> Iter<'_, C> {
    fn fail(&mut self, err: Error) -> Option<Result<(Vec<u8>, Vec<u8>)>> {
        self.state = State::Done;
        Some(Err(err))
    }
}

impl<C: KeyComparator> Iterator for Iter<'_, C> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            State::Done => return None,
            State::Start => {
                self.state = State::Running;
                match self.tree.leftmost_leaf() {
                    Ok((_, leaf)) => {
                        self.next_leaf = leaf.next;
                        self.entries = leaf.entries.into_iter();
                    }
                    Err(e) => return self.fail(e),
                }
            }
            State::Running => {}
        }

        loop {
            if let Some(entry) = self.entries.next() {
                return Some(Ok((entry.key, entry.value)));
            }
            if !self.next_leaf.is_valid() {
                self.state = State::Done;
                return None;
            }
            if self.leaves_left == 0 {
                return self.fail(Error::corruption("leaf chain does not terminate"));
            }
            self.leaves_left -= 1;

            match self.tree.load_leaf(self.next_leaf) {
                Ok(leaf) => {
                    self.next_leaf = leaf.next;
                    self.entries = leaf.entries.into_iter();
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}
