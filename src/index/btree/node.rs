//! B+-tree nodes and their page codec.
//!
//! A [`Node`] is the decoded view of one page. Leaves hold sorted
//! (key, value) entries plus sibling links; internal nodes hold separator
//! keys and child page ids. Parent links are never stored.

use crate::common::{Error, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

/// Leaf layout after the page header:
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 5       2     entry count
/// 7       4     previous leaf (INVALID = none)
/// 11      4     next leaf (INVALID = none)
/// 15      ...   entries: [key_len u16][key][value_len u16][value]
/// ```
pub const LEAF_HEADER_SIZE: usize = PageHeader::SIZE + 2 + 4 + 4;

/// Internal layout after the page header:
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 5       2     key count (k)
/// 7       4     child 0
/// 11      ...   k × [key_len u16][key][child u32]
/// ```
pub const INTERNAL_HEADER_SIZE: usize = PageHeader::SIZE + 2 + 4;

const OFFSET_COUNT: usize = PageHeader::SIZE;
const OFFSET_PREV: usize = PageHeader::SIZE + 2;
const OFFSET_NEXT: usize = PageHeader::SIZE + 6;
const OFFSET_FIRST_CHILD: usize = PageHeader::SIZE + 2;

/// Per-entry overhead in a leaf (two length prefixes).
const LEAF_ENTRY_OVERHEAD: usize = 4;

/// Per-key overhead in an internal node (length prefix + child id).
const INTERNAL_ENTRY_OVERHEAD: usize = 2 + 4;

/// Maximum number of leaf entries that always fit a page.
pub fn leaf_capacity(page_size: usize, max_key_size: usize, max_value_size: usize) -> usize {
    page_size.saturating_sub(LEAF_HEADER_SIZE)
        / (LEAF_ENTRY_OVERHEAD + max_key_size + max_value_size)
}

/// Maximum number of internal children that always fit a page.
pub fn internal_capacity(page_size: usize, max_key_size: usize) -> usize {
    1 + page_size.saturating_sub(INTERNAL_HEADER_SIZE) / (INTERNAL_ENTRY_OVERHEAD + max_key_size)
}

/// Largest order for which any node of maximum-size keys and values
/// still encodes into one page.
pub fn page_order(page_size: usize, max_key_size: usize, max_value_size: usize) -> usize {
    leaf_capacity(page_size, max_key_size, max_value_size)
        .min(internal_capacity(page_size, max_key_size))
}

/// A key-value pair stored in a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn encoded_size(&self) -> usize {
        LEAF_ENTRY_OVERHEAD + self.key.len() + self.value.len()
    }
}

/// A leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub prev: PageId,
    pub next: PageId,
    pub entries: Vec<Entry>,
}

impl LeafNode {
    /// An empty leaf with no siblings.
    pub fn new() -> Self {
        Self {
            prev: PageId::INVALID,
            next: PageId::INVALID,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn encoded_size(&self) -> usize {
        LEAF_HEADER_SIZE + self.entries.iter().map(Entry::encoded_size).sum::<usize>()
    }

    /// Encode into a leaf page. See [`Node::encode`].
    pub fn encode(&self, page_size: usize) -> Result<Page> {
        let mut page = blank_page(PageType::BTreeLeaf, self.encoded_size(), page_size)?;
        page.write_u16(OFFSET_COUNT, count_u16(self.entries.len())?);
        page.write_u32(OFFSET_PREV, self.prev.0);
        page.write_u32(OFFSET_NEXT, self.next.0);

        let mut writer = Writer::new(&mut page, LEAF_HEADER_SIZE);
        for entry in &self.entries {
            writer.bytes(&entry.key)?;
            writer.bytes(&entry.value)?;
        }

        page.update_checksum();
        Ok(page)
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// An internal node. `children.len() == keys.len() + 1`.
///
/// Child `i` covers keys in `[keys[i - 1], keys[i])`; the separator is an
/// inclusive lower bound of the subtree to its right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<PageId>,
}

impl InternalNode {
    /// A node with a single separator between two children, as created
    /// when the root splits.
    pub fn new_root(separator: Vec<u8>, left: PageId, right: PageId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    pub fn encoded_size(&self) -> usize {
        INTERNAL_HEADER_SIZE
            + self
                .keys
                .iter()
                .map(|k| INTERNAL_ENTRY_OVERHEAD + k.len())
                .sum::<usize>()
    }

    /// Encode into an internal page. See [`Node::encode`].
    pub fn encode(&self, page_size: usize) -> Result<Page> {
        if self.children.len() != self.keys.len() + 1 {
            return Err(Error::corruption(format!(
                "internal node with {} keys and {} children",
                self.keys.len(),
                self.children.len()
            )));
        }

        let mut page = blank_page(PageType::BTreeInternal, self.encoded_size(), page_size)?;
        page.write_u16(OFFSET_COUNT, count_u16(self.keys.len())?);
        page.write_u32(OFFSET_FIRST_CHILD, self.children[0].0);

        let mut writer = Writer::new(&mut page, INTERNAL_HEADER_SIZE);
        for (key, child) in self.keys.iter().zip(&self.children[1..]) {
            writer.bytes(key)?;
            writer.u32(child.0);
        }

        page.update_checksum();
        Ok(page)
    }
}

/// Decoded view of a node page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    /// Number of bytes the node occupies once encoded.
    pub fn encoded_size(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.encoded_size(),
            Node::Internal(internal) => internal.encoded_size(),
        }
    }

    /// Decode a node page.
    ///
    /// # Errors
    /// Returns `Error::Corruption` if the checksum does not match, the tag
    /// is not a node kind, or any count or length runs past the page.
    pub fn decode(page: &Page) -> Result<Node> {
        let header = page.header();
        if !page.verify_checksum() {
            return Err(Error::corruption(format!(
                "checksum mismatch on {:?} page",
                header.page_type
            )));
        }

        if !header.page_type.is_node() {
            return Err(Error::corruption(format!(
                "expected a node page, found {:?}",
                header.page_type
            )));
        }
        if header.page_type == PageType::BTreeLeaf {
            Self::decode_leaf(page).map(Node::Leaf)
        } else {
            Self::decode_internal(page).map(Node::Internal)
        }
    }

    fn decode_leaf(page: &Page) -> Result<LeafNode> {
        let count = page.read_u16(OFFSET_COUNT) as usize;
        let mut reader = Reader::new(page, LEAF_HEADER_SIZE);

        if count * LEAF_ENTRY_OVERHEAD > page.size() - LEAF_HEADER_SIZE {
            return Err(Error::corruption(format!(
                "leaf entry count {} exceeds page capacity",
                count
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = reader.bytes()?;
            let value = reader.bytes()?;
            entries.push(Entry { key, value });
        }

        Ok(LeafNode {
            prev: PageId::new(page.read_u32(OFFSET_PREV)),
            next: PageId::new(page.read_u32(OFFSET_NEXT)),
            entries,
        })
    }

    fn decode_internal(page: &Page) -> Result<InternalNode> {
        let count = page.read_u16(OFFSET_COUNT) as usize;

        if count * INTERNAL_ENTRY_OVERHEAD > page.size() - INTERNAL_HEADER_SIZE {
            return Err(Error::corruption(format!(
                "internal key count {} exceeds page capacity",
                count
            )));
        }

        let mut keys = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count + 1);
        children.push(child_id(page.read_u32(OFFSET_FIRST_CHILD))?);

        let mut reader = Reader::new(page, INTERNAL_HEADER_SIZE);
        for _ in 0..count {
            keys.push(reader.bytes()?);
            children.push(child_id(reader.u32()?)?);
        }

        Ok(InternalNode { keys, children })
    }

    /// Encode into a fresh page with checksum.
    ///
    /// # Errors
    /// - `Error::ResourceExhausted` if the node does not fit `page_size`
    /// - `Error::Corruption` for an internal node whose child count is not
    ///   its key count plus one
    pub fn encode(&self, page_size: usize) -> Result<Page> {
        match self {
            Node::Leaf(leaf) => leaf.encode(page_size),
            Node::Internal(internal) => internal.encode(page_size),
        }
    }
}

fn blank_page(page_type: PageType, size: usize, page_size: usize) -> Result<Page> {
    if size > page_size {
        return Err(Error::ResourceExhausted(format!(
            "node of {} bytes does not fit a {} byte page",
            size, page_size
        )));
    }
    Ok(Page::typed(page_size, page_type))
}

fn child_id(raw: u32) -> Result<PageId> {
    let id = PageId::new(raw);
    if !id.is_valid() || id == PageId::HEADER {
        return Err(Error::corruption(format!(
            "internal node points at {}",
            id
        )));
    }
    Ok(id)
}

fn count_u16(count: usize) -> Result<u16> {
    u16::try_from(count)
        .map_err(|_| Error::ResourceExhausted(format!("{} entries exceed a node", count)))
}

/// Bounds-checked cursor over a page being decoded.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(page: &'a Page, pos: usize) -> Self {
        Self {
            data: page.as_slice(),
            pos,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(Error::corruption(format!(
                "node runs past the page end at offset {}",
                self.pos
            ))),
        }
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let raw = self.take(2)?;
        let len = u16::from_le_bytes([raw[0], raw[1]]) as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Cursor over a page being encoded. Sizes are checked up front by
/// `encoded_size`, so writes cannot overrun.
struct Writer<'a> {
    page: &'a mut Page,
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(page: &'a mut Page, pos: usize) -> Self {
        Self { page, pos }
    }

    fn u32(&mut self, value: u32) {
        self.page.write_u32(self.pos, value);
        self.pos += 4;
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u16::try_from(bytes.len()).map_err(|_| {
            Error::ResourceExhausted(format!("{} byte field exceeds u16 length", bytes.len()))
        })?;
        self.page.write_u16(self.pos, len);
        self.pos += 2;
        self.page.as_mut_slice()[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}
