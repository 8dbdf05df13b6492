//! File header - the metadata record stored in page 0.

use crate::common::config::{FORMAT_VERSION, MAGIC};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

/// Persistent tree metadata.
///
/// # Layout (page 0, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       5     PageHeader (type = Meta, CRC32 of the whole page)
/// 5       8     magic "BTREEDB\0"
/// 13      2     format version
/// 15      4     page size
/// 19      4     root page id
/// 23      4     depth (1 = root is a leaf)
/// 27      8     key count
/// 35      4     free-list head (INVALID = empty)
/// 39      4     free page count
/// 43      4     max key size
/// 47      4     max value size
/// 51      4     order
/// 55      4     comparator fingerprint
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub page_size: u32,
    pub root: PageId,
    pub depth: u32,
    pub key_count: u64,
    pub free_list_head: PageId,
    pub free_page_count: u32,
    pub max_key_size: u32,
    pub max_value_size: u32,
    pub order: u32,
    pub comparator_id: u32,
}

impl FileHeader {
    const OFFSET_MAGIC: usize = PageHeader::SIZE;
    const OFFSET_VERSION: usize = 13;
    const OFFSET_PAGE_SIZE: usize = 15;
    const OFFSET_ROOT: usize = 19;
    const OFFSET_DEPTH: usize = 23;
    const OFFSET_KEY_COUNT: usize = 27;
    const OFFSET_FREE_HEAD: usize = 35;
    const OFFSET_FREE_COUNT: usize = 39;
    const OFFSET_MAX_KEY: usize = 43;
    const OFFSET_MAX_VALUE: usize = 47;
    const OFFSET_ORDER: usize = 51;
    const OFFSET_COMPARATOR: usize = 55;

    /// Number of meaningful bytes at the start of page 0.
    pub const ENCODED_SIZE: usize = 59;

    /// Header for a freshly created tree. The root is filled in once the
    /// first leaf is allocated.
    pub fn new(
        page_size: usize,
        max_key_size: usize,
        max_value_size: usize,
        order: usize,
        comparator_id: u32,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            page_size: page_size as u32,
            root: PageId::INVALID,
            depth: 1,
            key_count: 0,
            free_list_head: PageId::INVALID,
            free_page_count: 0,
            max_key_size: max_key_size as u32,
            max_value_size: max_value_size as u32,
            order: order as u32,
            comparator_id,
        }
    }

    /// Read only the page size from the leading bytes of a file.
    ///
    /// Used before the full page 0 can be read, since reading it needs the
    /// page size.
    ///
    /// # Errors
    /// Returns `Error::Corruption` if the magic or version is wrong.
    pub fn peek_page_size(prefix: &[u8]) -> Result<usize> {
        if prefix.len() < Self::ENCODED_SIZE {
            return Err(Error::corruption("file header truncated"));
        }
        if PageType::from_u8(prefix[0]) != PageType::Meta {
            return Err(Error::corruption("page 0 is not a header page"));
        }
        if prefix[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 8] != MAGIC {
            return Err(Error::corruption("bad magic in file header"));
        }
        let version = u16::from_le_bytes([
            prefix[Self::OFFSET_VERSION],
            prefix[Self::OFFSET_VERSION + 1],
        ]);
        if version != FORMAT_VERSION {
            return Err(Error::InvalidConfig(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&prefix[Self::OFFSET_PAGE_SIZE..Self::OFFSET_PAGE_SIZE + 4]);
        Ok(u32::from_le_bytes(buf) as usize)
    }

    /// Decode the header from page 0.
    ///
    /// # Errors
    /// Returns `Error::Corruption` on a checksum, tag or magic mismatch, and
    /// `Error::InvalidConfig` on an unsupported version.
    pub fn decode(page: &Page) -> Result<Self> {
        Self::peek_page_size(page.as_slice())?;
        if !page.verify_checksum() {
            return Err(Error::corruption("file header checksum mismatch"));
        }

        let header = Self {
            version: page.read_u16(Self::OFFSET_VERSION),
            page_size: page.read_u32(Self::OFFSET_PAGE_SIZE),
            root: PageId::new(page.read_u32(Self::OFFSET_ROOT)),
            depth: page.read_u32(Self::OFFSET_DEPTH),
            key_count: page.read_u64(Self::OFFSET_KEY_COUNT),
            free_list_head: PageId::new(page.read_u32(Self::OFFSET_FREE_HEAD)),
            free_page_count: page.read_u32(Self::OFFSET_FREE_COUNT),
            max_key_size: page.read_u32(Self::OFFSET_MAX_KEY),
            max_value_size: page.read_u32(Self::OFFSET_MAX_VALUE),
            order: page.read_u32(Self::OFFSET_ORDER),
            comparator_id: page.read_u32(Self::OFFSET_COMPARATOR),
        };

        if header.page_size as usize != page.size() {
            return Err(Error::corruption(format!(
                "header page size {} does not match page buffer of {}",
                header.page_size,
                page.size()
            )));
        }
        if !header.root.is_valid() || header.root == PageId::HEADER || header.depth == 0 {
            return Err(Error::corruption(format!(
                "header has invalid root {} at depth {}",
                header.root, header.depth
            )));
        }
        Ok(header)
    }

    /// Encode the header into a fresh page 0 with checksum.
    pub fn encode(&self) -> Page {
        let mut page = Page::typed(self.page_size as usize, PageType::Meta);
        page.as_mut_slice()[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 8].copy_from_slice(&MAGIC);
        page.write_u16(Self::OFFSET_VERSION, self.version);
        page.write_u32(Self::OFFSET_PAGE_SIZE, self.page_size);
        page.write_u32(Self::OFFSET_ROOT, self.root.0);
        page.write_u32(Self::OFFSET_DEPTH, self.depth);
        page.write_u64(Self::OFFSET_KEY_COUNT, self.key_count);
        page.write_u32(Self::OFFSET_FREE_HEAD, self.free_list_head.0);
        page.write_u32(Self::OFFSET_FREE_COUNT, self.free_page_count);
        page.write_u32(Self::OFFSET_MAX_KEY, self.max_key_size);
        page.write_u32(Self::OFFSET_MAX_VALUE, self.max_value_size);
        page.write_u32(Self::OFFSET_ORDER, self.order);
        page.write_u32(Self::OFFSET_COMPARATOR, self.comparator_id);
        page.update_checksum();
        page
    }
}
