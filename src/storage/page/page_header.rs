//! The 5-byte header at the start of every page: a kind tag and a CRC32.

/// Kind of a page, stored as the first byte.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Zeroed, never written, or unrecognized tag.
    #[default]
    Invalid = 0,
    /// File header (page 0).
    Meta = 1,
    BTreeInternal = 2,
    BTreeLeaf = 3,
    /// Record on the free list.
    Free = 4,
}

impl PageType {
    /// Decode a tag byte. Unknown tags map to `Invalid`.
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => PageType::Meta,
            2 => PageType::BTreeInternal,
            3 => PageType::BTreeLeaf,
            4 => PageType::Free,
            _ => PageType::Invalid,
        }
    }

    /// Whether pages of this kind hold a tree node.
    pub fn is_node(self) -> bool {
        matches!(self, PageType::BTreeInternal | PageType::BTreeLeaf)
    }
}

/// Tag and checksum of a page.
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     page type tag
/// 1       4     CRC32 of the page with this field zeroed (little-endian)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
}

impl PageHeader {
    pub const SIZE: usize = 5;

    pub const OFFSET_PAGE_TYPE: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 1;

    /// Header with a zero checksum, to be stamped once the page is filled.
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            checksum: 0,
        }
    }

    /// Read a header from the first [`SIZE`](Self::SIZE) bytes of `data`.
    ///
    /// # Panics
    /// Panics if `data` is shorter than the header. Pages are never that
    /// small.
    pub fn from_bytes(data: &[u8]) -> Self {
        let c = Self::OFFSET_CHECKSUM;
        Self {
            page_type: PageType::from_u8(data[Self::OFFSET_PAGE_TYPE]),
            checksum: u32::from_le_bytes([data[c], data[c + 1], data[c + 2], data[c + 3]]),
        }
    }

    /// Write this header over the first [`SIZE`](Self::SIZE) bytes of `data`.
    pub fn write_to(&self, data: &mut [u8]) {
        data[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        data[Self::OFFSET_CHECKSUM..Self::SIZE].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// CRC32 over a whole page, reading the checksum field as zeros.
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&page_data[Self::SIZE..]);
        hasher.finalize()
    }

    pub fn verify_checksum(&self, page_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page_data)
    }
}
