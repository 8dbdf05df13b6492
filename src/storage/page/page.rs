//! In-memory image of one on-disk page.

use super::page_header::{PageHeader, PageType};

/// One page worth of bytes, sized by the tree's page size.
///
/// All integer fields inside a page are little-endian. Every encoder stamps
/// the checksum last via [`Page::update_checksum`]; readers check it with
/// [`Page::verify_checksum`] before trusting anything past the header.
///
/// `Page` is deliberately not `Clone`; node code works on decoded nodes and
/// re-encodes rather than copying buffers.
///
/// ```
/// use btreedb::storage::page::{Page, PageType};
///
/// let mut page = Page::typed(512, PageType::BTreeLeaf);
/// page.write_u16(5, 3);
/// page.update_checksum();
/// assert!(page.verify_checksum());
/// assert_eq!(page.page_type(), PageType::BTreeLeaf);
/// ```
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// A zeroed page of `page_size` bytes. Its tag reads as `Invalid`.
    pub fn new(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// A zeroed page already tagged with `page_type`, checksum unset.
    pub fn typed(page_size: usize, page_type: PageType) -> Self {
        let mut page = Self::new(page_size);
        page.set_header(&PageHeader::new(page_type));
        page
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// The tag byte, without looking at the checksum.
    pub fn page_type(&self) -> PageType {
        PageType::from_u8(self.data[PageHeader::OFFSET_PAGE_TYPE])
    }

    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Stamp the CRC32 of the current contents. Must be the last write.
    pub fn update_checksum(&mut self) {
        let checksum = PageHeader::compute_checksum(&self.data);
        self.write_u32(PageHeader::OFFSET_CHECKSUM, checksum);
    }

    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let b = &self.data[offset..offset + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    #[inline]
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_type", &self.page_type())
            .field("size", &self.size())
            .finish()
    }
}
