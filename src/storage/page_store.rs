//! Page Store - page-granular file I/O, allocation and page recycling.
//!
//! The [`PageStore`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating pages (free list first, then file growth)
//! - Freeing pages onto an in-file free list
//! - Reading and writing the file header in page 0

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use tracing::trace;

use crate::common::config::{MAX_PAGES, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};
use crate::storage::{FileHeader, PageStoreStats};

/// Offset of the next-free pointer inside a free-list record.
const FREE_NEXT_OFFSET: usize = PageHeader::SIZE;

/// Manages page I/O for a single tree file.
///
/// # File Layout
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0   │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (header) │ (node)  │ (free)  │         │ (node)  │
/// └──────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0   page_size  2×page_size  ...  N×page_size
/// ```
///
/// # Free List
/// Freed pages are overwritten with a free-list record (`PageType::Free`
/// plus the id of the next free page) and pushed on a singly linked list
/// whose head lives in the file header. Allocation pops the head before
/// growing the file, so page ids are recycled and the list costs no extra
/// pages.
///
/// # Thread Safety
/// `PageStore` is **single-threaded**. Callers serialize access.
///
/// # Durability
/// Writes reach the OS immediately but are only forced to disk by
/// [`sync`](Self::sync), or after every write when `sync_on_write` is set.
pub struct PageStore {
    file: File,
    page_size: usize,
    /// Number of pages in the file, including the header page.
    page_count: u32,
    free_list_head: PageId,
    free_page_count: u32,
    sync_on_write: bool,
    stats: PageStoreStats,
}

impl PageStore {
    /// Create a new store in an empty (or missing) file.
    ///
    /// Page 0 is reserved and zero-filled; the caller is expected to write a
    /// [`FileHeader`] into it.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the file already holds data.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize, sync_on_write: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        if file.metadata()?.len() != 0 {
            return Err(Error::InvalidConfig(format!(
                "{} is not empty",
                path.as_ref().display()
            )));
        }

        let mut store = Self {
            file,
            page_size,
            page_count: 0,
            free_list_head: PageId::INVALID,
            free_page_count: 0,
            sync_on_write,
            stats: PageStoreStats::new(),
        };

        // Reserve page 0 for the header
        store.extend_file()?;
        Ok(store)
    }

    /// Open an existing store and decode its header.
    ///
    /// The page size is discovered from the header, so it does not need to
    /// be known up front. The free list state is restored from the header.
    ///
    /// # Errors
    /// - `Error::Io` if the file cannot be opened or read
    /// - `Error::Corruption` if the header is damaged or the file length is
    ///   not a whole number of pages
    pub fn open<P: AsRef<Path>>(path: P, sync_on_write: bool) -> Result<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let file_size = file.metadata()?.len();

        if file_size < FileHeader::ENCODED_SIZE as u64 {
            return Err(Error::corruption(format!(
                "file of {} bytes is too short to hold a header",
                file_size
            )));
        }

        let mut prefix = [0u8; FileHeader::ENCODED_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut prefix)?;
        let page_size = FileHeader::peek_page_size(&prefix)?;

        if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::corruption(format!(
                "header records unusable page size {}",
                page_size
            )));
        }
        if file_size % page_size as u64 != 0 {
            return Err(Error::corruption(format!(
                "file size {} is not a multiple of the page size {}",
                file_size, page_size
            )));
        }
        let page_count = file_size / page_size as u64;
        if page_count > MAX_PAGES {
            return Err(Error::corruption("file holds more pages than ids allow"));
        }

        let mut store = Self {
            file,
            page_size,
            page_count: page_count as u32,
            free_list_head: PageId::INVALID,
            free_page_count: 0,
            sync_on_write,
            stats: PageStoreStats::new(),
        };

        let header = store.read_header()?;
        if header.free_list_head.is_valid() {
            store.check_bounds(header.free_list_head)?;
        }
        store.free_list_head = header.free_list_head;
        store.free_page_count = header.free_page_count;

        Ok((store, header))
    }

    // ========================================================================
    // Page I/O
    // ========================================================================

    /// Read a page that is in use.
    ///
    /// # Errors
    /// Returns `Error::Corruption` for page 0, an id past the end of the
    /// file, or a page sitting on the free list. A stale id is a caller bug;
    /// it is reported rather than trusted.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.check_bounds(page_id)?;
        let page = self.read_raw(page_id)?;
        if page.page_type() == PageType::Free {
            return Err(Error::corruption(format!(
                "read of {} which is on the free list",
                page_id
            )));
        }
        Ok(page)
    }

    /// Write a node or free-list page.
    ///
    /// # Errors
    /// Returns `Error::Corruption` for page 0 or an id that was never
    /// allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.check_bounds(page_id)?;
        self.write_raw(page_id, page)
    }

    /// Read and decode the file header from page 0.
    pub fn read_header(&mut self) -> Result<FileHeader> {
        let page = self.read_raw(PageId::HEADER)?;
        FileHeader::decode(&page)
    }

    /// Encode and write the file header into page 0.
    pub fn write_header(&mut self, header: &FileHeader) -> Result<()> {
        debug_assert_eq!(header.page_size as usize, self.page_size);
        let page = header.encode();
        self.write_raw(PageId::HEADER, &page)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate a page for a new node.
    ///
    /// Pops the free list if it is non-empty, otherwise grows the file by one
    /// zeroed page. The returned page's contents are unspecified; the caller
    /// must write it before reading it.
    ///
    /// # Errors
    /// - `Error::ResourceExhausted` if the page-id space is used up
    /// - `Error::Corruption` if the free-list head is not a free-list record
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if self.free_list_head.is_valid() {
            let page_id = self.free_list_head;
            self.check_bounds(page_id)?;
            let page = self.read_raw(page_id)?;

            if page.header().page_type != PageType::Free || !page.verify_checksum() {
                return Err(Error::corruption(format!(
                    "free list head {} is not a free-list record",
                    page_id
                )));
            }

            let next = PageId::new(page.read_u32(FREE_NEXT_OFFSET));
            if next.is_valid() {
                self.check_bounds(next)?;
            }

            self.free_list_head = next;
            self.free_page_count = self.free_page_count.saturating_sub(1);
            self.stats.pages_reused.fetch_add(1, Ordering::Relaxed);
            trace!(page = page_id.0, next = next.0, "page_store.allocate.reuse");
            return Ok(page_id);
        }

        let page_id = self.extend_file()?;
        self.stats.pages_allocated.fetch_add(1, Ordering::Relaxed);
        trace!(page = page_id.0, "page_store.allocate.extend");
        Ok(page_id)
    }

    /// Return a page to the free list.
    ///
    /// The page is overwritten with a free-list record pointing at the
    /// previous head. The caller must not use `page_id` again until it is
    /// handed out by [`allocate_page`](Self::allocate_page).
    ///
    /// # Errors
    /// Returns `Error::Corruption` for page 0, an out-of-range id, or a page
    /// that is already on the free list.
    pub fn free_page(&mut self, page_id: PageId) -> Result<()> {
        self.check_bounds(page_id)?;
        let current = self.read_raw(page_id)?;
        if current.header().page_type == PageType::Free && current.verify_checksum() {
            return Err(Error::corruption(format!("double free of {}", page_id)));
        }

        let mut record = Page::typed(self.page_size, PageType::Free);
        record.write_u32(FREE_NEXT_OFFSET, self.free_list_head.0);
        record.update_checksum();
        self.write_raw(page_id, &record)?;

        trace!(page = page_id.0, next = self.free_list_head.0, "page_store.free");
        self.free_list_head = page_id;
        self.free_page_count += 1;
        self.stats.pages_freed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Follow the free list and collect every page on it.
    ///
    /// # Errors
    /// Returns `Error::Corruption` if the list contains a non-free page, a
    /// cycle, or more entries than the recorded count.
    pub fn free_list(&mut self) -> Result<Vec<PageId>> {
        let mut pages = Vec::with_capacity(self.free_page_count as usize);
        let mut cursor = self.free_list_head;

        while cursor.is_valid() {
            if pages.len() >= self.free_page_count as usize {
                return Err(Error::corruption(format!(
                    "free list is longer than its recorded count of {}",
                    self.free_page_count
                )));
            }
            self.check_bounds(cursor)?;
            let page = self.read_raw(cursor)?;
            if page.header().page_type != PageType::Free || !page.verify_checksum() {
                return Err(Error::corruption(format!(
                    "{} is linked in the free list but is not free",
                    cursor
                )));
            }
            pages.push(cursor);
            cursor = PageId::new(page.read_u32(FREE_NEXT_OFFSET));
        }

        if pages.len() != self.free_page_count as usize {
            return Err(Error::corruption(format!(
                "free list holds {} pages, header says {}",
                pages.len(),
                self.free_page_count
            )));
        }
        Ok(pages)
    }

    /// Force all written pages to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Page size in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages in the file, including the header page.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Total size of the file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (self.page_size as u64)
    }

    /// Head of the free list (`PageId::INVALID` when empty).
    #[inline]
    pub fn free_list_head(&self) -> PageId {
        self.free_list_head
    }

    /// Number of pages currently on the free list.
    #[inline]
    pub fn free_page_count(&self) -> u32 {
        self.free_page_count
    }

    /// I/O and allocation counters.
    pub fn stats(&self) -> &PageStoreStats {
        &self.stats
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn check_bounds(&self, page_id: PageId) -> Result<()> {
        if page_id == PageId::HEADER || page_id.0 >= self.page_count {
            return Err(Error::corruption(format!(
                "{} is outside the allocated range 1..{}",
                page_id, self.page_count
            )));
        }
        Ok(())
    }

    fn read_raw(&mut self, page_id: PageId) -> Result<Page> {
        self.file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;

        let mut page = Page::new(self.page_size);
        self.file.read_exact(page.as_mut_slice())?;

        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);
        Ok(page)
    }

    fn write_raw(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if page.size() != self.page_size {
            return Err(Error::corruption(format!(
                "page buffer of {} bytes written to a store of {} byte pages",
                page.size(),
                self.page_size
            )));
        }

        self.file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        self.file.write_all(page.as_slice())?;
        if self.sync_on_write {
            self.file.sync_data()?;
        }

        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Grow the file by one zeroed page.
    fn extend_file(&mut self) -> Result<PageId> {
        if self.page_count as u64 >= MAX_PAGES {
            return Err(Error::ResourceExhausted(format!(
                "page id space exhausted at {} pages",
                self.page_count
            )));
        }

        let page_id = PageId::new(self.page_count);
        self.file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        self.file.write_all(&vec![0u8; self.page_size])?;
        if self.sync_on_write {
            self.file.sync_all()?;
        }

        self.page_count += 1;
        Ok(page_id)
    }
}
