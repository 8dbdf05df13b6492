//! Page numbers within the tree file.

use std::fmt;

/// Index of a page in the tree file; page `n` starts at byte `n * page_size`.
///
/// Page 0 is always the file header, so nodes and free records live at 1 and
/// above. `u32::MAX` is reserved as the on-disk "no page" marker used for
/// missing leaf siblings and the end of the free list.
///
/// ```
/// use btreedb::PageId;
///
/// assert_eq!(PageId::new(3).offset(1024), 3072);
/// assert_eq!(PageId::INVALID.to_option(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub const INVALID: PageId = PageId(u32::MAX);
    pub const HEADER: PageId = PageId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// False only for [`PageId::INVALID`].
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Maps the "no page" marker to `None`.
    #[inline]
    pub fn to_option(self) -> Option<PageId> {
        self.is_valid().then_some(self)
    }

    #[inline]
    pub fn offset(self, page_size: usize) -> u64 {
        u64::from(self.0) * page_size as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_option() {
            Some(id) => write!(f, "Page({})", id.0),
            None => f.write_str("Page(INVALID)"),
        }
    }
}
