//! Page - a slotted page over a fixed-size byte buffer.
//!
//! A [`Page`] owns the raw bytes of one disk block and interprets them in
//! place as a slotted page. Pages are stored in the slots of the buffer
//! pool; all mutations happen directly on the bytes that get written back.
//!
//! ```text
//! +------------+------------------------------------------+
//! | PageHeader | linp1 linp2 linp3 ...                    |
//! +------------+----+-------------------------------------+
//! | ... linpN       |                                     |
//! +-----------------+-------------------------------------+
//! |                 ^ lower                               |
//! |                                                       |
//! |                          v upper                      |
//! +--------------------------+----------------------------+
//! |                          | tupleN ...                 |
//! +--------------------------+-----------+----------------+
//! |        ... tuple3 tuple2 tuple1      | special space  |
//! +--------------------------------------+----------------+
//!                                        ^ special
//! ```

use crate::common::{BufferTag, Error, Result};

use super::item_id::{ItemFlags, ItemId, OffsetNumber};
use super::page_header::{PageFlags, PageHeader};

/// A page of data interpreted as a slotted page.
///
/// The buffer length is fixed at construction and equals the page size
/// recorded in the header once the page is initialised. A zeroed buffer
/// is a "new" page: it has no valid header until [`Page::init`] is called.
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` in production code: copying a page is
/// expensive and should be explicit (`to_bytes`). A `#[cfg(test)]` Clone is
/// provided for tests.
///
/// # Example
/// ```
/// use pagepool::storage::page::{ItemFlags, Page};
///
/// let mut page = Page::new_initialized(100, 0).unwrap();
/// let off = page.add_item(&[7u8; 10], ItemFlags::Normal).unwrap();
/// assert_eq!(page.item(off).unwrap(), &[7u8; 10]);
/// assert_eq!(page.free_space(), 65);
/// ```
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Create a new zeroed (uninitialised) page.
    ///
    /// # Panics
    /// Panics if `page_size` cannot hold a [`PageHeader`].
    pub fn new(page_size: u16) -> Self {
        assert!(
            page_size as usize >= PageHeader::SIZE,
            "page size must hold the page header"
        );
        Self {
            data: vec![0u8; page_size as usize].into_boxed_slice(),
        }
    }

    /// Create a page and lay out an empty slotted page in it.
    ///
    /// # Errors
    /// `Error::InvalidLayout` if the page is too small for the header or
    /// the special space.
    pub fn new_initialized(page_size: u16, special_size: u16) -> Result<Self> {
        let header = PageHeader::new(page_size, special_size)?;
        let mut page = Self::new(page_size);
        page.set_header(&header);
        Ok(page)
    }

    /// Decode and validate a page image.
    ///
    /// # Errors
    /// `Error::CorruptPage` if the length differs from the header's page
    /// size or any offset breaks the layout invariant.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PageHeader::SIZE || bytes.len() > u16::MAX as usize {
            return Err(Error::CorruptPage(format!(
                "buffer length {} is not a valid page size",
                bytes.len()
            )));
        }
        let page = Self {
            data: bytes.to_vec().into_boxed_slice(),
        };
        page.validate()?;
        Ok(page)
    }

    /// Encode the page (header, line pointers, tuple heap, special space).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Length of the underlying buffer.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the page has never been initialised.
    pub fn is_new(&self) -> bool {
        self.header().upper == 0
    }

    /// (Re)initialise the buffer as an empty slotted page.
    ///
    /// All previous content is discarded.
    ///
    /// # Errors
    /// `Error::InvalidLayout` if `special_size` leaves no room after the header.
    pub fn init(&mut self, special_size: u16) -> Result<()> {
        let header = PageHeader::new(self.data.len() as u16, special_size)?;
        self.reset();
        self.set_header(&header);
        Ok(())
    }

    // ========================================================================
    // Header access
    // ========================================================================

    /// Read the page header without validating it.
    #[inline]
    pub fn header(&self) -> PageHeader {
        PageHeader::decode(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Read the header and check the layout invariant.
    fn checked_header(&self) -> Result<PageHeader> {
        let header = self.header();
        header.validate(self.data.len())?;
        Ok(header)
    }

    #[inline]
    pub fn lower(&self) -> u16 {
        self.header().lower
    }

    #[inline]
    pub fn upper(&self) -> u16 {
        self.header().upper
    }

    #[inline]
    pub fn special(&self) -> u16 {
        self.header().special
    }

    #[inline]
    pub fn page_size(&self) -> u16 {
        self.header().page_size
    }

    #[inline]
    pub fn lsn(&self) -> u64 {
        self.header().lsn
    }

    pub fn set_lsn(&mut self, lsn: u64) {
        let mut header = self.header();
        header.lsn = lsn;
        self.set_header(&header);
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        self.header().flags
    }

    pub fn set_flags(&mut self, flags: u16) {
        let mut header = self.header();
        header.flags = flags;
        self.set_header(&header);
    }

    /// Free bytes between the line-pointer array and the tuple heap.
    ///
    /// Always derived from the current header.
    #[inline]
    pub fn free_space(&self) -> u16 {
        self.header().free_space()
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Number of line pointers on the page, including unused ones.
    pub fn item_count(&self) -> u16 {
        let lower = self.header().lower as usize;
        (lower.saturating_sub(PageHeader::SIZE) / ItemId::SIZE) as u16
    }

    /// Append an item to the page.
    ///
    /// The line pointer goes at the end of the item array and the bytes at
    /// the top of the tuple heap. Existing line pointers never move.
    ///
    /// # Returns
    /// The new item's 1-based offset number.
    ///
    /// # Errors
    /// - `Error::PageFull` if the line pointer plus the item do not fit
    /// - `Error::CorruptPage` if the page header is not a valid layout
    pub fn add_item(&mut self, item: &[u8], flags: ItemFlags) -> Result<OffsetNumber> {
        let mut header = self.checked_header()?;

        let needed_lower = header.lower as usize + ItemId::SIZE;
        let needed_upper = header.upper as isize - item.len() as isize;
        if needed_upper < needed_lower as isize {
            return Err(Error::PageFull {
                needed: item.len() + ItemId::SIZE,
                available: header.free_space(),
            });
        }
        let needed_upper = needed_upper as usize;

        let item_id = ItemId::new(needed_upper as u16, flags, item.len() as u16);
        item_id.write_to(&mut self.data[header.lower as usize..needed_lower]);
        self.data[needed_upper..needed_upper + item.len()].copy_from_slice(item);

        header.lower = needed_lower as u16;
        header.upper = needed_upper as u16;
        self.set_header(&header);

        Ok(OffsetNumber(self.item_count()))
    }

    /// Read the line pointer at `offset_number`.
    ///
    /// # Errors
    /// - `Error::ItemNotFound` if the offset number is outside the array
    /// - `Error::CorruptPage` if the header claims more line pointers than
    ///   the buffer holds
    pub fn item_id(&self, offset_number: OffsetNumber) -> Result<ItemId> {
        if offset_number.0 == 0 || offset_number.0 > self.item_count() {
            return Err(Error::ItemNotFound {
                offset_number: offset_number.0,
            });
        }
        let start = PageHeader::SIZE + offset_number.index() * ItemId::SIZE;
        let bytes = self.data.get(start..start + ItemId::SIZE).ok_or_else(|| {
            Error::CorruptPage(format!(
                "line pointer {} at {} lies past the end of a {}-byte page",
                offset_number,
                start,
                self.data.len()
            ))
        })?;
        ItemId::from_bytes(bytes)
    }

    /// Bytes of the item at `offset_number`.
    ///
    /// # Errors
    /// - `Error::ItemNotFound` if there is no item with storage there
    /// - `Error::CorruptPage` if the header is not a valid layout or the line
    ///   pointer points outside the heap
    pub fn item(&self, offset_number: OffsetNumber) -> Result<&[u8]> {
        let header = self.checked_header()?;
        let item_id = self.item_id(offset_number)?;
        if !item_id.flags.has_storage() {
            return Err(Error::ItemNotFound {
                offset_number: offset_number.0,
            });
        }
        if item_id.offset < header.upper || item_id.end() > header.special as usize {
            return Err(Error::CorruptPage(format!(
                "item {} at {}..{} lies outside the tuple heap",
                offset_number,
                item_id.offset,
                item_id.end()
            )));
        }
        Ok(&self.data[item_id.offset as usize..item_id.end()])
    }

    /// Iterate over all items that still have storage, in line-pointer order.
    ///
    /// Unused line pointers are skipped. Anything unreadable yields
    /// `Error::CorruptPage` in its place.
    pub fn items(&self) -> impl Iterator<Item = Result<(OffsetNumber, &[u8])>> + '_ {
        (1..=self.item_count())
            .map(OffsetNumber)
            .filter_map(move |off| match self.item_id(off) {
                Ok(item_id) if !item_id.flags.has_storage() => None,
                Ok(_) => Some(self.item(off).map(|bytes| (off, bytes))),
                Err(e) => Some(Err(e)),
            })
    }

    /// Mark the line pointer at `offset_number` unused.
    ///
    /// The tuple bytes are left in place; no compaction happens, so every
    /// other offset number stays valid.
    ///
    /// # Errors
    /// `Error::ItemNotFound` if the offset number is outside the array.
    pub fn mark_item_unused(&mut self, offset_number: OffsetNumber) -> Result<()> {
        self.item_id(offset_number)?;

        let start = PageHeader::SIZE + offset_number.index() * ItemId::SIZE;
        ItemId::default().write_to(&mut self.data[start..start + ItemId::SIZE]);

        let mut header = self.header();
        header.flags |= PageFlags::HAS_FREE_LINES;
        self.set_header(&header);
        Ok(())
    }

    // ========================================================================
    // Special space
    // ========================================================================

    /// The reserved region `[special, page_size)`.
    pub fn special_space(&self) -> &[u8] {
        let special = (self.header().special as usize).min(self.data.len());
        &self.data[special..]
    }

    /// Mutable access to the reserved region `[special, page_size)`.
    pub fn special_space_mut(&mut self) -> &mut [u8] {
        let special = (self.header().special as usize).min(self.data.len());
        &mut self.data[special..]
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Full structural check: header bounds plus every line pointer.
    ///
    /// # Errors
    /// `Error::CorruptPage` naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        let header = self.checked_header()?;
        let count = self.item_count();

        for n in 1..=count {
            let item_id = self.item_id(OffsetNumber(n))?;
            match item_id.flags {
                ItemFlags::Normal | ItemFlags::Dead => {
                    if item_id.offset < header.upper || item_id.end() > header.special as usize
                    {
                        return Err(Error::CorruptPage(format!(
                            "item {} at {}..{} lies outside the tuple heap {}..{}",
                            n,
                            item_id.offset,
                            item_id.end(),
                            header.upper,
                            header.special
                        )));
                    }
                }
                ItemFlags::Redirect => {
                    if item_id.offset == 0 || item_id.offset > count {
                        return Err(Error::CorruptPage(format!(
                            "item {} redirects to missing item {}",
                            n, item_id.offset
                        )));
                    }
                }
                ItemFlags::Unused => {}
            }
        }
        Ok(())
    }

    /// Compute the checksum this page should carry when stored at `tag`.
    pub fn compute_checksum(&self, tag: BufferTag) -> u16 {
        PageHeader::compute_checksum(&self.data, tag)
    }

    /// Compute and store the checksum in the header.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn set_checksum(&mut self, tag: BufferTag) {
        let mut header = self.header();
        header.checksum = self.compute_checksum(tag);
        self.set_header(&header);
    }

    /// Verify the page checksum is valid.
    pub fn verify_checksum(&self, tag: BufferTag) -> bool {
        self.header().verify_checksum(&self.data, tag)
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
