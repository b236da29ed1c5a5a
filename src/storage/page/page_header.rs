//! Page header and page-level flag definitions.
//!
//! Every slotted page starts with a [`PageHeader`] describing where its
//! free space begins and ends:
//! - LSN for WAL/recovery (maintained by the caller)
//! - checksum of the page contents
//! - `lower`/`upper`/`special` boundaries of the slotted layout

use crate::common::{BufferTag, Error, Result};

/// Bit flags stored in [`PageHeader::flags`].
pub struct PageFlags;

impl PageFlags {
    /// At least one line pointer is marked unused and can be reclaimed.
    pub const HAS_FREE_LINES: u16 = 0x0001;
    /// Every bit this version of the format understands.
    pub const VALID_MASK: u16 = 0x0001;
}

/// Metadata stored at the beginning of every page.
///
/// # Layout (20 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     lsn (Log Sequence Number)
/// 8       2     checksum
/// 10      2     flags (PageFlags bits)
/// 12      2     lower (end of the line-pointer array)
/// 14      2     upper (start of the tuple heap)
/// 16      2     special (start of the special space)
/// 18      2     page_size
/// ```
///
/// # Layout Invariant
/// `SIZE <= lower <= upper <= special <= page_size`. The bytes in
/// `[lower, upper)` are free; `[special, page_size)` belongs to whoever
/// initialised the page.
///
/// # Checksum
/// The checksum is computed over the entire page with the checksum field
/// itself set to zero, with the page's [`BufferTag`] mixed in so that a
/// block written to the wrong location is detected as well.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Log Sequence Number of the last change to this page.
    pub lsn: u64,
    /// Page checksum, 0 when never stamped.
    pub checksum: u16,
    /// `PageFlags` bits.
    pub flags: u16,
    /// Offset to the start of free space.
    pub lower: u16,
    /// Offset to the end of free space.
    pub upper: u16,
    /// Offset to the start of the special space.
    pub special: u16,
    /// Total size of the page in bytes.
    pub page_size: u16,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 20;

    /// Offset of each field within the header.
    pub const OFFSET_LSN: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 8;
    pub const OFFSET_FLAGS: usize = 10;
    pub const OFFSET_LOWER: usize = 12;
    pub const OFFSET_UPPER: usize = 14;
    pub const OFFSET_SPECIAL: usize = 16;
    pub const OFFSET_PAGE_SIZE: usize = 18;

    /// Header of a freshly initialised page.
    ///
    /// # Errors
    /// `Error::InvalidLayout` if `special_size` leaves no room for the header.
    pub fn new(page_size: u16, special_size: u16) -> Result<Self> {
        let usable = (page_size as usize).checked_sub(Self::SIZE).ok_or_else(|| {
            Error::InvalidLayout(format!(
                "page size {} is smaller than the {}-byte header",
                page_size,
                Self::SIZE
            ))
        })?;
        if special_size as usize > usable {
            return Err(Error::InvalidLayout(format!(
                "special size {} exceeds the {} bytes available after the header",
                special_size, usable
            )));
        }

        let special = page_size - special_size;
        Ok(Self {
            lsn: 0,
            checksum: 0,
            flags: 0,
            lower: Self::SIZE as u16,
            upper: special,
            special,
            page_size,
        })
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// No layout checks are made; see [`PageHeader::validate`].
    ///
    /// # Errors
    /// `Error::CorruptPage` if `data` is shorter than the header.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::CorruptPage(format!(
                "buffer of {} bytes cannot hold a {}-byte header",
                data.len(),
                Self::SIZE
            )));
        }
        Ok(Self::decode(data))
    }

    /// Decode without the length check.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub(crate) fn decode(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&data[Self::OFFSET_LSN..Self::OFFSET_LSN + 8]);

        Self {
            lsn: u64::from_le_bytes(lsn),
            checksum: read_u16(data, Self::OFFSET_CHECKSUM),
            flags: read_u16(data, Self::OFFSET_FLAGS),
            lower: read_u16(data, Self::OFFSET_LOWER),
            upper: read_u16(data, Self::OFFSET_UPPER),
            special: read_u16(data, Self::OFFSET_SPECIAL),
            page_size: read_u16(data, Self::OFFSET_PAGE_SIZE),
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[Self::OFFSET_LSN..Self::OFFSET_LSN + 8].copy_from_slice(&self.lsn.to_le_bytes());
        write_u16(data, Self::OFFSET_CHECKSUM, self.checksum);
        write_u16(data, Self::OFFSET_FLAGS, self.flags);
        write_u16(data, Self::OFFSET_LOWER, self.lower);
        write_u16(data, Self::OFFSET_UPPER, self.upper);
        write_u16(data, Self::OFFSET_SPECIAL, self.special);
        write_u16(data, Self::OFFSET_PAGE_SIZE, self.page_size);
    }

    /// Encode the header into a fresh array.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        self.write_to(&mut out);
        out
    }

    /// Check the layout invariant against a buffer of `buffer_len` bytes.
    ///
    /// # Errors
    /// `Error::CorruptPage` describing the first violated bound.
    pub fn validate(&self, buffer_len: usize) -> Result<()> {
        if self.page_size as usize != buffer_len {
            return Err(Error::CorruptPage(format!(
                "header page size {} does not match buffer length {}",
                self.page_size, buffer_len
            )));
        }
        if (self.lower as usize) < Self::SIZE
            || self.lower > self.upper
            || self.upper > self.special
            || self.special > self.page_size
        {
            return Err(Error::CorruptPage(format!(
                "bounds out of order: lower {} upper {} special {} page size {}",
                self.lower, self.upper, self.special, self.page_size
            )));
        }
        if self.flags & !PageFlags::VALID_MASK != 0 {
            return Err(Error::CorruptPage(format!(
                "unknown page flags {:#06x}",
                self.flags
            )));
        }
        if (self.lower as usize - Self::SIZE) % super::ItemId::SIZE != 0 {
            return Err(Error::CorruptPage(format!(
                "lower {} does not end on a line-pointer boundary",
                self.lower
            )));
        }
        Ok(())
    }

    /// Number of free bytes between the line pointers and the tuple heap.
    #[inline]
    pub fn free_space(&self) -> u16 {
        self.upper.saturating_sub(self.lower)
    }

    /// Compute the checksum of a page as stored at `tag`.
    ///
    /// CRC32 over the tag and the page (checksum field zeroed), folded to
    /// 16 bits. The result is never 0, so 0 can mean "not stamped".
    pub fn compute_checksum(page_data: &[u8], tag: BufferTag) -> u16 {
        let mut hasher = crc32fast::Hasher::new();

        hasher.update(&tag.to_le_bytes());
        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 2]);
        hasher.update(&page_data[Self::OFFSET_CHECKSUM + 2..]);

        let crc = hasher.finalize();
        ((((crc ^ (crc >> 16)) & 0xFFFF) % 0xFFFF) + 1) as u16
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, page_data: &[u8], tag: BufferTag) -> bool {
        self.checksum == Self::compute_checksum(page_data, tag)
    }
}

#[inline]
pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_header_new() {
        let header = PageHeader::new(8192, 16).unwrap();
        assert_eq!(header.lower, 20);
        assert_eq!(header.upper, 8176);
        assert_eq!(header.special, 8176);
        assert_eq!(header.page_size, 8192);
        assert_eq!(header.free_space(), 8156);
        assert!(header.validate(8192).is_ok());
    }

    #[test]
    fn test_page_header_new_rejects_oversized_special() {
        assert!(matches!(
            PageHeader::new(100, 81),
            Err(Error::InvalidLayout(_))
        ));
        assert!(PageHeader::new(100, 80).is_ok());
        assert!(matches!(PageHeader::new(10, 0), Err(Error::InvalidLayout(_))));
    }

    #[test]
    fn test_page_header_roundtrip() {
        let original = PageHeader {
            lsn: 0x1234_5678_9ABC_DEF0,
            checksum: 0xBEEF,
            flags: PageFlags::HAS_FREE_LINES,
            lower: 30,
            upper: 4000,
            special: 4080,
            page_size: 4096,
        };

        let buffer = original.to_bytes();
        let recovered = PageHeader::from_bytes(&buffer).unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_page_header_byte_layout() {
        let header = PageHeader {
            lsn: 0x0807_0605_0403_0201,
            checksum: 0x0A09,
            flags: 0x0C0B,
            lower: 0x0E0D,
            upper: 0x100F,
            special: 0x1211,
            page_size: 0x1413,
        };

        let buffer = header.to_bytes();
        let expected: Vec<u8> = (1..=20).collect();
        assert_eq!(buffer.to_vec(), expected);
    }

    #[test]
    fn test_from_bytes_short_buffer() {
        assert!(matches!(
            PageHeader::from_bytes(&[0u8; 19]),
            Err(Error::CorruptPage(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut header = PageHeader::new(128, 0).unwrap();
        header.upper = 10;
        assert!(matches!(header.validate(128), Err(Error::CorruptPage(_))));

        let mut header = PageHeader::new(128, 0).unwrap();
        header.special = 200;
        assert!(header.validate(128).is_err());

        let header = PageHeader::new(128, 0).unwrap();
        assert!(header.validate(256).is_err());

        let mut header = PageHeader::new(128, 0).unwrap();
        header.lower = 22;
        assert!(header.validate(128).is_err());

        let mut header = PageHeader::new(128, 0).unwrap();
        header.flags = 0x8000;
        assert!(header.validate(128).is_err());
    }

    // --- Checksum tests ---

    #[test]
    fn test_checksum_deterministic_and_nonzero() {
        let mut page = vec![0u8; 512];
        page[100] = 0xAB;
        let tag = BufferTag::new(1, 2);

        let c1 = PageHeader::compute_checksum(&page, tag);
        let c2 = PageHeader::compute_checksum(&page, tag);
        assert_eq!(c1, c2);
        assert_ne!(c1, 0);
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut page = vec![0u8; 512];
        page[300] = 0x11;
        let tag = BufferTag::new(1, 2);

        let c1 = PageHeader::compute_checksum(&page, tag);
        page[8] = 0xFF;
        page[9] = 0xFF;
        assert_eq!(c1, PageHeader::compute_checksum(&page, tag));
    }

    #[test]
    fn test_checksum_depends_on_tag_and_data() {
        let mut page = vec![0u8; 512];
        let a = PageHeader::compute_checksum(&page, BufferTag::new(1, 2));
        let b = PageHeader::compute_checksum(&page, BufferTag::new(1, 3));
        assert_ne!(a, b);

        page[200] = 1;
        assert_ne!(a, PageHeader::compute_checksum(&page, BufferTag::new(1, 2)));
    }
}
