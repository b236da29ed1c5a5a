//! Line pointers - the entries of a slotted page's item array.

use std::fmt;

use super::page_header::{read_u16, write_u16};
use crate::common::{Error, Result};

/// State of a line pointer.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ItemFlags {
    /// Slot is free for reuse; offset and length are zero.
    #[default]
    Unused = 0,
    /// Points at a live tuple.
    Normal = 1,
    /// Forwards to another line pointer; offset holds its offset number.
    Redirect = 2,
    /// Tuple is dead but its storage has not been reclaimed yet.
    Dead = 3,
}

impl ItemFlags {
    /// Convert from u8, `None` for values outside the format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ItemFlags::Unused),
            1 => Some(ItemFlags::Normal),
            2 => Some(ItemFlags::Redirect),
            3 => Some(ItemFlags::Dead),
            _ => None,
        }
    }

    /// Whether the line pointer references bytes in the tuple heap.
    #[inline]
    pub fn has_storage(self) -> bool {
        matches!(self, ItemFlags::Normal | ItemFlags::Dead)
    }
}

/// 1-based position of a line pointer in a page's item array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OffsetNumber(pub u16);

impl OffsetNumber {
    /// The first item on a page.
    pub const FIRST: OffsetNumber = OffsetNumber(1);

    /// Zero-based index into the line-pointer array.
    #[inline]
    pub fn index(self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }
}

impl fmt::Display for OffsetNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locates one tuple within a page.
///
/// # Layout (5 bytes, little-endian, unaligned)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       2     offset (from start of page)
/// 2       1     flags (ItemFlags as u8)
/// 3       2     length (bytes)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ItemId {
    pub offset: u16,
    pub flags: ItemFlags,
    pub length: u16,
}

impl ItemId {
    /// Size of an encoded line pointer in bytes.
    pub const SIZE: usize = 5;

    pub fn new(offset: u16, flags: ItemFlags, length: u16) -> Self {
        Self {
            offset,
            flags,
            length,
        }
    }

    /// Decode a line pointer from the start of `data`.
    ///
    /// # Errors
    /// `Error::CorruptPage` for a short buffer or unknown flags.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::CorruptPage("truncated line pointer".into()));
        }
        let flags = ItemFlags::from_u8(data[2]).ok_or_else(|| {
            Error::CorruptPage(format!("unknown line pointer flags {:#04x}", data[2]))
        })?;

        Ok(Self {
            offset: read_u16(data, 0),
            flags,
            length: read_u16(data, 3),
        })
    }

    /// Encode this line pointer into the start of `data`.
    ///
    /// # Panics
    /// Panics if `data.len() < ItemId::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for ItemId");
        write_u16(data, 0, self.offset);
        data[2] = self.flags as u8;
        write_u16(data, 3, self.length);
    }

    /// End of the referenced bytes (exclusive).
    #[inline]
    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }
}
