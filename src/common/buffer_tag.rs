//! Buffer tag - the identity of a disk page.

use std::fmt;

/// Identifies one block of one database object on disk.
///
/// A tag is the key of the buffer pool's page table: two tags are the same
/// page iff both the object id and the block number match. Tags carry no
/// ordering guarantees beyond equality and hashing.
///
/// # Example
/// ```
/// use pagepool::BufferTag;
///
/// let tag = BufferTag::new(16384, 7);
/// assert_eq!(tag.object_id, 16384);
/// assert_eq!(tag.block_number, 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferTag {
    /// Database object (relation) the block belongs to.
    pub object_id: u32,
    /// Block number within the object, starting at 0.
    pub block_number: u32,
}

/// Alias used by callers that think in terms of pages.
pub type PageId = BufferTag;

impl BufferTag {
    /// Create a new tag.
    #[inline]
    pub const fn new(object_id: u32, block_number: u32) -> Self {
        Self {
            object_id,
            block_number,
        }
    }

    /// Little-endian encoding, used when mixing the tag into checksums.
    #[inline]
    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.object_id.to_le_bytes());
        out[4..].copy_from_slice(&self.block_number.to_le_bytes());
        out
    }
}

impl fmt::Display for BufferTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({}/{})", self.object_id, self.block_number)
    }
}
