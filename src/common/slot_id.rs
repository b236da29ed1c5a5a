//! Slot identifier type.

use std::fmt;

/// Identifies a slot in the buffer pool.
///
/// Slots are allocated once at pool construction, so a `SlotId` stays
/// valid (and keeps pointing at the same descriptor and page buffer) for
/// the lifetime of the pool. It is a plain `usize` so it can index the
/// descriptor and page arrays directly: `descriptors[slot.0]`.
///
/// # Example
/// ```
/// use pagepool::SlotId;
///
/// let slot = SlotId::new(5);
/// assert_eq!(slot.0, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

impl SlotId {
    /// Create a new SlotId.
    #[inline]
    pub fn new(id: usize) -> Self {
        SlotId(id)
    }

    /// Encode as a free-list link. Pool sizes are bounded so this never
    /// truncates.
    #[inline]
    pub(crate) fn as_link(self) -> i32 {
        self.0 as i32
    }

    /// Decode a free-list link; `None` for the `-1` terminator.
    #[inline]
    pub(crate) fn from_link(link: i32) -> Option<Self> {
        if link < 0 {
            None
        } else {
            Some(SlotId(link as usize))
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}
