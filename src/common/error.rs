//! Error types for pagepool.

use thiserror::Error;

use super::{BufferTag, SlotId};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagepool.
///
/// Resource-shape errors (`PoolExhausted`, `PageFull`) are ordinary values
/// callers are expected to handle. The rest point at I/O failures,
/// corrupted bytes, or a caller breaking the pin protocol.
#[derive(Debug, Error)]
pub enum Error {
    /// The disk collaborator failed while reading or writing a page.
    #[error("I/O error on {tag}: {source}")]
    Io {
        tag: BufferTag,
        #[source]
        source: std::io::Error,
    },

    /// File-system error not tied to a single page (opening a data directory).
    #[error("I/O error: {0}")]
    Fs(#[from] std::io::Error),

    /// Requested block has never been allocated on disk.
    #[error("{0} not found")]
    PageNotFound(BufferTag),

    /// Every slot is pinned; the clock sweep found no victim.
    ///
    /// A slot whose dirty page is being written back holds a temporary pin,
    /// so a pool whose only unpinned slot is mid-flush reports this too.
    /// Transient: the caller may retry once other handles are released or
    /// the write finishes.
    #[error("buffer pool exhausted: all {pool_size} slots are pinned")]
    PoolExhausted { pool_size: usize },

    /// `unpin` was called on a slot whose pin count is already zero.
    ///
    /// This indicates a bug - every unpin must match a fetch.
    #[error("pin count underflow on {slot}")]
    UnpinUnderflow { slot: SlotId },

    /// Slot id outside the pool, or a slot that holds no page.
    #[error("invalid slot: {0}")]
    InvalidSlot(SlotId),

    /// Operation requires an unpinned page.
    #[error("{0} is pinned")]
    PagePinned(BufferTag),

    /// The item does not fit into the page's free space.
    #[error("page full: need {needed} bytes, {available} available")]
    PageFull { needed: usize, available: u16 },

    /// Offset number does not name a live line pointer on the page.
    #[error("no item at offset number {offset_number}")]
    ItemNotFound { offset_number: u16 },

    /// Requested page geometry cannot be laid out.
    #[error("invalid page layout: {0}")]
    InvalidLayout(String),

    /// Decoded bytes violate the page layout invariants.
    #[error("corrupt page: {0}")]
    CorruptPage(String),

    /// Stored page checksum does not match the page contents.
    #[error("checksum mismatch on {tag}: stored {stored:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        tag: BufferTag,
        stored: u16,
        computed: u16,
    },

    /// Rejected pool configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pool bookkeeping is inconsistent (free list, index, descriptors).
    #[error("buffer pool invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Wrap an `std::io::Error` with the page it concerns.
    pub fn io(tag: BufferTag, source: std::io::Error) -> Self {
        Error::Io { tag, source }
    }

    /// Whether retrying the same call later can succeed without any
    /// change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PoolExhausted { .. })
    }
}
