//! In-memory [`DiskManager`] for tests and benchmarks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{BufferTag, Error, Result};
use crate::storage::DiskManager;

#[derive(Default)]
struct MemoryState {
    blocks: HashMap<BufferTag, Box<[u8]>>,
    block_counts: HashMap<u32, u32>,
}

/// Keeps every block in a hash map and counts I/O calls.
///
/// Behaves like [`FileDiskManager`](crate::storage::FileDiskManager):
/// blocks must be allocated before they can be read or written.
pub struct MemoryDiskManager {
    page_size: u16,
    state: Mutex<MemoryState>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryDiskManager {
    pub fn new(page_size: u16) -> Self {
        Self {
            page_size,
            state: Mutex::new(MemoryState::default()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of successful `read_page` calls so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful `write_page` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Copy of the stored bytes of `tag`, if allocated.
    pub fn page(&self, tag: BufferTag) -> Option<Vec<u8>> {
        self.state.lock().blocks.get(&tag).map(|b| b.to_vec())
    }

    /// Store `data` at `tag` directly, allocating the block (and any gap
    /// before it) if needed. Does not count as a write.
    ///
    /// # Panics
    /// Panics if `data` is not exactly one page.
    pub fn put_page(&self, tag: BufferTag, data: &[u8]) {
        assert_eq!(data.len(), self.page_size as usize, "page size");

        let mut state = self.state.lock();
        let count = state.block_counts.entry(tag.object_id).or_insert(0);
        if tag.block_number >= *count {
            *count = tag.block_number + 1;
        }
        state.blocks.insert(tag, data.to_vec().into_boxed_slice());
    }

    /// Number of blocks allocated for `object_id`.
    pub fn block_count(&self, object_id: u32) -> u32 {
        self.state
            .lock()
            .block_counts
            .get(&object_id)
            .copied()
            .unwrap_or(0)
    }

    fn is_allocated(state: &MemoryState, tag: BufferTag) -> bool {
        state
            .block_counts
            .get(&tag.object_id)
            .is_some_and(|&count| tag.block_number < count)
    }
}

impl DiskManager for MemoryDiskManager {
    fn page_size(&self) -> u16 {
        self.page_size
    }

    fn read_page(&self, tag: BufferTag, buf: &mut [u8]) -> Result<()> {
        assert_eq!(buf.len(), self.page_size as usize, "read buffer size");

        let state = self.state.lock();
        if !Self::is_allocated(&state, tag) {
            return Err(Error::PageNotFound(tag));
        }
        match state.blocks.get(&tag) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.fill(0),
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, tag: BufferTag, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), self.page_size as usize, "write buffer size");

        let mut state = self.state.lock();
        if !Self::is_allocated(&state, tag) {
            return Err(Error::PageNotFound(tag));
        }
        state.blocks.insert(tag, data.to_vec().into_boxed_slice());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn allocate_page(&self, object_id: u32) -> Result<BufferTag> {
        let mut state = self.state.lock();
        let count = state.block_counts.entry(object_id).or_insert(0);
        let tag = BufferTag::new(object_id, *count);
        *count += 1;
        Ok(tag)
    }
}
