//! Pin handles and RAII guards for page access.
//!
//! - [`PageHandle`] - A bare pin, released explicitly with `unpin`
//! - [`PageReadGuard`] - Pin plus shared content lock (multiple allowed)
//! - [`PageWriteGuard`] - Pin plus exclusive content lock (auto-marks dirty)
//!
//! Both guards auto-unpin the page when dropped.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{BufferTag, SlotId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// Proof of one pin on a resident page.
///
/// Returned by `fetch` and `new_page`. The page stays resident until the
/// handle is given back through [`BufferPoolManager::unpin`]. Handles are
/// neither `Clone` nor released on drop, so every pin is returned exactly
/// once and explicitly.
#[must_use = "the page stays pinned until the handle is passed to unpin"]
#[derive(Debug, PartialEq, Eq)]
pub struct PageHandle {
    slot: SlotId,
    tag: BufferTag,
}

impl PageHandle {
    pub(crate) fn new(slot: SlotId, tag: BufferTag) -> Self {
        Self { slot, tag }
    }

    /// The slot holding the page.
    #[inline]
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }

    /// The page this handle pins.
    #[inline]
    pub fn tag(&self) -> BufferTag {
        self.tag
    }
}

/// Guard for read-only page access.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
/// The page is automatically unpinned when the guard is dropped.
///
/// # Example
/// ```ignore
/// let guard = bpm.fetch_page_read(tag)?;
/// let first = guard.item(OffsetNumber::FIRST)?;  // Deref to &Page
/// // guard drops here, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    /// Reference back to BPM for unpin on drop.
    bpm: &'a BufferPoolManager,
    slot: SlotId,
    tag: BufferTag,
    /// Lock guard providing access to page data.
    lock: RwLockReadGuard<'a, Page>,
}

impl<'a> PageReadGuard<'a> {
    /// Called by `BufferPoolManager::fetch_page_read()`.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        handle: PageHandle,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            slot: handle.slot,
            tag: handle.tag,
            lock,
        }
    }

    #[inline]
    pub fn tag(&self) -> BufferTag {
        self.tag
    }

    #[inline]
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // Read guard: not dirty
        self.bpm.release_pin(self.slot, false);
    }
}

/// Guard for exclusive write access to a page.
///
/// Only one `PageWriteGuard` can exist for a page at a time.
/// The page is automatically marked dirty and unpinned when the guard is dropped.
///
/// # Example
/// ```ignore
/// let mut guard = bpm.fetch_page_write(tag)?;
/// guard.add_item(b"row", ItemFlags::Normal)?;  // DerefMut to &mut Page
/// // guard drops here, page marked dirty and unpinned
/// ```
pub struct PageWriteGuard<'a> {
    /// Reference back to BPM for unpin on drop.
    bpm: &'a BufferPoolManager,
    slot: SlotId,
    tag: BufferTag,
    /// Lock guard providing access to page data.
    lock: RwLockWriteGuard<'a, Page>,
}

impl<'a> PageWriteGuard<'a> {
    /// Called by `BufferPoolManager::fetch_page_write()` and
    /// `BufferPoolManager::new_page_write()`.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        handle: PageHandle,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            slot: handle.slot,
            tag: handle.tag,
            lock,
        }
    }

    #[inline]
    pub fn tag(&self) -> BufferTag {
        self.tag
    }

    #[inline]
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        // Write guard: always dirty
        self.bpm.release_pin(self.slot, true);
    }
}
