//! Buffer descriptor - the bookkeeping record of one pool slot.
//!
//! A [`BufferDesc`] says which page a slot holds and who is using it:
//! - Which tag is loaded (if any) and whether it is still being read
//! - Pin count for reference counting
//! - Usage count for the clock sweep
//! - Dirty flag for write-back tracking
//! - Free-list link
//!
//! Descriptors hold no locks of their own. They live in one array inside
//! the pool's metadata mutex and are only touched while it is held.

use crate::common::BufferTag;

/// Where a slot is in its lifecycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list, holds no page.
    #[default]
    Free,
    /// Tag assigned and indexed; page bytes are being filled.
    Loading,
    /// Holds a resident page.
    Valid,
}

/// Metadata for one slot in the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Which page is currently loaded, or None if the slot is empty.
    pub tag: Option<BufferTag>,
    /// Number of live handles.
    pub pin_count: u32,
    /// Recency signal for the clock sweep.
    pub usage_count: u32,
    /// In-memory bytes differ from durable storage.
    pub dirty: bool,
    /// Next slot on the free list, or [`BufferDesc::FREE_LIST_END`].
    pub free_next: i32,
    pub state: SlotState,
}

impl BufferDesc {
    /// Terminator of the intrusive free list.
    pub const FREE_LIST_END: i32 = -1;

    /// An empty descriptor.
    pub fn new() -> Self {
        Self {
            tag: None,
            pin_count: 0,
            usage_count: 0,
            dirty: false,
            free_next: Self::FREE_LIST_END,
            state: SlotState::Free,
        }
    }

    /// Take a pin and count the access. Returns the new pin count.
    #[inline]
    pub(crate) fn pin(&mut self, max_usage_count: u32) -> u32 {
        self.pin_count += 1;
        self.usage_count = (self.usage_count + 1).min(max_usage_count);
        self.pin_count
    }

    /// Drop a pin. Returns the new pin count, or `None` on underflow.
    #[inline]
    pub(crate) fn unpin(&mut self) -> Option<u32> {
        self.pin_count = self.pin_count.checked_sub(1)?;
        Some(self.pin_count)
    }

    /// Check if the slot is currently pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    /// Check if the slot holds a page the clock sweep may reclaim right now.
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.state == SlotState::Valid && !self.is_pinned() && self.usage_count == 0
    }

    /// Claim the slot for `tag` with the caller's pin, bytes not yet filled.
    pub(crate) fn begin_load(&mut self, tag: BufferTag) {
        self.tag = Some(tag);
        self.pin_count = 1;
        self.usage_count = 1;
        self.dirty = false;
        self.free_next = Self::FREE_LIST_END;
        self.state = SlotState::Loading;
    }

    /// Reset the descriptor to empty state.
    ///
    /// Called before the slot goes back on the free list.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self::new()
    }
}
