//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting
//! - Dirty page write-back on eviction and flush
//! - CLOCK-sweep victim selection with usage counts

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::descriptor::{BufferDesc, SlotState};
use crate::buffer::free_list::FreeList;
use crate::buffer::replacer::ClockReplacer;
use crate::buffer::{BufferPoolStats, PageHandle, PageReadGuard, PageWriteGuard};
use crate::common::{BufferPoolConfig, BufferTag, Error, Result, SlotId};
use crate::storage::page::{Page, PageHeader};
use crate::storage::DiskManager;

/// How a freshly claimed slot gets its bytes.
#[derive(Debug, Clone, Copy)]
enum Fill {
    /// Read the block from disk.
    Read,
    /// Format an empty slotted page with this much special space.
    Init(u16),
}

/// Everything guarded by the metadata mutex.
struct PoolState {
    /// Maps resident (and loading) tags to their slot.
    page_table: HashMap<BufferTag, SlotId>,
    /// One descriptor per slot.
    descriptors: Vec<BufferDesc>,
    /// Empty slots, linked through the descriptors.
    free_list: FreeList,
    /// Clock hand.
    replacer: ClockReplacer,
}

impl PoolState {
    fn new(pool_size: usize) -> Self {
        let mut descriptors: Vec<BufferDesc> = (0..pool_size).map(|_| BufferDesc::new()).collect();
        let free_list = FreeList::new_full(&mut descriptors);

        Self {
            page_table: HashMap::with_capacity(pool_size),
            descriptors,
            free_list,
            replacer: ClockReplacer::new(),
        }
    }

    fn pop_free(&mut self) -> Option<SlotId> {
        self.free_list.pop(&mut self.descriptors)
    }

    fn sweep(&mut self) -> Option<SlotId> {
        self.replacer.evict(&mut self.descriptors)
    }

    /// Tag, pin and index `slot` for a load that has not happened yet.
    fn begin_load(&mut self, slot: SlotId, tag: BufferTag) {
        self.descriptors[slot.0].begin_load(tag);
        self.page_table.insert(tag, slot);
    }

    /// Unindex `slot`, clear its descriptor and put it on the free list.
    fn release_slot(&mut self, slot: SlotId) {
        if let Some(tag) = self.descriptors[slot.0].tag {
            if self.page_table.get(&tag) == Some(&slot) {
                self.page_table.remove(&tag);
            }
        }
        self.descriptors[slot.0].reset();
        self.free_list.push(slot, &mut self.descriptors);
    }

    /// Descriptor of `tag` if it is fully loaded.
    fn resident(&self, tag: BufferTag) -> Option<&BufferDesc> {
        self.page_table
            .get(&tag)
            .map(|slot| &self.descriptors[slot.0])
            .filter(|desc| desc.state == SlotState::Valid)
    }

    fn check(&self, max_usage_count: u32) -> Result<()> {
        let violation = |msg: String| Err(Error::InvariantViolation(msg));
        let n = self.descriptors.len();

        let (free, terminated) = self.free_list.walk(&self.descriptors);
        if !terminated {
            return violation(format!("free list does not terminate within {n} steps"));
        }
        if free.len() != self.free_list.len() {
            return violation(format!(
                "free list holds {} slots but counts {}",
                free.len(),
                self.free_list.len()
            ));
        }
        let expected_head = free.first().map_or(BufferDesc::FREE_LIST_END, |s| s.as_link());
        if self.free_list.head() != expected_head || self.free_list.is_empty() != free.is_empty() {
            return violation(format!(
                "free list head is {} but the walk starts at {expected_head}",
                self.free_list.head()
            ));
        }
        let expected_tail = free.last().map_or(BufferDesc::FREE_LIST_END, |s| s.as_link());
        if self.free_list.tail() != expected_tail {
            return violation(format!(
                "free list tail is {} but the walk ends at {expected_tail}",
                self.free_list.tail()
            ));
        }

        let mut on_free_list = vec![false; n];
        for slot in &free {
            if on_free_list[slot.0] {
                return violation(format!("{slot} appears twice on the free list"));
            }
            on_free_list[slot.0] = true;

            let desc = &self.descriptors[slot.0];
            if desc.state != SlotState::Free || desc.tag.is_some() || desc.is_pinned() {
                return violation(format!("{slot} is on the free list but in use"));
            }
        }

        for (i, desc) in self.descriptors.iter().enumerate() {
            if desc.usage_count > max_usage_count {
                return violation(format!("slot {i} usage count {} over cap", desc.usage_count));
            }
            if on_free_list[i] {
                continue;
            }
            match desc.tag {
                None => return violation(format!("slot {i} is neither free nor tagged")),
                Some(tag) if self.page_table.get(&tag) != Some(&SlotId::new(i)) => {
                    return violation(format!("slot {i} holds {tag} but the index disagrees"));
                }
                Some(_) if desc.state == SlotState::Free => {
                    return violation(format!("slot {i} is tagged but marked free"));
                }
                Some(_) => {}
            }
        }

        for (tag, slot) in &self.page_table {
            if self.descriptors[slot.0].tag != Some(*tag) {
                return violation(format!("index maps {tag} to {slot} which holds something else"));
            }
        }
        if self.page_table.len() + free.len() != n {
            return violation(format!(
                "{} indexed + {} free != {n} slots",
                self.page_table.len(),
                free.len()
            ));
        }

        Ok(())
    }
}

/// Manages a fixed pool of slots caching disk pages.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                      BufferPoolManager                       │
/// │  state: Mutex<PoolState>                                     │
/// │  ┌──────────────┐ ┌──────────────────────┐ ┌──────────────┐  │
/// │  │ page_table   │ │ descriptors          │ │ free_list    │  │
/// │  │ Tag → SlotId │ │ [Desc0] [Desc1] ...  │ │ head / tail  │  │
/// │  └──────────────┘ └──────────────────────┘ └──────────────┘  │
/// │  ┌──────────────────────────────────────┐  ┌─────────────┐   │
/// │  │ pages: Vec<RwLock<Page>>             │  │ replacer    │   │
/// │  │ [Page0] [Page1] ...                  │  │ clock hand  │   │
/// │  └──────────────────────────────────────┘  └─────────────┘   │
/// │  load_done: Condvar      disk: Arc<dyn DiskManager>          │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: one `Mutex` over the index, descriptors, free list and hand,
///   so every bookkeeping transition is atomic. Never held across disk I/O.
/// - `pages`: one `RwLock` per slot for the page bytes. A content lock may
///   be held while taking `state`, never the other way round.
/// - `load_done`: wakes fetchers waiting for another thread's read of the
///   same tag, so each miss reads the block once.
/// - `stats`: all atomic counters.
///
/// # Usage
/// ```ignore
/// let disk = Arc::new(MemoryDiskManager::new(8192));
/// let bpm = BufferPoolManager::with_capacity(16, disk)?;
///
/// let handle = bpm.new_page(1, 0)?;
/// bpm.page_mut(&handle).add_item(b"row", ItemFlags::Normal)?;
/// let tag = handle.tag();
/// bpm.unpin(handle, true)?;
///
/// let guard = bpm.fetch_page_read(tag)?;
/// assert_eq!(guard.item(OffsetNumber::FIRST)?, b"row");
/// ```
pub struct BufferPoolManager {
    config: BufferPoolConfig,

    /// Index, descriptors, free list and clock hand.
    state: Mutex<PoolState>,

    /// Signalled whenever a slot leaves the `Loading` state.
    load_done: Condvar,

    /// Page bytes, one lock per slot.
    pages: Vec<RwLock<Page>>,

    /// Handles all disk I/O.
    disk: Arc<dyn DiskManager>,

    /// Performance statistics.
    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager.
    ///
    /// Every slot starts empty and on the free list, lowest id first.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if the config does not validate or its page
    /// size differs from the disk's.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskManager>) -> Result<Self> {
        config.validate()?;
        if disk.page_size() != config.page_size {
            return Err(Error::InvalidConfig(format!(
                "disk page size {} does not match pool page size {}",
                disk.page_size(),
                config.page_size
            )));
        }

        let pages = (0..config.pool_size)
            .map(|_| RwLock::new(Page::new(config.page_size)))
            .collect();

        info!(
            pool_size = config.pool_size,
            page_size = config.page_size,
            verify_checksums = config.verify_checksums,
            "buffer pool initialised"
        );

        Ok(Self {
            config,
            state: Mutex::new(PoolState::new(config.pool_size)),
            load_done: Condvar::new(),
            pages,
            disk,
            stats: BufferPoolStats::new(),
        })
    }

    /// Pool of `pool_size` slots using the disk's page size and defaults
    /// for everything else.
    pub fn with_capacity(pool_size: usize, disk: Arc<dyn DiskManager>) -> Result<Self> {
        let config = BufferPoolConfig::new(pool_size).with_page_size(disk.page_size());
        Self::new(config, disk)
    }

    // ========================================================================
    // Public API: Pin and unpin
    // ========================================================================

    /// Pin `tag`, loading it from disk on a miss.
    ///
    /// A hit bumps the pin count and the usage count. A miss claims a slot
    /// from the free list (or from the clock sweep when the free list is
    /// empty), writes back a dirty victim, and reads the block. Concurrent
    /// fetches of the same missing tag wait for the first one's read.
    ///
    /// # Errors
    /// - `Error::PoolExhausted` if every slot is pinned
    /// - `Error::PageNotFound` / `Error::Io` from the disk read
    /// - `Error::ChecksumMismatch` if checksums are enabled and the stored
    ///   page does not verify
    /// - `Error::CorruptPage` if a non-zero block is not a valid slotted page
    ///
    /// On error the pool is unchanged apart from a reclaimed victim.
    pub fn fetch(&self, tag: BufferTag) -> Result<PageHandle> {
        let slot = self.pin_page(tag, Fill::Read)?;
        Ok(PageHandle::new(slot, tag))
    }

    /// Allocate a new block of `object_id` and pin it as an empty slotted
    /// page with `special_size` bytes of special space.
    ///
    /// The page starts dirty; it reaches disk on flush or eviction.
    pub fn new_page(&self, object_id: u32, special_size: u16) -> Result<PageHandle> {
        PageHeader::new(self.config.page_size, special_size)?;

        let tag = self.disk.allocate_page(object_id)?;
        let slot = self.pin_page(tag, Fill::Init(special_size))?;
        debug!(%tag, slot = slot.0, "allocated new page");

        Ok(PageHandle::new(slot, tag))
    }

    /// Release the pin held by `handle`.
    ///
    /// `is_dirty = true` records that the caller modified the page. Dirty
    /// is sticky: passing false never clears it.
    pub fn unpin(&self, handle: PageHandle, is_dirty: bool) -> Result<()> {
        self.unpin_slot(handle.slot_id(), is_dirty)
    }

    /// Release one pin on `slot`.
    ///
    /// # Errors
    /// - `Error::InvalidSlot` if `slot` is outside the pool
    /// - `Error::UnpinUnderflow` if the slot is not pinned
    ///
    /// # Panics
    /// Underflow panics in debug builds; it means an unpin without a
    /// matching fetch.
    pub fn unpin_slot(&self, slot: SlotId, is_dirty: bool) -> Result<()> {
        if slot.0 >= self.config.pool_size {
            return Err(Error::InvalidSlot(slot));
        }

        let mut state = self.state.lock();
        let desc = &mut state.descriptors[slot.0];
        match desc.unpin() {
            Some(_) => {
                if is_dirty {
                    desc.dirty = true;
                }
                Ok(())
            }
            None => {
                drop(state);
                error!(slot = slot.0, "unpin on a slot with pin count zero");
                if cfg!(debug_assertions) {
                    panic!("pin count underflow on {slot}");
                }
                Err(Error::UnpinUnderflow { slot })
            }
        }
    }

    /// Record that the pinned page behind `handle` was modified.
    pub fn mark_dirty(&self, handle: &PageHandle) -> Result<()> {
        let mut state = self.state.lock();
        let desc = &mut state.descriptors[handle.slot_id().0];
        if desc.tag != Some(handle.tag()) || !desc.is_pinned() {
            return Err(Error::InvalidSlot(handle.slot_id()));
        }
        desc.dirty = true;
        Ok(())
    }

    // ========================================================================
    // Public API: Page content
    // ========================================================================

    /// Shared access to the bytes of a pinned page.
    ///
    /// The lock borrows `handle`, so the page cannot be unpinned while the
    /// lock is held:
    ///
    /// ```compile_fail
    /// # use std::sync::Arc;
    /// # use pagepool::{BufferPoolManager, MemoryDiskManager};
    /// # let bpm = BufferPoolManager::with_capacity(1, Arc::new(MemoryDiskManager::new(512))).unwrap();
    /// let handle = bpm.new_page(1, 0).unwrap();
    /// let page = bpm.page(&handle);
    /// bpm.unpin(handle, false).unwrap(); // `handle` is still borrowed
    /// drop(page);
    /// ```
    pub fn page<'a>(&'a self, handle: &'a PageHandle) -> RwLockReadGuard<'a, Page> {
        self.pages[handle.slot_id().0].read()
    }

    /// Exclusive access to the bytes of a pinned page.
    ///
    /// Does not mark the page dirty; pass `is_dirty = true` to `unpin` or
    /// call `mark_dirty`. Like [`page`](Self::page), the lock borrows
    /// `handle` and must be released before unpinning:
    ///
    /// ```compile_fail
    /// # use std::sync::Arc;
    /// # use pagepool::{BufferPoolManager, MemoryDiskManager};
    /// # let bpm = BufferPoolManager::with_capacity(1, Arc::new(MemoryDiskManager::new(512))).unwrap();
    /// let handle = bpm.new_page(1, 0).unwrap();
    /// let mut page = bpm.page_mut(&handle);
    /// bpm.unpin(handle, true).unwrap(); // `handle` is still borrowed
    /// page.set_lsn(1);
    /// ```
    pub fn page_mut<'a>(&'a self, handle: &'a PageHandle) -> RwLockWriteGuard<'a, Page> {
        self.pages[handle.slot_id().0].write()
    }

    /// Fetch a page for reading (shared access).
    ///
    /// Same as `fetch`, but returns a guard that unpins on drop.
    pub fn fetch_page_read(&self, tag: BufferTag) -> Result<PageReadGuard<'_>> {
        let handle = self.fetch(tag)?;
        let lock = self.pages[handle.slot_id().0].read();

        Ok(PageReadGuard::new(self, handle, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// The page is automatically marked dirty when the guard drops.
    pub fn fetch_page_write(&self, tag: BufferTag) -> Result<PageWriteGuard<'_>> {
        let handle = self.fetch(tag)?;
        let lock = self.pages[handle.slot_id().0].write();

        Ok(PageWriteGuard::new(self, handle, lock))
    }

    /// `new_page`, returning a write guard for the new page.
    pub fn new_page_write(&self, object_id: u32, special_size: u16) -> Result<PageWriteGuard<'_>> {
        let handle = self.new_page(object_id, special_size)?;
        let lock = self.pages[handle.slot_id().0].write();

        Ok(PageWriteGuard::new(self, handle, lock))
    }

    // ========================================================================
    // Public API: Flush and evict
    // ========================================================================

    /// Write `tag` to disk if it is resident and dirty.
    ///
    /// Clean or absent pages are a no-op.
    pub fn flush(&self, tag: BufferTag) -> Result<()> {
        let slot = match self.state.lock().page_table.get(&tag) {
            Some(&slot) => slot,
            None => return Ok(()), // Page not in pool
        };

        self.flush_slot_as(slot, tag)
    }

    /// Write whatever `slot` holds to disk if it is dirty.
    pub fn flush_slot(&self, slot: SlotId) -> Result<()> {
        if slot.0 >= self.config.pool_size {
            return Err(Error::InvalidSlot(slot));
        }

        let tag = self.state.lock().descriptors[slot.0].tag;
        match tag {
            Some(tag) => self.flush_slot_as(slot, tag),
            None => Ok(()),
        }
    }

    /// Flush all dirty pages to disk.
    ///
    /// Attempts every dirty page and returns the first error, if any.
    pub fn flush_all(&self) -> Result<()> {
        let dirty: Vec<(SlotId, BufferTag)> = {
            let state = self.state.lock();
            state
                .descriptors
                .iter()
                .enumerate()
                .filter(|(_, desc)| desc.dirty && desc.state == SlotState::Valid)
                .filter_map(|(i, desc)| desc.tag.map(|tag| (SlotId::new(i), tag)))
                .collect()
        };

        debug!(count = dirty.len(), "flushing all dirty pages");

        let mut first_error = None;
        for (slot, tag) in dirty {
            if let Err(e) = self.flush_slot_as(slot, tag) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop `tag` from the pool, writing it back first if dirty.
    ///
    /// Returns `false` if the page was not resident.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is pinned or still loading. A page
    ///   being written back by a concurrent flush or eviction holds a
    ///   temporary pin, so it reports `PagePinned` too until the write ends.
    /// - Write errors from the flush; the page then stays resident
    pub fn evict_page(&self, tag: BufferTag) -> Result<bool> {
        loop {
            let slot = {
                let mut state = self.state.lock();
                let slot = match state.page_table.get(&tag) {
                    Some(&slot) => slot,
                    None => return Ok(false),
                };

                let desc = &state.descriptors[slot.0];
                if desc.state != SlotState::Valid || desc.is_pinned() {
                    return Err(Error::PagePinned(tag));
                }
                if !desc.dirty {
                    state.release_slot(slot);
                    trace!(%tag, slot = slot.0, "evicted page on request");
                    return Ok(true);
                }
                slot
            };

            // Dirty: write back, then look again.
            self.flush_slot_as(slot, tag)?;
        }
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    pub fn page_size(&self) -> u16 {
        self.config.page_size
    }

    /// Get the number of slots on the free list.
    pub fn free_slot_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Get the number of fully loaded pages.
    pub fn resident_count(&self) -> usize {
        self.state
            .lock()
            .descriptors
            .iter()
            .filter(|desc| desc.state == SlotState::Valid)
            .count()
    }

    /// Slot holding `tag`, if resident.
    pub fn slot_of(&self, tag: BufferTag) -> Option<SlotId> {
        let state = self.state.lock();
        state.resident(tag)?;
        state.page_table.get(&tag).copied()
    }

    /// Pin count of `tag`, if resident.
    pub fn pin_count(&self, tag: BufferTag) -> Option<u32> {
        self.state.lock().resident(tag).map(|desc| desc.pin_count)
    }

    /// Usage count of `tag`, if resident.
    pub fn usage_count(&self, tag: BufferTag) -> Option<u32> {
        self.state.lock().resident(tag).map(|desc| desc.usage_count)
    }

    /// Dirty flag of `tag`, if resident.
    pub fn is_dirty(&self, tag: BufferTag) -> Option<bool> {
        self.state.lock().resident(tag).map(|desc| desc.dirty)
    }

    /// Copy of the descriptor of `slot`.
    pub fn descriptor(&self, slot: SlotId) -> Option<BufferDesc> {
        self.state.lock().descriptors.get(slot.0).cloned()
    }

    /// Check the pool's bookkeeping.
    ///
    /// The free list terminates within `pool_size` steps and has no
    /// duplicates, every other slot holds a tag indexed to exactly that
    /// slot, and usage counts respect the cap.
    ///
    /// # Errors
    /// `Error::InvariantViolation` describing the first inconsistency found.
    pub fn check_invariants(&self) -> Result<()> {
        self.state.lock().check(self.config.max_usage_count)
    }

    // ========================================================================
    // Internal: Called by PageGuard on drop
    // ========================================================================

    /// Unpin from a guard's drop. Failures are already logged by `unpin_slot`.
    pub(crate) fn release_pin(&self, slot: SlotId, is_dirty: bool) {
        let _ = self.unpin_slot(slot, is_dirty);
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    /// Pin `tag`, filling a new slot on a miss. Returns the slot.
    fn pin_page(&self, tag: BufferTag, fill: Fill) -> Result<SlotId> {
        let mut state = self.state.lock();

        let slot = loop {
            let hit = state.page_table.get(&tag).copied();
            if let Some(slot) = hit {
                let desc = &mut state.descriptors[slot.0];
                if desc.state == SlotState::Loading {
                    // Another thread is reading this tag; wait for it.
                    self.load_done.wait(&mut state);
                    continue;
                }

                desc.pin(self.config.max_usage_count);
                drop(state);
                self.handle_cache_hit(slot, tag, fill)?;
                return Ok(slot);
            }

            if let Some(slot) = self.reserve_slot(&mut state, tag)? {
                break slot;
            }
        };
        drop(state);

        // Cache miss: the slot is tagged, pinned and Loading.
        let result = {
            let mut page = self.pages[slot.0].write();
            match fill {
                Fill::Read => {
                    BufferPoolStats::bump(&self.stats.cache_misses);
                    debug!(%tag, slot = slot.0, "cache miss, reading page");
                    self.read_into(tag, &mut page)
                }
                Fill::Init(special_size) => page.init(special_size),
            }
        };

        self.finish_load(slot, tag, result, matches!(fill, Fill::Init(_)))?;
        Ok(slot)
    }

    /// Called with the pin already taken.
    fn handle_cache_hit(&self, slot: SlotId, tag: BufferTag, fill: Fill) -> Result<()> {
        BufferPoolStats::bump(&self.stats.cache_hits);
        trace!(%tag, slot = slot.0, "cache hit");

        if let Fill::Init(special_size) = fill {
            // A fresh block someone else already pulled in: format it here.
            let formatted = self.pages[slot.0].write().init(special_size);
            if let Err(e) = formatted {
                self.release_pin(slot, false);
                return Err(e);
            }
            self.state.lock().descriptors[slot.0].dirty = true;
        }
        Ok(())
    }

    /// Publish the outcome of a load and wake waiting fetchers.
    fn finish_load(&self, slot: SlotId, tag: BufferTag, result: Result<()>, dirty: bool) -> Result<()> {
        let mut state = self.state.lock();

        match result {
            Ok(()) => {
                let desc = &mut state.descriptors[slot.0];
                desc.state = SlotState::Valid;
                desc.dirty = dirty;
                drop(state);
                self.load_done.notify_all();
                Ok(())
            }
            Err(e) => {
                state.release_slot(slot);
                drop(state);
                self.load_done.notify_all();
                warn!(%tag, slot = slot.0, error = %e, "failed to load page, slot returned to free list");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Internal: Slot allocation and eviction
    // ========================================================================

    /// Claim a slot for `tag`: free list first, then the clock sweep.
    ///
    /// On success the slot is tagged, indexed, pinned once and `Loading`.
    /// Returns `Ok(None)` when the metadata lock had to be released to
    /// write back a victim and the world changed meanwhile; the caller
    /// starts over.
    fn reserve_slot(&self, state: &mut MutexGuard<'_, PoolState>, tag: BufferTag) -> Result<Option<SlotId>> {
        if let Some(slot) = state.pop_free() {
            state.begin_load(slot, tag);
            return Ok(Some(slot));
        }

        let victim = match state.sweep() {
            Some(victim) => victim,
            None => {
                BufferPoolStats::bump(&self.stats.pool_exhausted);
                warn!(%tag, pool_size = self.config.pool_size, "buffer pool exhausted");
                return Err(Error::PoolExhausted {
                    pool_size: self.config.pool_size,
                });
            }
        };

        let desc = &mut state.descriptors[victim.0];
        let old_tag = desc.tag;

        if let (true, Some(old_tag)) = (desc.dirty, old_tag) {
            // Hold the victim while its bytes go out.
            desc.pin_count += 1;
            let written = MutexGuard::unlocked(state, || {
                let page = self.pages[victim.0].read();
                self.write_image(old_tag, &page)
            });

            let desc = &mut state.descriptors[victim.0];
            desc.pin_count -= 1;
            // Any fetch during the write would have bumped usage.
            let untouched = !desc.is_pinned() && desc.usage_count == 0;
            if written.is_ok() && untouched {
                desc.dirty = false;
            }

            if !untouched || state.page_table.contains_key(&tag) {
                return Ok(None);
            }

            if let Err(e) = written {
                BufferPoolStats::bump(&self.stats.write_failures);
                error!(
                    tag = %old_tag,
                    slot = victim.0,
                    error = %e,
                    "write-back of evicted page failed, its changes are lost"
                );
            }
        }

        if let Some(old_tag) = old_tag {
            state.page_table.remove(&old_tag);
            trace!(evicted = %old_tag, slot = victim.0, "evicted page");
        }
        BufferPoolStats::bump(&self.stats.evictions);

        state.begin_load(victim, tag);
        Ok(Some(victim))
    }

    // ========================================================================
    // Internal: Disk transfer
    // ========================================================================

    /// Write `slot` to disk as `tag` if it still holds `tag` and is dirty.
    fn flush_slot_as(&self, slot: SlotId, tag: BufferTag) -> Result<()> {
        {
            let mut state = self.state.lock();
            let desc = &mut state.descriptors[slot.0];
            if desc.tag != Some(tag) || desc.state != SlotState::Valid || !desc.dirty {
                return Ok(());
            }
            // Keep the slot from being reclaimed while unlocked.
            desc.pin_count += 1;
        }

        // Hold page read lock while writing to disk
        let page = self.pages[slot.0].read();
        let result = self.write_image(tag, &page);
        {
            let mut state = self.state.lock();
            let desc = &mut state.descriptors[slot.0];
            desc.pin_count -= 1;
            if result.is_ok() {
                desc.dirty = false;
            }
        }
        drop(page);

        if let Err(e) = &result {
            BufferPoolStats::bump(&self.stats.write_failures);
            error!(%tag, slot = slot.0, error = %e, "failed to flush page");
        }
        result
    }

    /// Write one page image, stamping the checksum on the way out.
    fn write_image(&self, tag: BufferTag, page: &Page) -> Result<()> {
        if self.config.verify_checksums {
            let mut image = page.to_bytes();
            let checksum = PageHeader::compute_checksum(&image, tag);
            image[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 2]
                .copy_from_slice(&checksum.to_le_bytes());
            self.disk.write_page(tag, &image)?;
        } else {
            self.disk.write_page(tag, page.as_slice())?;
        }

        BufferPoolStats::bump(&self.stats.pages_written);
        Ok(())
    }

    /// Read `tag` into `page`, verifying the checksum if enabled and the
    /// slotted layout always.
    ///
    /// All-zero blocks (allocated, never written) skip both checks.
    fn read_into(&self, tag: BufferTag, page: &mut Page) -> Result<()> {
        self.disk.read_page(tag, page.as_mut_slice())?;
        BufferPoolStats::bump(&self.stats.pages_read);

        if page.as_slice().iter().all(|&b| b == 0) {
            return Ok(());
        }

        if self.config.verify_checksums {
            let stored = page.header().checksum;
            let computed = page.compute_checksum(tag);
            if stored != computed {
                return Err(Error::ChecksumMismatch {
                    tag,
                    stored,
                    computed,
                });
            }
        }

        page.validate().map_err(|e| match e {
            Error::CorruptPage(msg) => Error::CorruptPage(format!("{tag}: {msg}")),
            other => other,
        })
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            error!(error = %e, "failed to flush buffer pool on shutdown");
        }
    }
}
