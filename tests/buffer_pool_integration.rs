//! Integration tests for the buffer pool manager.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! file-backed persistence, concurrent access and disk failures.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use pagepool::{
    BufferPoolConfig, BufferPoolManager, BufferTag, DiskManager, Error, FileDiskManager,
    ItemFlags, MemoryDiskManager, OffsetNumber, Page, Result,
};
use tempfile::tempdir;

const PAGE_SIZE: u16 = 4096;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::create(dir.path().join("data"), PAGE_SIZE).unwrap();
    let bpm = BufferPoolManager::with_capacity(pool_size, Arc::new(dm)).unwrap();
    (bpm, dir)
}

/// Page image holding one item.
fn page_with_item(item: &[u8]) -> Vec<u8> {
    let mut page = Page::new_initialized(PAGE_SIZE, 0).unwrap();
    page.add_item(item, ItemFlags::Normal).unwrap();
    page.to_bytes()
}

/// Memory disk whose reads take a while and are counted.
struct SlowDisk {
    inner: MemoryDiskManager,
    reads: AtomicU64,
}

impl DiskManager for SlowDisk {
    fn page_size(&self) -> u16 {
        self.inner.page_size()
    }

    fn read_page(&self, tag: BufferTag, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        self.inner.read_page(tag, buf)
    }

    fn write_page(&self, tag: BufferTag, data: &[u8]) -> Result<()> {
        self.inner.write_page(tag, data)
    }

    fn allocate_page(&self, object_id: u32) -> Result<BufferTag> {
        self.inner.allocate_page(object_id)
    }
}

/// Memory disk with switchable read and write failures.
struct FaultyDisk {
    inner: MemoryDiskManager,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FaultyDisk {
    fn new() -> Self {
        Self {
            inner: MemoryDiskManager::new(PAGE_SIZE),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn injected(tag: BufferTag) -> Error {
        Error::io(tag, io::Error::new(io::ErrorKind::Other, "injected failure"))
    }
}

impl DiskManager for FaultyDisk {
    fn page_size(&self) -> u16 {
        self.inner.page_size()
    }

    fn read_page(&self, tag: BufferTag, buf: &mut [u8]) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected(tag));
        }
        self.inner.read_page(tag, buf)
    }

    fn write_page(&self, tag: BufferTag, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected(tag));
        }
        self.inner.write_page(tag, data)
    }

    fn allocate_page(&self, object_id: u32) -> Result<BufferTag> {
        self.inner.allocate_page(object_id)
    }
}

/// Memory disk that can hold one write open until the test releases it.
struct GatedDisk {
    inner: MemoryDiskManager,
    gate: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl GatedDisk {
    fn new() -> Self {
        Self {
            inner: MemoryDiskManager::new(PAGE_SIZE),
            gate: AtomicBool::new(false),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl DiskManager for GatedDisk {
    fn page_size(&self) -> u16 {
        self.inner.page_size()
    }

    fn read_page(&self, tag: BufferTag, buf: &mut [u8]) -> Result<()> {
        self.inner.read_page(tag, buf)
    }

    fn write_page(&self, tag: BufferTag, data: &[u8]) -> Result<()> {
        if self.gate.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.write_page(tag, data)
    }

    fn allocate_page(&self, object_id: u32) -> Result<BufferTag> {
        self.inner.allocate_page(object_id)
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Test data persistence across multiple eviction cycles.
#[test]
fn test_data_persistence_across_evictions() {
    let (bpm, _dir) = create_bpm(2);

    // Create 5 pages with unique data (forces evictions)
    let mut tags = vec![];
    for i in 0u8..5 {
        let mut guard = bpm.new_page_write(1, 0).unwrap();
        guard.add_item(&[i, i.wrapping_mul(3)], ItemFlags::Normal).unwrap();
        tags.push(guard.tag());
    }

    // Read all back - verifies evicted pages were flushed
    for (i, &tag) in tags.iter().enumerate() {
        let guard = bpm.fetch_page_read(tag).unwrap();
        let i = i as u8;
        assert_eq!(
            guard.item(OffsetNumber::FIRST).unwrap(),
            &[i, i.wrapping_mul(3)]
        );
    }
}

/// Test flush and reload across BPM instances.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data");
    let data = b"persistent!";

    let tag;

    // First session: create and write
    {
        let dm = FileDiskManager::create(&path, PAGE_SIZE).unwrap();
        let bpm = BufferPoolManager::with_capacity(10, Arc::new(dm)).unwrap();

        let mut guard = bpm.new_page_write(7, 0).unwrap();
        tag = guard.tag();
        guard.add_item(data, ItemFlags::Normal).unwrap();
        drop(guard);

        bpm.flush_all().unwrap();
    }

    // Second session: verify data
    {
        let dm = FileDiskManager::open(&path, PAGE_SIZE).unwrap();
        assert_eq!(dm.block_count(7).unwrap(), 1);
        let bpm = BufferPoolManager::with_capacity(10, Arc::new(dm)).unwrap();

        let guard = bpm.fetch_page_read(tag).unwrap();
        assert_eq!(guard.item(OffsetNumber::FIRST).unwrap(), data);
        guard.validate().unwrap();
    }
}

/// Checksums stamped by one session verify in the next.
#[test]
fn test_checksums_across_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data");
    let config = BufferPoolConfig::new(4)
        .with_page_size(PAGE_SIZE)
        .with_checksums(true);

    let tag;
    {
        let dm = FileDiskManager::create(&path, PAGE_SIZE).unwrap();
        let bpm = BufferPoolManager::new(config, Arc::new(dm)).unwrap();
        let mut guard = bpm.new_page_write(2, 8).unwrap();
        guard.add_item(b"checked", ItemFlags::Normal).unwrap();
        guard.special_space_mut().copy_from_slice(&[9; 8]);
        tag = guard.tag();
        // Dropping the pool flushes.
    }

    let dm = FileDiskManager::open(&path, PAGE_SIZE).unwrap();
    let bpm = BufferPoolManager::new(config, Arc::new(dm)).unwrap();
    let guard = bpm.fetch_page_read(tag).unwrap();
    assert!(guard.verify_checksum(tag));
    assert_eq!(guard.special_space(), &[9; 8]);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Test concurrent writers to different pages.
#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let tags: Vec<BufferTag> = (0..5)
        .map(|_| bpm.new_page_write(1, 0).unwrap().tag())
        .collect();

    let mut handles = vec![];
    for &tag in &tags {
        let bpm = Arc::clone(&bpm);
        handles.push(thread::spawn(move || {
            for i in 0..50u8 {
                let mut guard = bpm.fetch_page_write(tag).unwrap();
                guard.add_item(&[i], ItemFlags::Normal).unwrap();
                guard.set_lsn(i as u64);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Verify each page has every write in order
    for &tag in &tags {
        let guard = bpm.fetch_page_read(tag).unwrap();
        assert_eq!(guard.item_count(), 50);
        assert_eq!(guard.lsn(), 49);
        let items: Vec<u8> = guard.items().map(|r| r.unwrap().1[0]).collect();
        assert_eq!(items, (0..50).collect::<Vec<u8>>());
    }
}

/// Simultaneous misses on one tag share a single disk read.
#[test]
fn test_concurrent_fetch_same_tag_reads_once() {
    let disk = Arc::new(SlowDisk {
        inner: MemoryDiskManager::new(PAGE_SIZE),
        reads: AtomicU64::new(0),
    });
    let tag = disk.allocate_page(1).unwrap();
    disk.inner.put_page(tag, &page_with_item(b"shared"));

    let bpm = Arc::new(BufferPoolManager::with_capacity(4, disk.clone()).unwrap());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let guard = bpm.fetch_page_read(tag).unwrap();
                assert_eq!(guard.item(OffsetNumber::FIRST).unwrap(), b"shared");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(disk.reads.load(Ordering::SeqCst), 1);
    let stats = bpm.stats().snapshot();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 7);
    assert_eq!(bpm.pin_count(tag), Some(0));
}

/// Many threads cycling through more pages than slots always see the
/// bytes of the page they asked for.
#[test]
fn test_concurrent_churn_no_use_after_evict() {
    const BLOCKS: u32 = 32;
    const THREADS: u32 = 8;

    let disk = Arc::new(MemoryDiskManager::new(PAGE_SIZE));
    for block in 0..BLOCKS {
        let tag = disk.allocate_page(1).unwrap();
        disk.put_page(tag, &page_with_item(&block.to_le_bytes()));
    }
    let bpm = Arc::new(BufferPoolManager::with_capacity(4, disk).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for i in 0..200u32 {
                    let block = (t * 7 + i * 13) % BLOCKS;
                    let tag = BufferTag::new(1, block);
                    let guard = loop {
                        match bpm.fetch_page_read(tag) {
                            Ok(guard) => break guard,
                            Err(e) if e.is_retryable() => thread::yield_now(),
                            Err(e) => panic!("fetch failed: {e}"),
                        }
                    };
                    assert_eq!(
                        guard.item(OffsetNumber::FIRST).unwrap(),
                        &block.to_le_bytes()
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    bpm.check_invariants().unwrap();
    for block in 0..BLOCKS {
        assert!(matches!(
            bpm.pin_count(BufferTag::new(1, block)),
            None | Some(0)
        ));
    }
}

// ============================================================================
// Disk failures
// ============================================================================

#[test]
fn test_read_failure_leaves_pool_intact() {
    let disk = Arc::new(FaultyDisk::new());
    let tag = disk.allocate_page(1).unwrap();
    let bpm = BufferPoolManager::with_capacity(2, disk.clone()).unwrap();

    disk.fail_reads.store(true, Ordering::SeqCst);
    assert!(matches!(bpm.fetch(tag), Err(Error::Io { .. })));
    assert_eq!(bpm.free_slot_count(), 2);
    assert_eq!(bpm.slot_of(tag), None);
    bpm.check_invariants().unwrap();

    disk.fail_reads.store(false, Ordering::SeqCst);
    let h = bpm.fetch(tag).unwrap();
    bpm.unpin(h, false).unwrap();
}

#[test]
fn test_write_failure_on_eviction_reuses_slot() {
    let disk = Arc::new(FaultyDisk::new());
    let other = disk.allocate_page(1).unwrap();
    let bpm = BufferPoolManager::with_capacity(1, disk.clone()).unwrap();

    let h = bpm.new_page(1, 0).unwrap();
    let dirty = h.tag();
    bpm.unpin(h, true).unwrap();

    disk.fail_writes.store(true, Ordering::SeqCst);
    let h = bpm.fetch(other).unwrap();
    assert_eq!(bpm.slot_of(dirty), None);

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.write_failures, 1);
    assert_eq!(stats.evictions, 1);

    bpm.unpin(h, false).unwrap();
    bpm.check_invariants().unwrap();
}

#[test]
fn test_flush_failure_keeps_page_dirty() {
    let disk = Arc::new(FaultyDisk::new());
    let bpm = BufferPoolManager::with_capacity(2, disk.clone()).unwrap();

    let h = bpm.new_page(1, 0).unwrap();
    let tag = h.tag();
    bpm.unpin(h, true).unwrap();

    disk.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(bpm.flush(tag), Err(Error::Io { .. })));
    assert!(matches!(bpm.flush_all(), Err(Error::Io { .. })));
    assert!(matches!(bpm.evict_page(tag), Err(Error::Io { .. })));
    assert_eq!(bpm.is_dirty(tag), Some(true));

    disk.fail_writes.store(false, Ordering::SeqCst);
    bpm.flush(tag).unwrap();
    assert_eq!(bpm.is_dirty(tag), Some(false));
    assert_eq!(bpm.stats().snapshot().write_failures, 3);
}

/// A page mid write-back holds a temporary pin: it cannot be evicted, and a
/// pool whose only slot it is has no victim until the write ends.
#[test]
fn test_page_pinned_while_flushing() {
    let disk = Arc::new(GatedDisk::new());
    let other = disk.allocate_page(1).unwrap();
    let bpm = Arc::new(BufferPoolManager::with_capacity(1, disk.clone()).unwrap());

    let h = bpm.new_page(1, 0).unwrap();
    let tag = h.tag();
    bpm.unpin(h, true).unwrap();

    disk.gate.store(true, Ordering::SeqCst);
    let flusher = {
        let bpm = Arc::clone(&bpm);
        thread::spawn(move || bpm.flush(tag))
    };

    disk.entered.wait();
    assert_eq!(bpm.pin_count(tag), Some(1));
    assert!(matches!(bpm.evict_page(tag), Err(Error::PagePinned(t)) if t == tag));
    assert!(matches!(bpm.fetch(other), Err(Error::PoolExhausted { pool_size: 1 })));
    disk.release.wait();

    flusher.join().unwrap().unwrap();
    assert_eq!(bpm.pin_count(tag), Some(0));
    assert_eq!(bpm.is_dirty(tag), Some(false));
    assert!(bpm.evict_page(tag).unwrap());

    let h = bpm.fetch(other).unwrap();
    bpm.unpin(h, false).unwrap();
    bpm.check_invariants().unwrap();
}

// ============================================================================
// Stats
// ============================================================================

/// Test stats accuracy under load.
#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_bpm(2);

    let tag = bpm.new_page_write(1, 0).unwrap().tag();

    // Multiple fetches = cache hits
    for _ in 0..5 {
        let _guard = bpm.fetch_page_read(tag).unwrap();
    }

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.cache_hits, 5);
    assert_eq!(stats.cache_misses, 0);

    // Force eviction
    let _ = bpm.new_page_write(1, 0).unwrap();
    let _ = bpm.new_page_write(1, 0).unwrap();

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.evictions, 1);
    assert!(stats.pages_written >= 1);

    bpm.stats().reset();
    assert_eq!(bpm.stats().snapshot().cache_hits, 0);
}
