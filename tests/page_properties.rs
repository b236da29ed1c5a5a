//! Property tests for the slotted page layout and the pool's pin accounting.

use std::collections::HashMap;
use std::sync::Arc;

use pagepool::{
    BufferPoolManager, BufferTag, DiskManager, Error, ItemFlags, MemoryDiskManager, OffsetNumber,
    Page, PageHandle, PageHeader,
};
use proptest::prelude::*;

// ============================================================================
// Slotted page
// ============================================================================

fn check_layout(page: &Page) -> std::result::Result<(), TestCaseError> {
    let header = page.header();
    prop_assert!(PageHeader::SIZE as u16 <= header.lower);
    prop_assert!(header.lower <= header.upper);
    prop_assert!(header.upper <= header.special);
    prop_assert!(header.special <= header.page_size);
    prop_assert_eq!(page.free_space(), header.upper - header.lower);
    Ok(())
}

proptest! {
    #[test]
    fn prop_header_bytes_roundtrip(
        lsn in any::<u64>(),
        checksum in any::<u16>(),
        lower in any::<u16>(),
        upper in any::<u16>(),
        special in any::<u16>(),
        page_size in any::<u16>(),
    ) {
        let header = PageHeader { lsn, checksum, flags: 0, lower, upper, special, page_size };
        let decoded = PageHeader::from_bytes(&header.to_bytes()).unwrap();
        prop_assert_eq!(decoded, header);
    }

    #[test]
    fn prop_add_items_keeps_layout(
        page_size in 64u16..=2048,
        special_size in 0u16..32,
        items in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 0..40),
    ) {
        let mut page = Page::new_initialized(page_size, special_size).unwrap();
        let mut stored: Vec<Vec<u8>> = vec![];

        for item in &items {
            let before = page.to_bytes();
            match page.add_item(item, ItemFlags::Normal) {
                Ok(offset) => {
                    stored.push(item.clone());
                    prop_assert_eq!(offset, OffsetNumber(stored.len() as u16));
                }
                Err(Error::PageFull { .. }) => {
                    // A rejected insert leaves the page untouched.
                    prop_assert_eq!(page.to_bytes(), before);
                }
                Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
            }
            check_layout(&page)?;
        }

        prop_assert_eq!(page.item_count() as usize, stored.len());
        page.validate().unwrap();

        let reloaded = Page::from_bytes(&page.to_bytes()).unwrap();
        let read: Vec<Vec<u8>> = reloaded.items().map(|r| r.unwrap().1.to_vec()).collect();
        prop_assert_eq!(read, stored);
        prop_assert_eq!(reloaded.special_space().len(), special_size as usize);
    }
}

// ============================================================================
// Pool pin accounting
// ============================================================================

const POOL_SIZE: usize = 3;
const BLOCKS: u32 = 8;

#[derive(Debug, Clone)]
enum Op {
    Fetch(u32),
    Unpin(prop::sample::Index, bool),
    Flush(u32),
    Evict(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..BLOCKS).prop_map(Op::Fetch),
        3 => (any::<prop::sample::Index>(), any::<bool>()).prop_map(|(i, d)| Op::Unpin(i, d)),
        1 => (0..BLOCKS).prop_map(Op::Flush),
        1 => (0..BLOCKS).prop_map(Op::Evict),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pool_ops_keep_invariants(ops in prop::collection::vec(op(), 1..80)) {
        let disk = Arc::new(MemoryDiskManager::new(256));
        for _ in 0..BLOCKS {
            disk.allocate_page(1).unwrap();
        }
        let bpm = BufferPoolManager::with_capacity(POOL_SIZE, disk).unwrap();

        let mut held: Vec<PageHandle> = vec![];
        let mut pins: HashMap<BufferTag, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Fetch(block) => {
                    let tag = BufferTag::new(1, block);
                    let pinned_tags = pins.values().filter(|&&n| n > 0).count();
                    let exhausted = pinned_tags == POOL_SIZE && !pins.get(&tag).is_some_and(|&n| n > 0);

                    match bpm.fetch(tag) {
                        Ok(handle) => {
                            prop_assert!(!exhausted);
                            *pins.entry(tag).or_insert(0) += 1;
                            held.push(handle);
                        }
                        Err(Error::PoolExhausted { .. }) => prop_assert!(exhausted),
                        Err(e) => return Err(TestCaseError::fail(format!("fetch failed: {e}"))),
                    }
                }
                Op::Unpin(index, dirty) => {
                    if held.is_empty() {
                        continue;
                    }
                    let handle = held.swap_remove(index.index(held.len()));
                    let tag = handle.tag();
                    bpm.unpin(handle, dirty).unwrap();
                    if let Some(n) = pins.get_mut(&tag) {
                        *n -= 1;
                    }
                }
                Op::Flush(block) => {
                    let tag = BufferTag::new(1, block);
                    bpm.flush(tag).unwrap();
                    if bpm.slot_of(tag).is_some() {
                        prop_assert_eq!(bpm.is_dirty(tag), Some(false));
                    }
                }
                Op::Evict(block) => {
                    let tag = BufferTag::new(1, block);
                    let pinned = pins.get(&tag).is_some_and(|&n| n > 0);
                    match bpm.evict_page(tag) {
                        Ok(_) => prop_assert!(!pinned),
                        Err(Error::PagePinned(_)) => prop_assert!(pinned),
                        Err(e) => return Err(TestCaseError::fail(format!("evict failed: {e}"))),
                    }
                }
            }

            bpm.check_invariants().unwrap();
            for (&tag, &n) in &pins {
                if n > 0 {
                    prop_assert_eq!(bpm.pin_count(tag), Some(n));
                }
            }
        }

        for handle in held {
            bpm.unpin(handle, false).unwrap();
        }
        prop_assert_eq!(bpm.free_slot_count() + bpm.resident_count(), POOL_SIZE);
    }
}
