//! pagepool - a shared buffer pool over slotted pages.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           pagepool                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   fetch / unpin / flush / new_page / evict_page          │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │  index Tag → Slot | descriptors | free list     │   │   │
//! │  │   │  CLOCK sweep with usage counts                  │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  │      BufferPoolManager + BufferDesc + Statistics        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Storage Layer (storage/)                   │   │
//! │  │   DiskManager + slotted Page + PageHeader + ItemId       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BufferTag, SlotId, Error, config)
//! - [`buffer`] - Buffer pool management and the clock replacer
//! - [`storage`] - Disk I/O and the slotted page format
//!
//! # Quick Start
//! ```
//! use std::sync::Arc;
//!
//! use pagepool::{BufferPoolManager, ItemFlags, MemoryDiskManager, OffsetNumber};
//!
//! let disk = Arc::new(MemoryDiskManager::new(8192));
//! let bpm = BufferPoolManager::with_capacity(16, disk).unwrap();
//!
//! // Allocate a page and add a tuple
//! let handle = bpm.new_page(1, 0).unwrap();
//! let tag = handle.tag();
//! bpm.page_mut(&handle)
//!     .add_item(b"hello", ItemFlags::Normal)
//!     .unwrap();
//! bpm.unpin(handle, true).unwrap();
//!
//! // Read it back through a guard
//! let guard = bpm.fetch_page_read(tag).unwrap();
//! assert_eq!(guard.item(OffsetNumber::FIRST).unwrap(), b"hello");
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE, MAX_USAGE_COUNT};
pub use common::{BufferPoolConfig, BufferTag, Error, PageId, Result, SlotId};

pub use buffer::{
    BufferDesc, BufferPoolManager, BufferPoolStats, PageHandle, PageReadGuard, PageWriteGuard,
    SlotState, StatsSnapshot,
};
pub use storage::page::{ItemFlags, ItemId, OffsetNumber, Page, PageFlags, PageHeader};
pub use storage::{DiskManager, FileDiskManager, MemoryDiskManager};
