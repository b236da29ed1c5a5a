//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between page users and
//! disk. It manages a fixed pool of slots, each holding one page.
//!
//! # Components
//! - [`BufferPoolManager`] - The main page cache
//! - [`BufferDesc`] - Per-slot metadata (tag, pins, usage, dirty, free link)
//! - [`PageHandle`] / [`PageReadGuard`] / [`PageWriteGuard`] - Pins on pages
//! - [`BufferPoolStats`] - Performance statistics
//! - [`replacer`] - Eviction policy implementations

mod buffer_pool_manager;
mod descriptor;
mod free_list;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use descriptor::{BufferDesc, SlotState};
pub use page_guard::{PageHandle, PageReadGuard, PageWriteGuard};
pub use stats::{BufferPoolStats, StatsSnapshot};
