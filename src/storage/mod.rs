//! Storage layer - disk I/O and page formats.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - The I/O collaborator of the buffer pool
//! - [`FileDiskManager`] / [`MemoryDiskManager`] - Its implementations
//! - [`page`] - The slotted page format

mod disk_manager;
mod memory_disk;
pub mod page;

pub use disk_manager::{DiskManager, FileDiskManager};
pub use memory_disk::MemoryDiskManager;
