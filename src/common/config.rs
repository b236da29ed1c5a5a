//! Configuration for the buffer pool.
//!
//! Compile-time defaults live here as constants; per-pool settings are
//! carried by [`BufferPoolConfig`].

use super::error::{Error, Result};

/// Default size of a page in bytes (8KB, the classic heap page size).
pub const DEFAULT_PAGE_SIZE: u16 = 8192;

/// Smallest page size the pool accepts.
///
/// A page must at least hold its header and a handful of line pointers.
pub const MIN_PAGE_SIZE: u16 = 64;

/// Default number of slots in the pool.
pub const DEFAULT_POOL_SIZE: usize = 1000;

/// Largest pool the intrusive free list can address (links are `i32`).
pub const MAX_POOL_SIZE: usize = i32::MAX as usize;

/// Ceiling for a slot's usage count.
///
/// A page touched this many times survives this many clock passes before
/// it can be chosen as a victim.
pub const MAX_USAGE_COUNT: u32 = 5;

/// Settings for a [`BufferPoolManager`](crate::buffer::BufferPoolManager).
///
/// # Example
/// ```
/// use pagepool::BufferPoolConfig;
///
/// let config = BufferPoolConfig::new(16).with_page_size(4096);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.pool_size, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of slots, fixed for the life of the pool.
    pub pool_size: usize,
    /// Size of every page in bytes.
    pub page_size: u16,
    /// Ceiling for usage counts in the clock sweep.
    pub max_usage_count: u32,
    /// Stamp checksums on write and verify them on read.
    pub verify_checksums: bool,
}

impl BufferPoolConfig {
    /// Config with `pool_size` slots and default everything else.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_usage_count(mut self, max_usage_count: u32) -> Self {
        self.max_usage_count = max_usage_count;
        self
    }

    pub fn with_checksums(mut self, verify_checksums: bool) -> Self {
        self.verify_checksums = verify_checksums;
        self
    }

    /// Check that the settings describe a usable pool.
    ///
    /// # Errors
    /// `Error::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be > 0".into()));
        }
        if self.pool_size > MAX_POOL_SIZE {
            return Err(Error::InvalidConfig(format!(
                "pool_size {} exceeds {}",
                self.pool_size, MAX_POOL_SIZE
            )));
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "page_size {} is below the minimum of {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        if self.max_usage_count == 0 {
            return Err(Error::InvalidConfig(
                "max_usage_count must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            max_usage_count: MAX_USAGE_COUNT,
            verify_checksums: false,
        }
    }
}
