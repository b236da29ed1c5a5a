//! Common types and utilities shared across pagepool.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`BufferPoolConfig`]
//! - Error types
//! - Identifiers ([`BufferTag`], [`SlotId`])

mod buffer_tag;
pub mod config;
pub mod error;
mod slot_id;

pub use buffer_tag::{BufferTag, PageId};
pub use config::BufferPoolConfig;
pub use error::{Error, Result};
pub use slot_id::SlotId;
