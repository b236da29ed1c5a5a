//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - A slotted page over one block's bytes
//! - [`PageHeader`] - Metadata at the start of every page
//! - [`ItemId`] - Line pointers locating tuples within a page

mod item_id;
#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use item_id::{ItemFlags, ItemId, OffsetNumber};
pub use page::Page;
pub use page_header::{PageFlags, PageHeader};
