//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`ClockReplacer`] - CLOCK sweep with usage counts (second chance)

mod clock;

pub use clock::ClockReplacer;
