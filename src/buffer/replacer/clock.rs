//! CLOCK (second chance) replacement policy.
//!
//! A hand sweeps the slot array in a circle. Pinned slots are skipped, a
//! slot with a non-zero usage count gets its count decremented and is
//! passed over, and the first unpinned slot with usage count zero becomes
//! the victim.

use crate::buffer::descriptor::{BufferDesc, SlotState};
use crate::common::SlotId;

/// Clock-sweep victim selection over the descriptor array.
///
/// The replacer only owns the hand; usage and pin counts live in the
/// descriptors it is handed, under the pool's metadata lock.
#[derive(Debug)]
pub struct ClockReplacer {
    /// Next slot the sweep visits.
    hand: usize,
}

impl ClockReplacer {
    /// Create a replacer whose hand starts at slot 0.
    pub fn new() -> Self {
        Self { hand: 0 }
    }

    /// Current hand position.
    #[inline]
    pub fn hand(&self) -> usize {
        self.hand
    }

    /// Select a victim slot.
    ///
    /// Starts at the hand and advances it past every visited slot. Gives up
    /// once it has visited every slot in a row without finding a victim or
    /// decrementing a usage count, which means every resident slot is
    /// pinned.
    ///
    /// Returns `None` if no slot can be evicted.
    pub fn evict(&mut self, descriptors: &mut [BufferDesc]) -> Option<SlotId> {
        let n = descriptors.len();
        if n == 0 {
            return None;
        }
        let mut tries = n;

        loop {
            let slot = self.hand;
            self.hand = (self.hand + 1) % n;
            let desc = &mut descriptors[slot];

            if desc.state != SlotState::Valid || desc.is_pinned() {
                tries -= 1;
                if tries == 0 {
                    return None;
                }
                continue;
            }

            if desc.usage_count > 0 {
                // Second chance
                desc.usage_count -= 1;
                tries = n;
                continue;
            }

            return Some(SlotId::new(slot));
        }
    }
}

impl Default for ClockReplacer {
    fn default() -> Self {
        Self::new()
    }
}
