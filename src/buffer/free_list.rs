//! Intrusive free list threaded through the descriptor array.
//!
//! Links are stored in [`BufferDesc::free_next`] as plain slot indexes with
//! `-1` as terminator, so the list needs no allocation of its own.

use crate::common::SlotId;

use super::descriptor::BufferDesc;

/// Head/tail of the singly linked list of empty slots.
#[derive(Debug)]
pub(crate) struct FreeList {
    head: i32,
    tail: i32,
    len: usize,
}

impl FreeList {
    /// Link every descriptor into the list, lowest slot id first.
    pub fn new_full(descriptors: &mut [BufferDesc]) -> Self {
        let n = descriptors.len();
        for (i, desc) in descriptors.iter_mut().enumerate() {
            desc.free_next = if i + 1 < n {
                SlotId::new(i + 1).as_link()
            } else {
                BufferDesc::FREE_LIST_END
            };
        }

        if n == 0 {
            Self {
                head: BufferDesc::FREE_LIST_END,
                tail: BufferDesc::FREE_LIST_END,
                len: 0,
            }
        } else {
            Self {
                head: 0,
                tail: SlotId::new(n - 1).as_link(),
                len: n,
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == BufferDesc::FREE_LIST_END
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn head(&self) -> i32 {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> i32 {
        self.tail
    }

    /// Unlink and return the head slot.
    pub fn pop(&mut self, descriptors: &mut [BufferDesc]) -> Option<SlotId> {
        let slot = SlotId::from_link(self.head)?;
        let desc = &mut descriptors[slot.0];

        self.head = desc.free_next;
        desc.free_next = BufferDesc::FREE_LIST_END;
        if self.head == BufferDesc::FREE_LIST_END {
            self.tail = BufferDesc::FREE_LIST_END;
        }
        self.len -= 1;
        Some(slot)
    }

    /// Append `slot` at the tail.
    pub fn push(&mut self, slot: SlotId, descriptors: &mut [BufferDesc]) {
        descriptors[slot.0].free_next = BufferDesc::FREE_LIST_END;

        match SlotId::from_link(self.tail) {
            Some(tail) => descriptors[tail.0].free_next = slot.as_link(),
            None => self.head = slot.as_link(),
        }
        self.tail = slot.as_link();
        self.len += 1;
    }

    /// Walk the list, stopping after `descriptors.len()` steps.
    ///
    /// Returns the visited slots and whether the walk reached the
    /// terminator (false means a cycle or a dangling link).
    pub fn walk(&self, descriptors: &[BufferDesc]) -> (Vec<SlotId>, bool) {
        let mut visited = Vec::new();
        let mut link = self.head;

        for _ in 0..=descriptors.len() {
            match SlotId::from_link(link) {
                None => return (visited, true),
                Some(slot) if slot.0 >= descriptors.len() => return (visited, false),
                Some(slot) => {
                    visited.push(slot);
                    link = descriptors[slot.0].free_next;
                }
            }
        }
        (visited, false)
    }
}
