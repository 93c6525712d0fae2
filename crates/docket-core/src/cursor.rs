//! Clamped cursor over the visible queue.
//!
//! The cursor is a plain index; it owns no item. It must be re-clamped after
//! every mutation of the visible queue (poll apply, optimistic exclusion,
//! reconciler prune); the engine enforces that discipline, this module just
//! provides the arithmetic.

use crate::model::WorkItem;

/// Clamp a cursor into `[0, max(0, len - 1)]`.
///
/// An empty queue always clamps to 0 with nothing selected.
#[must_use]
pub fn clamp(cursor: usize, len: usize) -> usize {
    if len == 0 { 0 } else { cursor.min(len - 1) }
}

/// Selection cursor into the visible queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
}

impl Cursor {
    /// Current index. Only meaningful while the queue is non-empty.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    /// Re-clamp after the queue changed. Returns the (possibly moved) index.
    pub fn clamp_to(&mut self, len: usize) -> usize {
        self.index = clamp(self.index, len);
        self.index
    }

    /// Jump to an explicit index, clamped into range.
    pub fn select(&mut self, index: usize, len: usize) {
        self.index = clamp(index, len);
    }

    /// Step by `delta`, wrapping modulo the queue length. No-op when empty.
    pub fn step(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.index = 0;
            return;
        }
        let current = clamp(self.index, len);
        let magnitude = delta.unsigned_abs() % len;
        self.index = if delta >= 0 {
            (current + magnitude) % len
        } else {
            (current + len - magnitude) % len
        };
    }
}

/// Locate the first queue index whose item belongs to `case_id`.
#[must_use]
pub fn find_case(queue: &[WorkItem], case_id: u64) -> Option<usize> {
    queue.iter().position(|item| item.case_id() == case_id)
}
