//! Epoch-stamped visited set for graph traversal, pooled per thread.
//!
//! Marking a node stores the current epoch in its slot; starting a new
//! traversal bumps the epoch instead of zeroing the array.

use std::cell::RefCell;

thread_local! {
    static POOL: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Runs `f` with this thread's visited set, grown to hold `capacity` nodes.
///
/// Concurrent queries on different threads never share scratch space, so
/// read-only traversal needs no locking. Must not be nested.
pub(crate) fn with_visited<R>(capacity: usize, f: impl FnOnce(&mut VisitedSet) -> R) -> R {
    POOL.with(|cell| {
        let mut visited = cell.borrow_mut();
        visited.grow(capacity);
        f(&mut visited)
    })
}

#[derive(Debug)]
pub(crate) struct VisitedSet {
    marks: Vec<u32>,
    epoch: u32,
}

impl VisitedSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            marks: vec![0; capacity],
            epoch: 1,
        }
    }

    /// Starts a new traversal. A full wipe only happens when the epoch wraps.
    pub(crate) fn clear(&mut self) {
        if self.epoch == u32::MAX {
            self.marks.fill(0);
            self.epoch = 1;
        } else {
            self.epoch += 1;
        }
    }

    pub(crate) fn grow(&mut self, capacity: usize) {
        if capacity > self.marks.len() {
            self.marks.resize(capacity, 0);
        }
    }

    /// Returns `true` if `node` was not yet visited in this traversal.
    #[inline]
    pub(crate) fn insert(&mut self, node: u32) -> bool {
        let slot = &mut self.marks[node as usize];
        if *slot == self.epoch {
            false
        } else {
            *slot = self.epoch;
            true
        }
    }
}
