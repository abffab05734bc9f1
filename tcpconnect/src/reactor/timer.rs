use crate::utils::Key;

use std::cmp::Ordering;
use std::time::Instant;

/// An entry in the event loop's timer queue.
///
/// `TimerEntry` represents a scheduled callback at a specific deadline.
/// Entries are stored in a `BinaryHeap` ordered by deadline; the callback
/// itself lives in a slab under `key`, so stopping a timer only removes
/// the callback and the heap entry is discarded lazily when it surfaces.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Slot of the callback in the timer slab.
    pub(crate) key: Key,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap, where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
