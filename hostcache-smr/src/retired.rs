//! Limbo bookkeeping for retired items.
//!
//! A retired item is tagged with the epoch observed at retirement. Tags are
//! taken under the limbo lock, so the list is ordered by tag and reclamation
//! only ever pops from the front.

use alloc::collections::VecDeque;

/// An unlinked item waiting for its grace period.
#[derive(Debug)]
pub(crate) struct Retired<T> {
    pub(crate) item: T,
    pub(crate) epoch: u64,
}

impl<T> Retired<T> {
    #[inline]
    pub(crate) fn new(item: T, epoch: u64) -> Self {
        Self { item, epoch }
    }

    /// An item tagged `t` is safe once the domain reaches `t + 2`: both
    /// parities have drained at least once since the tag was taken.
    #[inline]
    pub(crate) fn is_reclaimable(&self, current_epoch: u64) -> bool {
        self.epoch + 2 <= current_epoch
    }
}

/// Ordered queue of retired items.
pub(crate) struct Limbo<T> {
    queue: VecDeque<Retired<T>>,
}

impl<T> Limbo<T> {
    pub(crate) const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, retired: Retired<T>) {
        debug_assert!(
            self.queue.back().is_none_or(|b| b.epoch <= retired.epoch),
            "limbo tags must be monotonic"
        );
        self.queue.push_back(retired);
    }

    /// Move every reclaimable item at the front into `out`.
    pub(crate) fn drain_reclaimable(&mut self, current_epoch: u64, out: &mut alloc::vec::Vec<T>) {
        while let Some(front) = self.queue.front() {
            if !front.is_reclaimable(current_epoch) {
                break;
            }
            if let Some(r) = self.queue.pop_front() {
                out.push(r.item);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
