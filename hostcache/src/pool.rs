//! Bounded entry arena.
//!
//! Slots live in fixed-size chunks that are allocated on first use, up to
//! the capacity given at construction. `alloc` hands out the index of a free
//! slot, `free_all` takes indices back. Slots are only ever freed by the
//! reclamation domain, so an index returned by `alloc` is never still
//! visible to a pinned reader.
//!
//! A chunk, once published, stays put until the pool drops: readers hold
//! plain `&Entry` references into it.

use crate::entry::Entry;
use once_cell::race::OnceBox;
use parking_lot::Mutex;
use std::collections::TryReserveError;

const CHUNK_SHIFT: u32 = 10;
/// Slots per chunk.
const CHUNK_SLOTS: usize = 1 << CHUNK_SHIFT;
const CHUNK_MASK: usize = CHUNK_SLOTS - 1;

type Chunk = Box<[Entry]>;

struct FreeList {
    /// Slots handed back by the reclamation domain.
    recycled: Vec<u32>,
    /// First index never handed out.
    fresh: u32,
}

pub(crate) struct EntryPool {
    chunks: Box<[OnceBox<Chunk>]>,
    capacity: usize,
    free: Mutex<FreeList>,
}

impl EntryPool {
    /// `capacity` must fit below the `NIL` link marker.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.min(crate::link::NIL as usize);
        let chunks = capacity.div_ceil(CHUNK_SLOTS);
        Self {
            chunks: (0..chunks).map(|_| OnceBox::new()).collect(),
            capacity,
            free: Mutex::new(FreeList {
                recycled: Vec::new(),
                fresh: 0,
            }),
        }
    }

    /// Hand out a free slot, growing the arena by one chunk if needed.
    ///
    /// `None` when the arena is at capacity or a new chunk cannot be
    /// allocated.
    pub(crate) fn alloc(&self) -> Option<u32> {
        let mut free = self.free.lock();
        if let Some(idx) = free.recycled.pop() {
            return Some(idx);
        }
        let idx = free.fresh;
        if idx as usize >= self.capacity {
            return None;
        }
        if !self.grow(idx as usize >> CHUNK_SHIFT) {
            return None;
        }
        free.fresh += 1;
        Some(idx)
    }

    /// Make sure chunk `c` exists. Only called under the free-list mutex.
    fn grow(&self, c: usize) -> bool {
        let len = CHUNK_SLOTS.min(self.capacity - c * CHUNK_SLOTS);
        let chunk = self.chunks[c].get_or_try_init(|| -> Result<Box<Chunk>, TryReserveError> {
            let mut slots = Vec::new();
            slots.try_reserve_exact(len)?;
            slots.extend((0..len).map(|_| Entry::new()));
            tracing::trace!(chunk = c, slots = len, "hostcache: arena chunk allocated");
            Ok(Box::new(slots.into_boxed_slice()))
        });
        match chunk {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(%error, chunk = c, "hostcache: arena chunk allocation failed");
                false
            }
        }
    }

    /// Return slots whose grace period has elapsed.
    pub(crate) fn free_all<I>(&self, idx: I)
    where
        I: IntoIterator<Item = u32>,
    {
        self.free.lock().recycled.extend(idx);
    }

    /// Slot `idx`. Every index reaching here came out of `alloc`, which
    /// published its chunk first.
    #[inline]
    pub(crate) fn entry(&self, idx: u32) -> &Entry {
        let idx = idx as usize;
        match self.chunks[idx >> CHUNK_SHIFT].get() {
            Some(chunk) => &chunk[idx & CHUNK_MASK],
            None => unreachable!("arena slot {idx} was never allocated"),
        }
    }

    /// Upper bound on slots.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently backed by memory.
    pub(crate) fn resident(&self) -> usize {
        self.chunks
            .iter()
            .filter_map(|c| c.get())
            .map(|c| c.len())
            .sum()
    }

    /// Slots that can still be handed out, allocated or not.
    pub(crate) fn available(&self) -> usize {
        let free = self.free.lock();
        free.recycled.len() + (self.capacity - free.fresh as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_until_exhausted() {
        let pool = EntryPool::new(3);
        assert_eq!(pool.alloc(), Some(0));
        assert_eq!(pool.alloc(), Some(1));
        assert_eq!(pool.alloc(), Some(2));
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.available(), 0);

        pool.free_all([1]);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.alloc(), Some(1));
    }

    #[test]
    fn test_free_all() {
        let pool = EntryPool::new(4);
        let taken: Vec<u32> = (0..4).filter_map(|_| pool.alloc()).collect();
        assert_eq!(taken.len(), 4);
        pool.free_all(taken);
        assert_eq!(pool.available(), pool.capacity());
    }

    #[test]
    fn test_chunks_are_allocated_on_demand() {
        let pool = EntryPool::new(CHUNK_SLOTS * 2 + 5);
        assert_eq!(pool.resident(), 0);
        assert_eq!(pool.available(), CHUNK_SLOTS * 2 + 5);

        assert_eq!(pool.alloc(), Some(0));
        assert_eq!(pool.resident(), CHUNK_SLOTS);

        for _ in 1..CHUNK_SLOTS * 2 {
            assert!(pool.alloc().is_some());
        }
        assert_eq!(pool.resident(), CHUNK_SLOTS * 2);

        // The tail chunk only holds what the capacity leaves over.
        assert_eq!(pool.alloc(), Some((CHUNK_SLOTS * 2) as u32));
        assert_eq!(pool.resident(), CHUNK_SLOTS * 2 + 5);
        assert!(pool.entry((CHUNK_SLOTS * 2) as u32).key.load().is_none());
    }

    #[test]
    fn test_recycled_slots_come_back_before_growth() {
        let pool = EntryPool::new(CHUNK_SLOTS * 4);
        let a = pool.alloc();
        pool.free_all(a);
        assert_eq!(pool.alloc(), a);
        assert_eq!(pool.resident(), CHUNK_SLOTS);
    }

    #[test]
    fn test_huge_capacity_costs_nothing_up_front() {
        let pool = EntryPool::new(1 << 30);
        assert_eq!(pool.resident(), 0);
        assert_eq!(pool.capacity(), 1 << 30);
        assert_eq!(pool.alloc(), Some(0));
        assert_eq!(pool.resident(), CHUNK_SLOTS);
    }
}
