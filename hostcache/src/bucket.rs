//! Hash buckets.
//!
//! A bucket is a singly linked chain of arena slots, most recently touched
//! first. The chain topology and its length belong to whoever holds the
//! bucket mutex; readers walk the chain without it, pinned in the
//! reclamation domain.
//!
//! Unlinking only rewrites the predecessor's link. The unlinked slot keeps
//! its own `next`, so a reader standing on it still reaches the rest of the
//! chain.

use crate::entry::Entry;
use crate::key::HostKey;
use crate::link::Link;
use crate::pool::EntryPool;
use hostcache_smr::Guard;
use parking_lot::{Mutex, MutexGuard};

/// Position of a slot found during a locked scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Found {
    /// Predecessor in the chain, `None` for the head.
    pub(crate) prev: Option<u32>,
    pub(crate) idx: u32,
}

pub(crate) struct Bucket {
    head: Link,
    /// Chain length; the mutex also guards every link in the chain.
    len: Mutex<usize>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            head: Link::null(),
            len: Mutex::new(0),
        }
    }

    /// Take the bucket mutex.
    pub(crate) fn lock<'a>(&'a self, pool: &'a EntryPool) -> LockedBucket<'a> {
        LockedBucket {
            len: self.len.lock(),
            head: &self.head,
            pool,
        }
    }

    /// Lock-free walk of the chain.
    pub(crate) fn iter<'a, 'd>(
        &'a self,
        pool: &'a EntryPool,
        guard: &'a Guard<'d>,
    ) -> ChainIter<'a, 'd> {
        ChainIter {
            pool,
            guard,
            current: self.head.load(guard),
        }
    }
}

/// Reader-side chain iterator.
pub(crate) struct ChainIter<'a, 'd> {
    pool: &'a EntryPool,
    guard: &'a Guard<'d>,
    current: Option<u32>,
}

impl<'a> Iterator for ChainIter<'a, '_> {
    type Item = &'a Entry;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let entry = self.pool.entry(idx);
        self.current = entry.next.load(self.guard);
        Some(entry)
    }
}

/// A bucket whose mutex is held.
pub(crate) struct LockedBucket<'a> {
    len: MutexGuard<'a, usize>,
    head: &'a Link,
    pool: &'a EntryPool,
}

impl LockedBucket<'_> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        *self.len
    }

    #[inline]
    fn link_of(&self, prev: Option<u32>) -> &Link {
        match prev {
            None => self.head,
            Some(p) => &self.pool.entry(p).next,
        }
    }

    /// Scan for `key`, tracking the predecessor.
    pub(crate) fn find(&self, key: &HostKey) -> Option<Found> {
        let mut prev = None;
        let mut cur = self.head.load_locked();
        while let Some(idx) = cur {
            let entry = self.pool.entry(idx);
            if entry.key.matches(key) {
                return Some(Found { prev, idx });
            }
            prev = Some(idx);
            cur = entry.next.load_locked();
        }
        None
    }

    /// Publish a fully initialized slot at the head.
    pub(crate) fn push_front(&mut self, idx: u32) {
        let entry = self.pool.entry(idx);
        entry.next.store(self.head.load_locked());
        self.head.store(Some(idx));
        *self.len += 1;
    }

    /// Unlink a slot. The caller owns retiring it.
    pub(crate) fn unlink(&mut self, at: Found) {
        let next = self.pool.entry(at.idx).next.load_locked();
        self.link_of(at.prev).store(next);
        *self.len -= 1;
    }

    /// Move a slot to the head to mark it most recently touched.
    ///
    /// A reader racing the move may skip the slot once; it never loses the
    /// rest of the chain.
    pub(crate) fn move_to_front(&mut self, at: Found) {
        if at.prev.is_none() {
            return;
        }
        self.unlink(at);
        self.push_front(at.idx);
    }

    /// Unlink the least recently touched slot.
    pub(crate) fn pop_tail(&mut self) -> Option<u32> {
        let mut prev = None;
        let mut cur = self.head.load_locked()?;
        while let Some(next) = self.pool.entry(cur).next.load_locked() {
            prev = Some(cur);
            cur = next;
        }
        self.unlink(Found { prev, idx: cur });
        Some(cur)
    }

    /// Unlink every slot for which `keep` returns false, appending the
    /// unlinked indices to `removed`.
    pub(crate) fn retain<F>(&mut self, mut keep: F, removed: &mut Vec<u32>)
    where
        F: FnMut(&Entry) -> bool,
    {
        let mut prev = None;
        let mut cur = self.head.load_locked();
        while let Some(idx) = cur {
            let entry = self.pool.entry(idx);
            cur = entry.next.load_locked();
            if keep(entry) {
                prev = Some(idx);
            } else {
                self.unlink(Found { prev, idx });
                removed.push(idx);
            }
        }
    }

    /// Visit every slot in chain order.
    pub(crate) fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Entry),
    {
        let mut cur = self.head.load_locked();
        while let Some(idx) = cur {
            let entry = self.pool.entry(idx);
            f(entry);
            cur = entry.next.load_locked();
        }
    }
}
