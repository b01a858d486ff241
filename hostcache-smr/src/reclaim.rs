//! The reclamation domain: epoch counter, retire, and deferred reclamation.
//!
//! Protocol:
//! - `pin`: load epoch `e`, increment `stripe[e & 1]`, re-read the epoch and
//!   start over if it is no longer `e`. Guard drop decrements.
//! - `retire`: fence, then tag the item with the current epoch under the
//!   limbo lock.
//! - `try_advance`: move `e -> e + 1` only if no stripe has readers under
//!   parity `(e + 1) & 1`.
//! - `collect`: advance at most twice, then release every item tagged `t`
//!   with `t + 2 <= epoch`.
//!
//! A confirmed reader registered under `e` keeps the epoch at or below
//! `e + 1`. If it can still reach an item tagged `t`, its announcement
//! precedes the retire fence, so `e` is `t - 1` or `t`: either the epoch
//! cannot reach `t + 1`, or the advance from `t + 1` to `t + 2` scans the
//! reader's parity and is refused until the reader leaves. Writers
//! never wait: a refused advance simply leaves items in limbo for a later
//! `collect`.

use crate::guard::Guard;
use crate::retired::{Limbo, Retired};
use crate::slot::{DEFAULT_STRIPES, ReaderSlots};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

/// Epoch domain owning the retired items of one data structure.
///
/// `T` is whatever identifies a retired item to its owner: a slot index, a
/// boxed node, a handle. The domain never interprets it; it only decides
/// *when* the item may be given back through [`Domain::collect`].
pub struct Domain<T> {
    epoch: CachePadded<AtomicU64>,
    slots: ReaderSlots,
    limbo: Mutex<Limbo<T>>,
    pending: AtomicUsize,
    retired_total: AtomicU64,
    reclaimed_total: AtomicU64,
}

impl<T> Domain<T> {
    /// Create a domain with [`DEFAULT_STRIPES`] reader stripes.
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    /// Create a domain with a specific number of reader stripes.
    ///
    /// The count is clamped to `1..=256`.
    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            // Starts at 1 so that a zero tag never appears in limbo.
            epoch: CachePadded::new(AtomicU64::new(1)),
            slots: ReaderSlots::new(stripes),
            limbo: Mutex::new(Limbo::new()),
            pending: AtomicUsize::new(0),
            retired_total: AtomicU64::new(0),
            reclaimed_total: AtomicU64::new(0),
        }
    }

    /// Enter a read-side critical section.
    ///
    /// Never blocks. Loops only while the epoch moves under the pin, which
    /// happens at most once per concurrent advance.
    #[inline]
    pub fn pin(&self) -> Guard<'_> {
        let (stripe, parity) = self.slots.enter(&self.epoch);
        Guard::new(&self.slots, stripe, parity)
    }

    /// Hand an unlinked item to the domain.
    ///
    /// The caller must already have made the item unreachable for readers
    /// that pin after this call.
    pub fn retire(&self, item: T) {
        // Orders the caller's unlink before the tag; pairs with the fence
        // in `pin`.
        fence(Ordering::SeqCst);
        {
            let mut limbo = self.limbo.lock();
            let tag = self.epoch.load(Ordering::SeqCst);
            limbo.push(Retired::new(item, tag));
        }
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.retired_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Hand several unlinked items to the domain under one limbo lock.
    pub fn retire_all<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut n = 0usize;
        fence(Ordering::SeqCst);
        {
            let mut limbo = self.limbo.lock();
            let tag = self.epoch.load(Ordering::SeqCst);
            for item in items {
                limbo.push(Retired::new(item, tag));
                n += 1;
            }
        }
        if n > 0 {
            self.pending.fetch_add(n, Ordering::Relaxed);
            self.retired_total.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    /// Try to move the epoch forward by one.
    ///
    /// Returns `true` if this call, or a concurrent one, advanced the epoch.
    pub fn try_advance(&self) -> bool {
        let current = self.epoch.load(Ordering::SeqCst);
        let next_parity = ((current + 1) & 1) as usize;
        if !self.slots.is_quiescent(next_parity) {
            return false;
        }
        match self.epoch.compare_exchange(
            current,
            current + 1,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                tracing::trace!(epoch = current + 1, "reclamation epoch advanced");
                true
            }
            // Someone else advanced it; that serves us just as well.
            Err(_) => true,
        }
    }

    /// Release every item whose grace period has elapsed to `reclaim`.
    ///
    /// Returns the number of items released. The reclaimer runs without any
    /// domain lock held.
    pub fn collect<F>(&self, mut reclaim: F) -> usize
    where
        F: FnMut(T),
    {
        if self.pending.load(Ordering::Relaxed) == 0 {
            return 0;
        }
        for _ in 0..2 {
            if !self.try_advance() {
                break;
            }
        }

        let mut ready = Vec::new();
        {
            let mut limbo = self.limbo.lock();
            let current = self.epoch.load(Ordering::SeqCst);
            limbo.drain_reclaimable(current, &mut ready);
        }

        let n = ready.len();
        if n > 0 {
            self.pending.fetch_sub(n, Ordering::Relaxed);
            self.reclaimed_total.fetch_add(n as u64, Ordering::Relaxed);
            ready.into_iter().for_each(&mut reclaim);
        }
        n
    }

    /// Current epoch.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Items retired but not yet reclaimed.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Number of live guards across all stripes.
    pub fn active_readers(&self) -> usize {
        self.slots.active_readers()
    }

    /// Number of reader stripes.
    pub fn stripes(&self) -> usize {
        self.slots.len()
    }

    /// Items ever retired.
    pub fn retired_total(&self) -> u64 {
        self.retired_total.load(Ordering::Relaxed)
    }

    /// Items ever reclaimed.
    pub fn reclaimed_total(&self) -> u64 {
        self.reclaimed_total.load(Ordering::Relaxed)
    }
}

impl<T> Default for Domain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Domain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("epoch", &self.epoch())
            .field("pending", &self.pending())
            .field("stripes", &self.stripes())
            .finish()
    }
}
