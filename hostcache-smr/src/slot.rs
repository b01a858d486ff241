//! Reader stripes.
//!
//! A domain owns a fixed array of stripes. Each stripe carries two
//! active-reader counters, one per epoch parity. Threads are spread over the
//! stripes round robin and keep their stripe for life, so a pin is two epoch
//! loads around one `fetch_add` on a mostly thread-private cache line.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::Cell;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};
use crossbeam_utils::CachePadded;

/// Default number of reader stripes per domain.
pub const DEFAULT_STRIPES: usize = 32;

/// Upper bound on stripes; more buys nothing but a longer quiescence scan.
pub(crate) const MAX_STRIPES: usize = 256;

/// Active-reader counters of one stripe, indexed by epoch parity.
pub(crate) struct Stripe {
    active: [AtomicUsize; 2],
}

impl Stripe {
    fn new() -> Self {
        Self {
            active: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }
}

/// Fixed set of reader stripes.
pub(crate) struct ReaderSlots {
    stripes: Box<[CachePadded<Stripe>]>,
}

impl ReaderSlots {
    pub(crate) fn new(stripes: usize) -> Self {
        let n = stripes.clamp(1, MAX_STRIPES);
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(CachePadded::new(Stripe::new()));
        }
        Self {
            stripes: v.into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.stripes.len()
    }

    /// Register a reader against the current epoch.
    ///
    /// Returns the `(stripe, parity)` pair that must be handed back to
    /// [`ReaderSlots::leave`]. Retries only while the epoch moves between
    /// the observation and the announcement.
    #[inline]
    pub(crate) fn enter(&self, epoch: &AtomicU64) -> (usize, usize) {
        let stripe = thread_stripe() % self.stripes.len();
        loop {
            let seen = epoch.load(Ordering::SeqCst);
            let parity = self.announce(stripe, seen);
            if confirm(epoch, seen) {
                return (stripe, parity);
            }
            self.leave(stripe, parity);
        }
    }

    /// Count a reader under the parity of `seen`.
    ///
    /// The registration protects nothing until [`confirm`] re-reads `seen`:
    /// an advance scanning between the observation and the increment can
    /// miss it.
    #[inline]
    pub(crate) fn announce(&self, stripe: usize, seen: u64) -> usize {
        let parity = (seen & 1) as usize;
        self.stripes[stripe].active[parity].fetch_add(1, Ordering::SeqCst);
        // Pairs with the fences in `is_quiescent` and `Domain::retire`.
        // A locked RMW is already a full barrier on x86.
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
        fence(Ordering::SeqCst);
        parity
    }

    #[inline]
    pub(crate) fn leave(&self, stripe: usize, parity: usize) {
        let prev = self.stripes[stripe].active[parity].fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "reader stripe underflow");
    }

    /// True when no reader is registered under `parity` on any stripe.
    pub(crate) fn is_quiescent(&self, parity: usize) -> bool {
        // Order the caller's earlier unlinks before the counter loads.
        fence(Ordering::SeqCst);
        self.stripes
            .iter()
            .all(|s| s.active[parity].load(Ordering::SeqCst) == 0)
    }

    /// Total number of live guards, both parities.
    pub(crate) fn active_readers(&self) -> usize {
        self.stripes
            .iter()
            .map(|s| s.active[0].load(Ordering::Relaxed) + s.active[1].load(Ordering::Relaxed))
            .sum()
    }
}

/// True when the epoch still reads `seen` after the announcement.
///
/// An exact match bounds the epoch at `seen + 1` for as long as the reader
/// stays registered: the advance to `seen + 2` scans this parity after the
/// announcement and is refused. A parity match alone is not enough, since
/// two advances may have slipped in before the increment landed.
#[inline]
pub(crate) fn confirm(epoch: &AtomicU64, seen: u64) -> bool {
    epoch.load(Ordering::SeqCst) == seen
}

static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

std::thread_local! {
    static STRIPE: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Stripe ticket of the calling thread, allocated round robin on first use.
#[inline]
fn thread_stripe() -> usize {
    STRIPE.with(|s| match s.get() {
        Some(t) => t,
        None => {
            let t = NEXT_STRIPE.fetch_add(1, Ordering::Relaxed);
            s.set(Some(t));
            t
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_leave_balances() {
        let slots = ReaderSlots::new(4);
        let epoch = AtomicU64::new(1);
        let (s, p) = slots.enter(&epoch);
        assert_eq!(p, 1);
        assert_eq!(slots.active_readers(), 1);
        assert!(!slots.is_quiescent(1));
        assert!(slots.is_quiescent(0));
        slots.leave(s, p);
        assert_eq!(slots.active_readers(), 0);
        assert!(slots.is_quiescent(1));
    }

    #[test]
    fn test_stale_announcement_is_not_confirmed() {
        let slots = ReaderSlots::new(1);
        let epoch = AtomicU64::new(3);
        let seen = epoch.load(Ordering::SeqCst);
        // Two advances complete while the reader sits between its load and
        // its increment; both scanned before the increment landed.
        assert!(slots.is_quiescent(0));
        epoch.store(4, Ordering::SeqCst);
        assert!(slots.is_quiescent(1));
        epoch.store(5, Ordering::SeqCst);

        let parity = slots.announce(0, seen);
        assert_eq!(parity, 1);
        assert!(!confirm(&epoch, seen));
        slots.leave(0, parity);
        assert_eq!(slots.active_readers(), 0);

        let (s, p) = slots.enter(&epoch);
        assert_eq!(p, 1);
        assert!(confirm(&epoch, 5));
        slots.leave(s, p);
    }

    #[test]
    fn test_stripe_count_is_clamped() {
        assert_eq!(ReaderSlots::new(0).len(), 1);
        assert_eq!(ReaderSlots::new(MAX_STRIPES * 4).len(), MAX_STRIPES);
    }

    #[test]
    fn test_thread_keeps_its_stripe() {
        assert_eq!(thread_stripe(), thread_stripe());
    }
}
