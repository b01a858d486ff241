//! Index links between arena slots.
//!
//! A [`Link`] is the arena counterpart of an atomic node pointer: it holds
//! the index of the next slot in a chain, or [`NIL`]. Loads are single
//! atomic reads; stores happen only under the owning bucket's mutex.

use core::sync::atomic::{AtomicU32, Ordering};
use hostcache_smr::Guard;

/// End-of-chain marker.
pub(crate) const NIL: u32 = u32::MAX;

/// Atomic slot index.
pub(crate) struct Link {
    data: AtomicU32,
}

impl Link {
    #[inline]
    pub(crate) const fn null() -> Self {
        Self {
            data: AtomicU32::new(NIL),
        }
    }

    /// Lock-free load for readers.
    ///
    /// The guard keeps whatever slot this returns from being recycled until
    /// the guard is dropped.
    #[inline]
    pub(crate) fn load(&self, _guard: &Guard<'_>) -> Option<u32> {
        decode(self.data.load(Ordering::Acquire))
    }

    /// Load for the holder of the bucket mutex.
    #[inline]
    pub(crate) fn load_locked(&self) -> Option<u32> {
        decode(self.data.load(Ordering::Relaxed))
    }

    /// Publish a link. Release so a reader that follows it sees a fully
    /// initialized slot.
    #[inline]
    pub(crate) fn store(&self, next: Option<u32>) {
        self.data.store(next.unwrap_or(NIL), Ordering::Release);
    }
}

#[inline]
fn decode(raw: u32) -> Option<u32> {
    if raw == NIL { None } else { Some(raw) }
}
