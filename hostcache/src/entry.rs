//! Arena slots.

use crate::key::{AtomicKey, HostKey};
use crate::link::Link;
use crate::metrics::{AtomicMetrics, Metrics};
use core::sync::atomic::{AtomicU32, Ordering};
use portable_atomic::AtomicU64;

/// One cached record. Lives in the [`EntryPool`](crate::pool::EntryPool)
/// and is addressed by index.
///
/// Key and metrics are written by [`Entry::init`] while the slot is still
/// private to the inserting writer, then published by linking it into a
/// bucket chain.
pub(crate) struct Entry {
    pub(crate) key: AtomicKey,
    pub(crate) metrics: AtomicMetrics,
    /// Seconds left before the pruner evicts the entry.
    expire: AtomicU32,
    hits: AtomicU64,
    updates: AtomicU64,
    pub(crate) next: Link,
}

impl Entry {
    pub(crate) fn new() -> Self {
        Self {
            key: AtomicKey::new(),
            metrics: AtomicMetrics::new(),
            expire: AtomicU32::new(0),
            hits: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            next: Link::null(),
        }
    }

    /// Populate a freshly allocated slot.
    pub(crate) fn init(&self, key: &HostKey, sample: &Metrics, expire: u32) {
        self.key.store(key);
        self.metrics.store(sample);
        self.expire.store(expire, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.updates.store(1, Ordering::Relaxed);
        self.next.store(None);
    }

    /// Record a merge: restart the expire countdown.
    #[inline]
    pub(crate) fn touch(&self, expire: u32) {
        self.expire.store(expire, Ordering::Relaxed);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn expire(&self) -> u32 {
        self.expire.load(Ordering::Relaxed)
    }

    /// Age the entry by `elapsed` seconds; returns the seconds left.
    #[inline]
    pub(crate) fn age(&self, elapsed: u32) -> u32 {
        let left = self.expire().saturating_sub(elapsed);
        self.expire.store(left, Ordering::Relaxed);
        left
    }

    #[inline]
    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_init_resets_previous_tenant() {
        let e = Entry::new();
        let a = HostKey::from(Ipv4Addr::new(10, 0, 0, 1));
        e.init(&a, &Metrics::with_mtu(1500), 60);
        e.hit();
        e.touch(60);
        assert_eq!(e.updates(), 2);

        let b = HostKey::from(Ipv4Addr::new(10, 0, 0, 2));
        e.init(&b, &Metrics::EMPTY, 30);
        assert!(e.key.matches(&b));
        assert_eq!(e.metrics.snapshot(), Metrics::EMPTY);
        assert_eq!(e.hits(), 0);
        assert_eq!(e.updates(), 1);
        assert_eq!(e.expire(), 30);
    }

    #[test]
    fn test_age_saturates() {
        let e = Entry::new();
        e.init(&HostKey::from(Ipv4Addr::LOCALHOST), &Metrics::EMPTY, 500);
        assert_eq!(e.age(300), 200);
        assert_eq!(e.age(300), 0);
        assert_eq!(e.age(300), 0);
    }
}
