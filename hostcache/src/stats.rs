//! Diagnostics: counters and listing records.

use crate::key::HostKey;
use crate::metrics::Metrics;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;
use serde::Serialize;

/// One live entry, as seen by [`HostCache::for_each_entry`](crate::HostCache::for_each_entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostCacheEntry {
    /// Destination.
    pub key: HostKey,
    /// Cached metrics at the time of the visit.
    pub metrics: Metrics,
    /// Seconds left before the pruner evicts the entry.
    pub expire: u32,
    /// Lock-free lookups that found the entry.
    pub hits: u64,
    /// Samples merged into the entry, including the one that created it.
    pub updates: u64,
}

/// Point-in-time counters of a cache.
///
/// Fields are read one by one and may not be mutually consistent under
/// concurrent traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostCacheStats {
    /// Live entries.
    pub entries: usize,
    /// Maximum live entries.
    pub cache_limit: usize,
    /// Entries created.
    pub inserts: u64,
    /// Samples merged into existing entries.
    pub merges: u64,
    /// Entries evicted to make room for a new one.
    pub overflows: u64,
    /// Inserts dropped because no arena slot was free.
    pub alloc_failures: u64,
    /// Entries removed by expire passes.
    pub expired: u64,
    /// Entries removed by full purges.
    pub purged: u64,
    /// Salt rotations.
    pub salt_rotations: u64,
    /// Unlinked entries still waiting for readers to leave.
    pub pending_reclaim: usize,
    /// Arena slots that can still be handed out.
    pub free_slots: usize,
    /// Arena slots backed by memory; grows in chunks up to `2 * cache_limit`.
    pub resident_slots: usize,
}

/// Writer-side event counters.
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) inserts: AtomicU64,
    pub(crate) merges: AtomicU64,
    pub(crate) overflows: AtomicU64,
    pub(crate) alloc_failures: AtomicU64,
    pub(crate) expired: AtomicU64,
    pub(crate) purged: AtomicU64,
    pub(crate) salt_rotations: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    /// Fill the counter fields of `stats`.
    pub(crate) fn fill(&self, stats: &mut HostCacheStats) {
        stats.inserts = self.inserts.load(Ordering::Relaxed);
        stats.merges = self.merges.load(Ordering::Relaxed);
        stats.overflows = self.overflows.load(Ordering::Relaxed);
        stats.alloc_failures = self.alloc_failures.load(Ordering::Relaxed);
        stats.expired = self.expired.load(Ordering::Relaxed);
        stats.purged = self.purged.load(Ordering::Relaxed);
        stats.salt_rotations = self.salt_rotations.load(Ordering::Relaxed);
    }
}
