//! The bucketed hash table.
//!
//! # Architecture
//! - **Buckets**: fixed array, `hashsize` long, each a mutex-guarded chain of
//!   arena slots ordered by recency.
//! - **Readers**: pin the reclamation domain and walk one chain lock-free.
//! - **Writers**: hold exactly one bucket mutex at a time. Unlinked slots
//!   go to the domain and come back to the pool once no reader can see them.
//! - **Capacity**: `count` is reserved with a bounded CAS before a slot is
//!   populated, so it never exceeds `cache_limit`.

use crate::bucket::Bucket;
use crate::config::{DEFAULT_EXPIRE_SECS, DEFAULT_PRUNE_SECS, HostCacheConfig};
use crate::key::HostKey;
use crate::merge;
use crate::metrics::Metrics;
use crate::pool::EntryPool;
use crate::salt::SaltSource;
use crate::stats::{Counters, HostCacheEntry, HostCacheStats};
use core::hash::BuildHasher;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use foldhash::quality::FixedState;
use hostcache_smr::Domain;
use portable_atomic::AtomicU64;

const PURGE: u8 = 0b01;
const ROTATE: u8 = 0b10;

pub(crate) struct HashTable {
    buckets: Box<[Bucket]>,
    mask: usize,
    bucket_limit: usize,
    cache_limit: usize,
    salt: AtomicU64,
    salt_source: Box<dyn SaltSource>,
    pool: EntryPool,
    domain: Domain<u32>,
    count: CachePadded<AtomicUsize>,
    expire: AtomicU32,
    prune: AtomicU32,
    enabled: AtomicBool,
    pending_purge: AtomicU8,
    counters: CachePadded<Counters>,
}

impl HashTable {
    /// Build a table from an already normalized config.
    pub(crate) fn new(config: &HostCacheConfig, salt_source: Box<dyn SaltSource>) -> Self {
        let mut buckets = Vec::with_capacity(config.hashsize);
        for _ in 0..config.hashsize {
            buckets.push(Bucket::new());
        }
        let salt = salt_source.next_salt();
        // Live set plus one generation waiting out its grace period.
        let pool = EntryPool::new(config.cache_limit.saturating_mul(2));
        tracing::info!(
            hashsize = config.hashsize,
            bucket_limit = config.bucket_limit,
            cache_limit = config.cache_limit,
            max_slots = pool.capacity(),
            expire = config.expire_secs,
            prune = config.prune_secs,
            "hostcache: table created"
        );
        Self {
            buckets: buckets.into_boxed_slice(),
            mask: config.hashsize - 1,
            bucket_limit: config.bucket_limit,
            cache_limit: config.cache_limit,
            salt: AtomicU64::new(salt),
            salt_source,
            pool,
            domain: Domain::new(),
            count: CachePadded::new(AtomicUsize::new(0)),
            expire: AtomicU32::new(config.expire_secs),
            prune: AtomicU32::new(config.prune_secs),
            enabled: AtomicBool::new(config.enabled),
            pending_purge: AtomicU8::new(0),
            counters: CachePadded::new(Counters::default()),
        }
    }

    /// Bucket a key hashes to under the current salt.
    #[inline]
    pub(crate) fn bucket_index(&self, key: &HostKey) -> usize {
        let (bytes, len) = key.hash_bytes();
        let hasher = FixedState::with_seed(self.salt.load(Ordering::Relaxed));
        (hasher.hash_one(&bytes[..len]) as usize) & self.mask
    }

    #[inline]
    fn bucket(&self, key: &HostKey) -> &Bucket {
        &self.buckets[self.bucket_index(key)]
    }

    /// Lock-free lookup.
    pub(crate) fn lookup(&self, key: &HostKey) -> Option<Metrics> {
        if !self.enabled() {
            return None;
        }
        let guard = self.domain.pin();
        let entry = self
            .bucket(key)
            .iter(&self.pool, &guard)
            .find(|e| e.key.matches(key))?;
        let metrics = entry.metrics.snapshot();
        entry.hit();
        Some(metrics)
    }

    /// Lock-free MTU lookup; `None` unless an MTU is known.
    pub(crate) fn lookup_mtu(&self, key: &HostKey) -> Option<u32> {
        if !self.enabled() {
            return None;
        }
        let guard = self.domain.pin();
        let entry = self
            .bucket(key)
            .iter(&self.pool, &guard)
            .find(|e| e.key.matches(key))?;
        entry.hit();
        match entry.metrics.mtu.load(Ordering::Relaxed) {
            0 => None,
            mtu => Some(mtu),
        }
    }

    /// Merge `sample` into the entry for `key`, creating it if needed.
    pub(crate) fn update(&self, key: &HostKey, sample: &Metrics) {
        if !self.enabled() {
            return;
        }
        let mut evicted = Vec::new();
        self.update_locked(key, sample, &mut evicted);
        if !evicted.is_empty() {
            self.domain.retire_all(evicted);
        }
    }

    fn update_locked(&self, key: &HostKey, sample: &Metrics, evicted: &mut Vec<u32>) {
        let mut bucket = self.bucket(key).lock(&self.pool);

        if let Some(found) = bucket.find(key) {
            let entry = self.pool.entry(found.idx);
            merge::apply(&entry.metrics, sample);
            entry.touch(self.expire());
            bucket.move_to_front(found);
            self.counters.merges.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Room comes out of this bucket, never another one. The evicted
        // entry's unit of `count` passes straight to the new entry.
        let bucket_full = bucket.len() >= self.bucket_limit;
        if bucket_full || !self.reserve() {
            let Some(idx) = bucket.pop_tail() else {
                return;
            };
            self.overflow(idx, if bucket_full { "bucket full" } else { "cache full" });
            evicted.push(idx);
        }

        let idx = match self.pool.alloc() {
            Some(idx) => idx,
            None => {
                self.reclaim();
                match self.pool.alloc() {
                    Some(idx) => idx,
                    None => {
                        self.release();
                        self.counters.alloc_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            pending = self.domain.pending(),
                            "hostcache: no free entry, update dropped"
                        );
                        return;
                    }
                }
            }
        };
        self.pool.entry(idx).init(key, sample, self.expire());
        bucket.push_front(idx);
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn overflow(&self, idx: u32, reason: &'static str) {
        self.counters.overflows.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(slot = idx, reason, "hostcache: evicted least recently touched entry");
    }

    /// Reserve one unit of `cache_limit`.
    #[inline]
    fn reserve(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| {
                (n < self.cache_limit).then_some(n + 1)
            })
            .is_ok()
    }

    #[inline]
    fn release(&self) {
        self.release_n(1);
    }

    #[inline]
    fn release_n(&self, n: usize) {
        if n > 0 {
            self.count.fetch_sub(n, Ordering::AcqRel);
        }
    }

    /// Age every entry by the prune interval and drop the ones that run out.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn expire_pass(&self) -> usize {
        let prune = self.prune();
        let removed = self.sweep(|e| e.age(prune) > 0);
        Counters::add(&self.counters.expired, removed);
        tracing::debug!(removed, prune, "hostcache: expire pass");
        removed
    }

    /// Unlink every entry. Returns the number of entries removed.
    pub(crate) fn purge_all(&self) -> usize {
        let removed = self.sweep(|_| false);
        Counters::add(&self.counters.purged, removed);
        tracing::debug!(removed, "hostcache: purged");
        removed
    }

    /// Visit the buckets one at a time, unlinking entries `keep` rejects.
    fn sweep<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&crate::entry::Entry) -> bool,
    {
        let mut removed = Vec::new();
        let mut total = 0;
        for bucket in self.buckets.iter() {
            bucket.lock(&self.pool).retain(&mut keep, &mut removed);
            if !removed.is_empty() {
                total += removed.len();
                self.release_n(removed.len());
                self.domain.retire_all(removed.drain(..));
            }
        }
        total
    }

    /// Draw a fresh salt. Entries already placed stay where they are and
    /// age out normally.
    pub(crate) fn rotate_salt(&self) {
        self.salt
            .store(self.salt_source.next_salt(), Ordering::Relaxed);
        self.counters.salt_rotations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("hostcache: salt rotated");
    }

    /// Ask the next tick for a full purge.
    pub(crate) fn request_purge(&self, rotate_salt: bool) {
        let flags = if rotate_salt { PURGE | ROTATE } else { PURGE };
        self.pending_purge.fetch_or(flags, Ordering::AcqRel);
    }

    /// Take a pending purge request; `Some(rotate_salt)` if there was one.
    pub(crate) fn take_purge_request(&self) -> Option<bool> {
        let flags = self.pending_purge.swap(0, Ordering::AcqRel);
        (flags & PURGE != 0).then_some(flags & ROTATE != 0)
    }

    /// Return every slot whose grace period has elapsed to the pool.
    pub(crate) fn reclaim(&self) -> usize {
        let mut ready = Vec::new();
        let n = self.domain.collect(|idx| ready.push(idx));
        if n > 0 {
            self.pool.free_all(ready);
        }
        n
    }

    /// Visit every live entry, one bucket at a time.
    ///
    /// Each bucket is copied under its mutex and `f` runs after the mutex is
    /// released, so `f` may call back into the cache.
    pub(crate) fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(HostCacheEntry),
    {
        let mut batch = Vec::with_capacity(self.bucket_limit);
        for bucket in self.buckets.iter() {
            bucket.lock(&self.pool).for_each(|e| {
                if let Some(key) = e.key.load() {
                    batch.push(HostCacheEntry {
                        key,
                        metrics: e.metrics.snapshot(),
                        expire: e.expire(),
                        hits: e.hits(),
                        updates: e.updates(),
                    });
                }
            });
            batch.drain(..).for_each(&mut f);
        }
    }

    /// `h[len]` = number of buckets whose chain holds `len` entries.
    pub(crate) fn histogram(&self) -> Vec<usize> {
        let mut h = vec![0; self.bucket_limit + 1];
        for bucket in self.buckets.iter() {
            let len = bucket.lock(&self.pool).len();
            h[len.min(self.bucket_limit)] += 1;
        }
        h
    }

    #[cfg(test)]
    fn bucket_len(&self, idx: usize) -> usize {
        self.buckets[idx & self.mask].lock(&self.pool).len()
    }

    pub(crate) fn stats(&self) -> HostCacheStats {
        let mut stats = HostCacheStats {
            entries: self.len(),
            cache_limit: self.cache_limit,
            pending_reclaim: self.domain.pending(),
            free_slots: self.pool.available(),
            resident_slots: self.pool.resident(),
            ..HostCacheStats::default()
        };
        self.counters.fill(&mut stats);
        stats
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn hashsize(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn bucket_limit(&self) -> usize {
        self.bucket_limit
    }

    #[inline]
    pub(crate) fn cache_limit(&self) -> usize {
        self.cache_limit
    }

    #[inline]
    pub(crate) fn expire(&self) -> u32 {
        self.expire.load(Ordering::Relaxed)
    }

    /// Zero falls back to the default, like the config.
    pub(crate) fn set_expire(&self, secs: u32) {
        let secs = if secs == 0 {
            tracing::warn!(default = DEFAULT_EXPIRE_SECS, "hostcache: zero expire, using default");
            DEFAULT_EXPIRE_SECS
        } else {
            secs
        };
        self.expire.store(secs, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn prune(&self) -> u32 {
        self.prune.load(Ordering::Relaxed)
    }

    /// Zero falls back to the default, like the config.
    pub(crate) fn set_prune(&self, secs: u32) {
        let secs = if secs == 0 {
            tracing::warn!(default = DEFAULT_PRUNE_SECS, "hostcache: zero prune interval, using default");
            DEFAULT_PRUNE_SECS
        } else {
            secs
        };
        self.prune.store(secs, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}
