//! The public cache handle.

use crate::config::HostCacheConfig;
use crate::error::{HostCacheError, Result};
use crate::key::HostKey;
use crate::metrics::Metrics;
use crate::prune::{self, PrunerHandle, TickReport};
use crate::salt::{SaltSource, ThreadRngSalt};
use crate::stats::{HostCacheEntry, HostCacheStats};
use crate::table::HashTable;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;

/// Lifecycle of a [`HostCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    /// Serving lookups and updates.
    Initialized = 0,
    /// Shutting down: lookups miss, updates are ignored.
    Draining = 1,
    /// Emptied; only dropping the handle is left.
    Destroyed = 2,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Lifecycle::Initialized,
            1 => Lifecycle::Draining,
            _ => Lifecycle::Destroyed,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Initialized => "initialized",
            Lifecycle::Draining => "draining",
            Lifecycle::Destroyed => "destroyed",
        })
    }
}

/// A bounded, concurrent cache of per-destination TCP path metrics.
///
/// `get` and `get_mtu` never block. `update` holds one bucket mutex for a
/// short, bounded critical section. Nothing on either path reports failure:
/// the cache is advisory and a miss is always a safe answer.
///
/// Share it across threads with `Arc<HostCache>`.
///
/// # Example
///
/// ```
/// use hostcache::{HostCache, HostCacheConfig, Metrics};
/// use std::net::Ipv4Addr;
///
/// let cache = HostCache::new(HostCacheConfig::default());
/// let peer = Ipv4Addr::new(192, 0, 2, 7);
///
/// cache.update(peer, Metrics { rtt: 100, ..Metrics::EMPTY });
/// cache.update(peer, Metrics { rtt: 200, ..Metrics::EMPTY });
/// assert_eq!(cache.get(peer).rtt, 150);
///
/// cache.shutdown();
/// assert!(cache.lookup(peer).is_none());
/// ```
pub struct HostCache {
    table: Arc<HashTable>,
    state: AtomicU8,
    pruner: Mutex<Option<PrunerHandle>>,
}

impl HostCache {
    /// Create a cache salted from the thread-local CSPRNG.
    ///
    /// Invalid config values are corrected, see
    /// [`HostCacheConfig::normalized`]. No pruner runs until
    /// [`start_pruner`](Self::start_pruner) is called or the host drives
    /// [`tick`](Self::tick) itself.
    pub fn new(config: HostCacheConfig) -> Self {
        Self::with_salt_source(config, ThreadRngSalt)
    }

    /// Create a cache with a specific salt source.
    pub fn with_salt_source<S>(config: HostCacheConfig, salt_source: S) -> Self
    where
        S: SaltSource + 'static,
    {
        let config = config.normalized();
        Self {
            table: Arc::new(HashTable::new(&config, Box::new(salt_source))),
            state: AtomicU8::new(Lifecycle::Initialized as u8),
            pruner: Mutex::new(None),
        }
    }

    /// Create a cache and start its background pruner.
    pub fn with_pruner(config: HostCacheConfig) -> Result<Self> {
        let cache = Self::new(config);
        cache.start_pruner()?;
        Ok(cache)
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn running(&self) -> bool {
        self.state.load(Ordering::Acquire) == Lifecycle::Initialized as u8
    }

    /// Cached metrics for `key`, all zero on a miss.
    #[inline]
    pub fn get(&self, key: impl Into<HostKey>) -> Metrics {
        self.lookup(key).unwrap_or_default()
    }

    /// Cached metrics for `key`, `None` on a miss.
    pub fn lookup(&self, key: impl Into<HostKey>) -> Option<Metrics> {
        if !self.running() {
            return None;
        }
        self.table.lookup(&key.into())
    }

    /// Cached MTU for `key`, `None` on a miss or when no MTU was recorded.
    pub fn get_mtu(&self, key: impl Into<HostKey>) -> Option<u32> {
        if !self.running() {
            return None;
        }
        self.table.lookup_mtu(&key.into())
    }

    /// Merge a partial sample into the entry for `key`, creating it if
    /// needed. Zero fields leave the cached value alone.
    pub fn update(&self, key: impl Into<HostKey>, sample: Metrics) {
        if !self.running() {
            return;
        }
        self.table.update(&key.into(), &sample);
    }

    /// Record an MTU-only sample.
    pub fn update_mtu(&self, key: impl Into<HostKey>, mtu: u32) {
        self.update(key, Metrics::with_mtu(mtu));
    }

    /// Purge now. `all == true` removes every entry; `false` runs one
    /// expire pass. Returns the number of entries removed.
    pub fn purge(&self, all: bool) -> usize {
        let removed = if all {
            self.table.purge_all()
        } else {
            self.table.expire_pass()
        };
        self.table.reclaim();
        removed
    }

    /// Ask the next [`tick`](Self::tick) for a full purge, optionally
    /// rotating the hash salt first.
    pub fn request_purge(&self, rotate_salt: bool) {
        self.table.request_purge(rotate_salt);
    }

    /// Draw a fresh hash salt now.
    pub fn rotate_salt(&self) {
        self.table.rotate_salt();
    }

    /// One pruner step, for hosts that schedule maintenance themselves.
    pub fn tick(&self) -> TickReport {
        prune::tick(&self.table)
    }

    /// Start the background pruner thread.
    pub fn start_pruner(&self) -> Result<()> {
        let state = self.state();
        if state != Lifecycle::Initialized {
            return Err(HostCacheError::NotRunning(state));
        }
        let mut pruner = self.pruner.lock();
        if pruner.is_some() {
            return Err(HostCacheError::PrunerRunning);
        }
        *pruner = Some(PrunerHandle::spawn(Arc::clone(&self.table))?);
        Ok(())
    }

    /// Stop and join the background pruner. Returns whether one was running.
    pub fn stop_pruner(&self) -> bool {
        let handle = self.pruner.lock().take();
        match handle {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// Whether the background pruner is running.
    pub fn pruner_running(&self) -> bool {
        self.pruner.lock().is_some()
    }

    /// Tear the cache down: stop the pruner, stop serving, drop every entry.
    ///
    /// Idempotent. Dropping the cache does the same if it was not called.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(
                Lifecycle::Initialized as u8,
                Lifecycle::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        self.stop_pruner();
        self.table.set_enabled(false);
        let removed = self.table.purge_all();
        let reclaimed = self.table.reclaim();
        self.state
            .store(Lifecycle::Destroyed as u8, Ordering::Release);
        tracing::info!(removed, reclaimed, "hostcache: shut down");
    }

    /// Visit every live entry. Buckets are visited one at a time; entries
    /// changing concurrently may or may not be seen.
    pub fn for_each_entry<F>(&self, f: F)
    where
        F: FnMut(HostCacheEntry),
    {
        self.table.for_each_entry(f);
    }

    /// Every live entry, collected.
    pub fn entries(&self) -> Vec<HostCacheEntry> {
        let mut out = Vec::with_capacity(self.table.len());
        self.for_each_entry(|e| out.push(e));
        out
    }

    /// `h[len]` = number of buckets holding `len` entries, for
    /// `len in 0..=bucket_limit`.
    pub fn histogram(&self) -> Vec<usize> {
        self.table.histogram()
    }

    /// Counters snapshot.
    pub fn stats(&self) -> HostCacheStats {
        self.table.stats()
    }

    /// Bucket `key` hashes to under the current salt.
    pub fn bucket_of(&self, key: impl Into<HostKey>) -> usize {
        self.table.bucket_index(&key.into())
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when no entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets.
    pub fn hashsize(&self) -> usize {
        self.table.hashsize()
    }

    /// Maximum entries per bucket.
    pub fn bucket_limit(&self) -> usize {
        self.table.bucket_limit()
    }

    /// Maximum live entries.
    pub fn cache_limit(&self) -> usize {
        self.table.cache_limit()
    }

    /// Entry lifetime in seconds.
    pub fn expire_secs(&self) -> u32 {
        self.table.expire()
    }

    /// Change the lifetime given to entries from their next update on.
    pub fn set_expire_secs(&self, secs: u32) {
        self.table.set_expire(secs);
    }

    /// Pruner period and per-tick aging step, in seconds.
    pub fn prune_secs(&self) -> u32 {
        self.table.prune()
    }

    /// Change the pruner period; the running pruner picks it up after its
    /// current wait.
    pub fn set_prune_secs(&self, secs: u32) {
        self.table.set_prune(secs);
    }

    /// Whether lookups and updates are served.
    pub fn is_enabled(&self) -> bool {
        self.table.enabled()
    }

    /// Turn the cache on or off without dropping entries.
    pub fn set_enabled(&self, enabled: bool) {
        if self.running() {
            self.table.set_enabled(enabled);
        }
    }
}

impl Default for HostCache {
    fn default() -> Self {
        Self::new(HostCacheConfig::default())
    }
}

impl Drop for HostCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for HostCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCache")
            .field("state", &self.state())
            .field("hashsize", &self.hashsize())
            .field("bucket_limit", &self.bucket_limit())
            .field("cache_limit", &self.cache_limit())
            .field("entries", &self.len())
            .finish()
    }
}
