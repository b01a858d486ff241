//! Cache tunables.
//!
//! Values arrive from an outer configuration layer (sysctl, CLI, a config
//! file). Bad values are never fatal: [`HostCacheConfig::normalized`]
//! replaces them with built-in defaults and logs what it changed.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default number of hash buckets.
pub const DEFAULT_HASHSIZE: usize = 512;
/// Default maximum chain length per bucket.
pub const DEFAULT_BUCKET_LIMIT: usize = 30;
/// Default lifetime of an untouched entry, in seconds.
pub const DEFAULT_EXPIRE_SECS: u32 = 60 * 60;
/// Default pruner period, in seconds.
pub const DEFAULT_PRUNE_SECS: u32 = 5 * 60;
/// Largest accepted bucket count.
pub const MAX_HASHSIZE: usize = 1 << 20;
/// Hard ceiling on `cache_limit`. The arena may grow to twice this many
/// slots, roughly 650 MiB at the ceiling.
pub const MAX_CACHE_LIMIT: usize = 1 << 22;

/// Hostcache configuration.
///
/// `cache_limit == 0` means "derive": `hashsize * bucket_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCacheConfig {
    /// Number of buckets, a power of two.
    pub hashsize: usize,
    /// Maximum entries per bucket.
    pub bucket_limit: usize,
    /// Maximum entries in the whole cache.
    pub cache_limit: usize,
    /// Seconds an entry survives without being updated.
    pub expire_secs: u32,
    /// Seconds between pruner passes.
    pub prune_secs: u32,
    /// Whether lookups and updates do anything at all.
    pub enabled: bool,
}

impl Default for HostCacheConfig {
    fn default() -> Self {
        Self {
            hashsize: DEFAULT_HASHSIZE,
            bucket_limit: DEFAULT_BUCKET_LIMIT,
            cache_limit: 0,
            expire_secs: DEFAULT_EXPIRE_SECS,
            prune_secs: DEFAULT_PRUNE_SECS,
            enabled: true,
        }
    }
}

impl HostCacheConfig {
    /// Set the bucket count.
    pub fn with_hashsize(mut self, hashsize: usize) -> Self {
        self.hashsize = hashsize;
        self
    }

    /// Set the per-bucket limit.
    pub fn with_bucket_limit(mut self, bucket_limit: usize) -> Self {
        self.bucket_limit = bucket_limit;
        self
    }

    /// Set the global entry limit.
    pub fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit;
        self
    }

    /// Set the entry lifetime.
    pub fn with_expire_secs(mut self, secs: u32) -> Self {
        self.expire_secs = secs;
        self
    }

    /// Set the pruner period.
    pub fn with_prune_secs(mut self, secs: u32) -> Self {
        self.prune_secs = secs;
        self
    }

    /// Enable or disable the cache.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn max_cache_limit(hashsize: usize, bucket_limit: usize) -> usize {
        hashsize.saturating_mul(bucket_limit).min(MAX_CACHE_LIMIT)
    }

    /// Every value `normalized()` would change.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !self.hashsize.is_power_of_two() {
            errors.push(ConfigError::HashSizeNotPowerOfTwo(self.hashsize));
        } else if self.hashsize > MAX_HASHSIZE {
            errors.push(ConfigError::HashSizeTooLarge {
                hashsize: self.hashsize,
                max: MAX_HASHSIZE,
            });
        }
        if self.bucket_limit == 0 {
            errors.push(ConfigError::ZeroBucketLimit);
        }
        let max = Self::max_cache_limit(self.hashsize, self.bucket_limit);
        if self.cache_limit > max && errors.is_empty() {
            errors.push(ConfigError::CacheLimitTooLarge {
                limit: self.cache_limit,
                max,
            });
        }
        if self.expire_secs == 0 {
            errors.push(ConfigError::ZeroExpire);
        }
        if self.prune_secs == 0 {
            errors.push(ConfigError::ZeroPrune);
        }
        errors
    }

    /// Correct every invalid value, logging each correction.
    ///
    /// The result always satisfies: `hashsize` is a power of two no larger
    /// than [`MAX_HASHSIZE`], `bucket_limit >= 1`,
    /// `1 <= cache_limit <= min(hashsize * bucket_limit, MAX_CACHE_LIMIT)`,
    /// `expire_secs >= 1`, `prune_secs >= 1`.
    pub fn normalized(mut self) -> Self {
        if !self.hashsize.is_power_of_two() {
            tracing::warn!(
                error = %ConfigError::HashSizeNotPowerOfTwo(self.hashsize),
                default = DEFAULT_HASHSIZE,
                "hostcache: using default hashsize"
            );
            self.hashsize = DEFAULT_HASHSIZE;
        } else if self.hashsize > MAX_HASHSIZE {
            let error = ConfigError::HashSizeTooLarge {
                hashsize: self.hashsize,
                max: MAX_HASHSIZE,
            };
            tracing::warn!(%error, "hostcache: clamping hashsize");
            self.hashsize = MAX_HASHSIZE;
        }
        if self.bucket_limit == 0 {
            tracing::warn!(
                error = %ConfigError::ZeroBucketLimit,
                default = DEFAULT_BUCKET_LIMIT,
                "hostcache: using default bucket_limit"
            );
            self.bucket_limit = DEFAULT_BUCKET_LIMIT;
        }
        let max = Self::max_cache_limit(self.hashsize, self.bucket_limit);
        if self.cache_limit == 0 {
            if self.hashsize.saturating_mul(self.bucket_limit) > max {
                tracing::warn!(
                    hashsize = self.hashsize,
                    bucket_limit = self.bucket_limit,
                    max,
                    "hostcache: derived cache_limit capped"
                );
            }
            self.cache_limit = max;
        } else if self.cache_limit > max {
            let error = ConfigError::CacheLimitTooLarge {
                limit: self.cache_limit,
                max,
            };
            tracing::warn!(%error, "hostcache: clamping cache_limit");
            self.cache_limit = max;
        }
        if self.expire_secs == 0 {
            tracing::warn!(
                error = %ConfigError::ZeroExpire,
                default = DEFAULT_EXPIRE_SECS,
                "hostcache: using default expire"
            );
            self.expire_secs = DEFAULT_EXPIRE_SECS;
        }
        if self.prune_secs == 0 {
            tracing::warn!(
                error = %ConfigError::ZeroPrune,
                default = DEFAULT_PRUNE_SECS,
                "hostcache: using default prune interval"
            );
            self.prune_secs = DEFAULT_PRUNE_SECS;
        }
        self
    }
}
