//! Error types.
//!
//! Nothing on the lookup/update path fails. These errors only come out of
//! setup and lifecycle calls.

use crate::cache::Lifecycle;
use thiserror::Error;

/// Errors from lifecycle operations on a [`HostCache`](crate::HostCache).
#[derive(Debug, Error)]
pub enum HostCacheError {
    /// The background pruner thread could not be spawned.
    #[error("failed to spawn pruner thread: {0}")]
    PrunerSpawn(#[from] std::io::Error),

    /// `start_pruner` was called while a pruner is already running.
    #[error("pruner is already running")]
    PrunerRunning,

    /// The cache has left the `Initialized` state.
    #[error("host cache is {0}")]
    NotRunning(Lifecycle),
}

/// A configuration value that `normalized()` would have to correct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `hashsize` must be a non-zero power of two.
    #[error("hashsize {0} is not a power of two")]
    HashSizeNotPowerOfTwo(usize),

    /// `hashsize` may not exceed [`MAX_HASHSIZE`](crate::MAX_HASHSIZE).
    #[error("hashsize {hashsize} exceeds the maximum of {max}")]
    HashSizeTooLarge {
        /// Requested bucket count.
        hashsize: usize,
        /// Largest accepted bucket count.
        max: usize,
    },

    /// `bucket_limit` must be non-zero.
    #[error("bucket_limit must be at least 1")]
    ZeroBucketLimit,

    /// `cache_limit` may not exceed `hashsize * bucket_limit` or
    /// [`MAX_CACHE_LIMIT`](crate::MAX_CACHE_LIMIT).
    #[error("cache_limit {limit} exceeds the maximum of {max}")]
    CacheLimitTooLarge {
        /// Requested limit.
        limit: usize,
        /// Largest accepted limit.
        max: usize,
    },

    /// `expire` must be non-zero.
    #[error("expire interval must be at least one second")]
    ZeroExpire,

    /// `prune` must be non-zero.
    #[error("prune interval must be at least one second")]
    ZeroPrune,
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, HostCacheError>;
