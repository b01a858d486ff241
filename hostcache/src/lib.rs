//! hostcache: a bounded, concurrent cache of per-destination TCP path metrics
//!
//! A transport stack learns things about a remote host on every connection:
//! path MTU, round-trip time and variance, slow-start threshold, congestion
//! window, pipe sizes. The hostcache keeps a smoothed copy of those numbers
//! keyed by destination address so the next connection can start from them
//! instead of protocol defaults.
//!
//! # Features
//!
//! - **Lock-Free Reads**: `get` walks one bucket chain without taking a lock
//! - **Bounded Writes**: `update` holds a single bucket mutex for at most
//!   `bucket_limit` steps
//! - **Bounded Memory**: per-bucket and global limits, least recently
//!   touched entries are evicted first
//! - **Safe Reuse**: unlinked entries return to the arena only after every
//!   reader that might see them has left (see `hostcache-smr`)
//! - **Advisory**: nothing on the hot path fails; a miss is always safe
//!
//! # Example
//!
//! ```rust
//! use hostcache::{HostCache, HostCacheConfig, Metrics};
//! use std::net::Ipv6Addr;
//!
//! let cache = HostCache::new(HostCacheConfig::default().with_hashsize(64));
//! let peer = Ipv6Addr::LOCALHOST;
//!
//! cache.update_mtu(peer, 1400);
//! assert_eq!(cache.get_mtu(peer), Some(1400));
//!
//! // One maintenance step; hosts may also call `start_pruner()`.
//! cache.tick();
//!
//! cache.purge(true);
//! assert_eq!(cache.get(peer), Metrics::EMPTY);
//! ```

#![warn(missing_docs)]

mod bucket;
mod cache;
mod config;
mod entry;
mod error;
mod key;
mod link;
pub mod merge;
mod metrics;
mod pool;
mod prune;
mod salt;
mod stats;
mod table;

pub use cache::{HostCache, Lifecycle};
pub use config::{
    DEFAULT_BUCKET_LIMIT, DEFAULT_EXPIRE_SECS, DEFAULT_HASHSIZE, DEFAULT_PRUNE_SECS,
    HostCacheConfig, MAX_CACHE_LIMIT, MAX_HASHSIZE,
};
pub use error::{ConfigError, HostCacheError, Result};
pub use key::{AddressFamily, HostKey};
pub use metrics::Metrics;
pub use prune::TickReport;
pub use salt::{FixedSalt, SaltSource, ThreadRngSalt};
pub use stats::{HostCacheEntry, HostCacheStats};
