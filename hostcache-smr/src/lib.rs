//! hostcache-smr: epoch-based safe memory reclamation for the hostcache.
//!
//! Readers enter a critical section with [`Domain::pin`] and walk shared
//! structures without taking locks. Writers unlink items and hand them to
//! [`Domain::retire`]; an item is given back through [`Domain::collect`] only
//! once no reader that could have observed it is still pinned.
//!
//! Unlike a process-wide collector, every [`Domain`] is an ordinary owned
//! value. Two caches never share epochs, limbo lists or reader state.
//!
//! # Key Features
//!
//! - **Lock-Free Reads**: pinning is two epoch loads around one `fetch_add`
//! - **Non-Blocking Writers**: retire and collect never wait for readers
//! - **Striped Reader Counters**: readers spread over cache-padded stripes
//! - **Typed Limbo**: retired items are plain values (indices, handles, boxes)
//!
//! # Example
//!
//! ```rust
//! use hostcache_smr::Domain;
//!
//! let domain: Domain<u32> = Domain::new();
//!
//! let guard = domain.pin();
//! // ... read shared state ...
//! domain.retire(7);
//! assert_eq!(domain.collect(|_| {}), 0); // still protected
//! drop(guard);
//!
//! let mut freed = Vec::new();
//! domain.collect(|slot| freed.push(slot));
//! assert_eq!(freed, vec![7]);
//! ```

#![warn(missing_docs)]

extern crate alloc;

mod guard;
mod reclaim;
mod retired;
mod slot;

pub use guard::Guard;
pub use reclaim::Domain;
pub use slot::DEFAULT_STRIPES;
