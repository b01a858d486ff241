use hostcache::{FixedSalt, HostCache, HostCacheConfig, Metrics};
use rand::Rng;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const KEYS: u32 = 512;

fn key(n: u32) -> Ipv4Addr {
    Ipv4Addr::from(0x0a10_0000 + n)
}

/// Every sample for a key carries the same values, so any hit must read
/// exactly these regardless of how merges interleave.
fn sample(n: u32) -> Metrics {
    Metrics {
        mtu: 1000 + n,
        ssthresh: 2000 + n,
        rtt: 3000 + n,
        rttvar: 4000 + n,
        cwnd: 5000 + n,
        sendpipe: 6000 + n,
        recvpipe: 7000 + n,
    }
}

fn cache() -> Arc<HostCache> {
    // 16 buckets x 4 = 64 slots for 512 keys: constant eviction pressure.
    Arc::new(HostCache::with_salt_source(
        HostCacheConfig::default()
            .with_hashsize(16)
            .with_bucket_limit(4)
            .with_cache_limit(48)
            .with_expire_secs(4)
            .with_prune_secs(1),
        FixedSalt(0x0123_4567_89ab_cdef),
    ))
}

fn check_limits(cache: &HostCache) {
    let stats = cache.stats();
    assert!(
        stats.entries <= stats.cache_limit,
        "{} entries over limit {}",
        stats.entries,
        stats.cache_limit
    );
    let mut per_bucket: HashMap<usize, usize> = HashMap::new();
    cache.for_each_entry(|e| *per_bucket.entry(cache.bucket_of(e.key)).or_default() += 1);
    // A listing is weakly consistent; a chain is visited under its mutex,
    // so its own length is exact.
    for (bucket, len) in per_bucket {
        assert!(
            len <= cache.bucket_limit(),
            "bucket {bucket} holds {len} entries"
        );
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_readers_see_only_their_own_values() {
    let cache = cache();
    let stop = Arc::new(AtomicBool::new(false));
    let hits = Arc::new(AtomicUsize::new(0));
    let mut readers = Vec::new();
    let mut writers = Vec::new();

    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        let hits = Arc::clone(&hits);
        readers.push(thread::spawn(move || {
            let mut rng = rand::rng();
            while !stop.load(Ordering::Relaxed) {
                let n = rng.random_range(0..KEYS);
                if let Some(m) = cache.lookup(key(n)) {
                    assert_eq!(m, sample(n), "key {n} read a foreign entry");
                    hits.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(mtu) = cache.get_mtu(key(n)) {
                    assert_eq!(mtu, sample(n).mtu);
                }
            }
        }));
    }

    for _ in 0..3 {
        let cache = Arc::clone(&cache);
        writers.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..50_000 {
                let n = rng.random_range(0..KEYS);
                cache.update(key(n), sample(n));
            }
        }));
    }

    let pruner = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 0u32;
            while !stop.load(Ordering::Relaxed) {
                if round % 8 == 0 {
                    cache.purge(true);
                } else {
                    cache.tick();
                }
                round += 1;
                thread::yield_now();
            }
        })
    };

    for h in writers {
        h.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for h in readers {
        h.join().unwrap();
    }
    pruner.join().unwrap();
    assert!(hits.load(Ordering::Relaxed) > 0);

    check_limits(&cache);
    cache.purge(true);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.stats().pending_reclaim, 0);
    assert_eq!(cache.stats().free_slots, 2 * cache.cache_limit());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_limits_hold_under_random_traffic() {
    let cache = cache();
    let stop = Arc::new(AtomicBool::new(false));
    let mut workers = Vec::new();

    for t in 0..4u32 {
        let cache = Arc::clone(&cache);
        workers.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for i in 0..20_000u32 {
                let n = rng.random_range(0..KEYS);
                match rng.random_range(0..100) {
                    0 => {
                        cache.purge(false);
                    }
                    1 if t == 0 => cache.request_purge(i % 2 == 0),
                    2..=9 => {
                        let _ = cache.get(key(n));
                    }
                    _ => cache.update(key(n), sample(n)),
                }
            }
        }));
    }

    let checker = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                check_limits(&cache);
                cache.tick();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    for w in workers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    checker.join().unwrap();
    check_limits(&cache);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_full_cache_never_dips_under_eviction() {
    // 16 x 4 = 64 bucket places for a 32-entry limit, so full-cache inserts
    // race into buckets that still have room.
    let cache = Arc::new(HostCache::with_salt_source(
        HostCacheConfig::default()
            .with_hashsize(16)
            .with_bucket_limit(4)
            .with_cache_limit(32),
        FixedSalt(0x0f0f_0f0f),
    ));
    for n in 0..1_000u32 {
        cache.update(Ipv4Addr::from(0x0b00_0000 + n), sample(n % KEYS));
    }
    assert_eq!(cache.len(), 32);

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut min = cache.len();
            while !stop.load(Ordering::Relaxed) {
                min = min.min(cache.len());
            }
            min
        })
    };

    let mut handles = Vec::new();
    for t in 1..=4u32 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            // Unique keys: every update is an insert.
            for i in 0..20_000u32 {
                let n = t * 100_000 + i;
                cache.update(Ipv4Addr::from(0x0b00_0000 + n), sample(n % KEYS));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    let min = watcher.join().unwrap();

    let stats = cache.stats();
    assert_eq!(stats.merges, 0);
    assert_eq!(stats.inserts - stats.overflows, stats.entries as u64);
    // An eviction hands its unit to the insert that caused it, so only a
    // dropped allocation can take the count below the limit.
    if stats.alloc_failures == 0 {
        assert_eq!(min, 32, "entry count dipped while the cache was full");
        assert_eq!(stats.entries, 32);
    }
    check_limits(&cache);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_same_key_updates_serialize() {
    let cache = Arc::new(HostCache::default());
    let k = Ipv4Addr::new(198, 51, 100, 1);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for _ in 0..1_000 {
                cache.update_mtu(k, 1500);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(cache.len(), 1);
    let entries = cache.entries();
    assert_eq!(entries[0].updates, 8_000);
    assert_eq!(entries[0].metrics.mtu, 1500);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_shutdown_with_running_pruner_and_traffic() {
    let cache = Arc::new(HostCache::with_pruner(
        HostCacheConfig::default()
            .with_hashsize(64)
            .with_prune_secs(1),
    )
    .unwrap());
    let mut handles = Vec::new();
    for t in 0..4u32 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..5_000 {
                let n = (t * 5_000 + i) % KEYS;
                cache.update(key(n), sample(n));
                let _ = cache.get(key(n));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    cache.shutdown();
    assert!(!cache.pruner_running());
    assert!(cache.is_empty());
}
