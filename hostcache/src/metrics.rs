//! Path metrics carried by each entry.

use core::sync::atomic::{AtomicU32, Ordering};
use serde::{Deserialize, Serialize};

/// Path characteristics for one destination.
///
/// Used both as the partial sample handed to `update` and as the snapshot
/// returned by `get`. A zero field means "no opinion".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Path MTU in bytes.
    pub mtu: u32,
    /// Slow-start threshold in bytes.
    pub ssthresh: u32,
    /// Smoothed round-trip time.
    pub rtt: u32,
    /// Round-trip time variance.
    pub rttvar: u32,
    /// Congestion window in bytes.
    pub cwnd: u32,
    /// Send pipe size in bytes.
    pub sendpipe: u32,
    /// Receive pipe size in bytes.
    pub recvpipe: u32,
}

impl Metrics {
    /// All fields zero.
    pub const EMPTY: Metrics = Metrics {
        mtu: 0,
        ssthresh: 0,
        rtt: 0,
        rttvar: 0,
        cwnd: 0,
        sendpipe: 0,
        recvpipe: 0,
    };

    /// Sample carrying only an MTU.
    pub const fn with_mtu(mtu: u32) -> Self {
        Metrics {
            mtu,
            ..Metrics::EMPTY
        }
    }

    /// True when no field carries an opinion.
    pub fn is_empty(&self) -> bool {
        *self == Metrics::EMPTY
    }
}

/// Per-field atomic storage inside an entry.
///
/// Every field is loaded and stored independently. A reader racing a merge
/// may see a mix of old and new fields; it never sees a torn field.
pub(crate) struct AtomicMetrics {
    pub(crate) mtu: AtomicU32,
    pub(crate) ssthresh: AtomicU32,
    pub(crate) rtt: AtomicU32,
    pub(crate) rttvar: AtomicU32,
    pub(crate) cwnd: AtomicU32,
    pub(crate) sendpipe: AtomicU32,
    pub(crate) recvpipe: AtomicU32,
}

impl AtomicMetrics {
    pub(crate) fn new() -> Self {
        Self {
            mtu: AtomicU32::new(0),
            ssthresh: AtomicU32::new(0),
            rtt: AtomicU32::new(0),
            rttvar: AtomicU32::new(0),
            cwnd: AtomicU32::new(0),
            sendpipe: AtomicU32::new(0),
            recvpipe: AtomicU32::new(0),
        }
    }

    /// Overwrite every field, zeros included.
    pub(crate) fn store(&self, m: &Metrics) {
        self.mtu.store(m.mtu, Ordering::Relaxed);
        self.ssthresh.store(m.ssthresh, Ordering::Relaxed);
        self.rtt.store(m.rtt, Ordering::Relaxed);
        self.rttvar.store(m.rttvar, Ordering::Relaxed);
        self.cwnd.store(m.cwnd, Ordering::Relaxed);
        self.sendpipe.store(m.sendpipe, Ordering::Relaxed);
        self.recvpipe.store(m.recvpipe, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Metrics {
        Metrics {
            mtu: self.mtu.load(Ordering::Relaxed),
            ssthresh: self.ssthresh.load(Ordering::Relaxed),
            rtt: self.rtt.load(Ordering::Relaxed),
            rttvar: self.rttvar.load(Ordering::Relaxed),
            cwnd: self.cwnd.load(Ordering::Relaxed),
            sendpipe: self.sendpipe.load(Ordering::Relaxed),
            recvpipe: self.recvpipe.load(Ordering::Relaxed),
        }
    }
}
