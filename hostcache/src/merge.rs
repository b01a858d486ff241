//! Sample merging.
//!
//! Every field, `mtu` included, uses the same one-step smoothing with weight
//! 1/2. A newer MTU does not replace the cached one outright. Time fields
//! (`rtt`, `rttvar`) are averaged in whatever unit the caller reports, exactly
//! like the size fields; no fixed-point scaling is applied here.

use crate::metrics::{AtomicMetrics, Metrics};
use core::sync::atomic::{AtomicU32, Ordering};

/// Merge one field.
///
/// - zero sample: keep `current` (no opinion);
/// - zero current: adopt `sample` verbatim;
/// - otherwise: `(current + sample) / 2`, truncating.
#[inline]
pub fn smooth(current: u32, sample: u32) -> u32 {
    match (current, sample) {
        (c, 0) => c,
        (0, s) => s,
        (c, s) => ((c as u64 + s as u64) / 2) as u32,
    }
}

/// Fold a sequence of samples into an initially empty record.
///
/// This is what a cache entry holds after the same updates, in order.
pub fn fold<'a, I>(samples: I) -> Metrics
where
    I: IntoIterator<Item = &'a Metrics>,
{
    samples.into_iter().fold(Metrics::EMPTY, |acc, s| Metrics {
        mtu: smooth(acc.mtu, s.mtu),
        ssthresh: smooth(acc.ssthresh, s.ssthresh),
        rtt: smooth(acc.rtt, s.rtt),
        rttvar: smooth(acc.rttvar, s.rttvar),
        cwnd: smooth(acc.cwnd, s.cwnd),
        sendpipe: smooth(acc.sendpipe, s.sendpipe),
        recvpipe: smooth(acc.recvpipe, s.recvpipe),
    })
}

#[inline]
fn merge_field(field: &AtomicU32, sample: u32) {
    if sample == 0 {
        return;
    }
    let current = field.load(Ordering::Relaxed);
    field.store(smooth(current, sample), Ordering::Relaxed);
}

/// Merge `sample` into an entry in place.
///
/// Must run under the owning bucket's mutex: the load/store pair per field is
/// not a single atomic read-modify-write.
pub(crate) fn apply(into: &AtomicMetrics, sample: &Metrics) {
    merge_field(&into.mtu, sample.mtu);
    merge_field(&into.ssthresh, sample.ssthresh);
    merge_field(&into.rtt, sample.rtt);
    merge_field(&into.rttvar, sample.rttvar);
    merge_field(&into.cwnd, sample.cwnd);
    merge_field(&into.sendpipe, sample.sendpipe);
    merge_field(&into.recvpipe, sample.recvpipe);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_rules() {
        assert_eq!(smooth(0, 0), 0);
        assert_eq!(smooth(0, 100), 100);
        assert_eq!(smooth(100, 0), 100);
        assert_eq!(smooth(100, 200), 150);
        // truncating
        assert_eq!(smooth(100, 201), 150);
        // no overflow at the top of the range
        assert_eq!(smooth(u32::MAX, u32::MAX), u32::MAX);
        assert_eq!(smooth(u32::MAX, u32::MAX - 1), u32::MAX - 1);
    }

    #[test]
    fn test_apply_is_never_destructive() {
        let m = AtomicMetrics::new();
        apply(
            &m,
            &Metrics {
                rtt: 100,
                cwnd: 10,
                ..Metrics::EMPTY
            },
        );
        apply(
            &m,
            &Metrics {
                rtt: 200,
                ..Metrics::EMPTY
            },
        );
        apply(&m, &Metrics::EMPTY);
        let s = m.snapshot();
        assert_eq!(s.rtt, 150);
        assert_eq!(s.cwnd, 10);
        assert_eq!(s.mtu, 0);
    }

    #[test]
    fn test_mtu_is_averaged_like_every_other_field() {
        let m = AtomicMetrics::new();
        apply(&m, &Metrics::with_mtu(1500));
        apply(&m, &Metrics::with_mtu(1280));
        assert_eq!(m.snapshot().mtu, 1390);
        apply(&m, &Metrics::with_mtu(1280));
        assert_eq!(m.snapshot().mtu, 1335);
        assert_eq!(
            fold([&Metrics::with_mtu(1500), &Metrics::with_mtu(1280)]).mtu,
            1390
        );
    }

    #[test]
    fn test_order_matters() {
        let a = Metrics {
            ssthresh: 10,
            ..Metrics::EMPTY
        };
        let b = Metrics {
            ssthresh: 20,
            ..Metrics::EMPTY
        };
        let c = Metrics {
            ssthresh: 40,
            ..Metrics::EMPTY
        };
        // ((10 + 20) / 2 + 40) / 2 = 27, ((40 + 20) / 2 + 10) / 2 = 20
        assert_eq!(fold([&a, &b, &c]).ssthresh, 27);
        assert_eq!(fold([&c, &b, &a]).ssthresh, 20);
    }
}
