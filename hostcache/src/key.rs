//! Destination keys.

use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Address family tag of a [`HostKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressFamily {
    /// IPv4.
    Inet = 4,
    /// IPv6.
    Inet6 = 6,
}

/// Remote endpoint a cache entry describes.
///
/// IPv6 keys carry the zone (scope) id, so link-local destinations on
/// different interfaces are distinct entries. The zone does not feed the
/// bucket hash; it only takes part in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HostKey {
    /// IPv4 destination.
    V4(Ipv4Addr),
    /// IPv6 destination with its zone id (0 when unscoped).
    V6 {
        /// Destination address.
        addr: Ipv6Addr,
        /// Zone (scope) id.
        zone: u32,
    },
}

impl HostKey {
    /// IPv6 key with an explicit zone id.
    pub const fn v6_scoped(addr: Ipv6Addr, zone: u32) -> Self {
        HostKey::V6 { addr, zone }
    }

    /// Address family tag.
    #[inline]
    pub fn family(&self) -> AddressFamily {
        match self {
            HostKey::V4(_) => AddressFamily::Inet,
            HostKey::V6 { .. } => AddressFamily::Inet6,
        }
    }

    /// Zone id, 0 for IPv4.
    #[inline]
    pub fn zone(&self) -> u32 {
        match self {
            HostKey::V4(_) => 0,
            HostKey::V6 { zone, .. } => *zone,
        }
    }

    /// Address as four native words; IPv4 occupies the first word.
    #[inline]
    pub(crate) fn words(&self) -> [u32; 4] {
        match self {
            HostKey::V4(a) => [u32::from_ne_bytes(a.octets()), 0, 0, 0],
            HostKey::V6 { addr, .. } => {
                let o = addr.octets();
                core::array::from_fn(|i| {
                    u32::from_ne_bytes([o[i * 4], o[i * 4 + 1], o[i * 4 + 2], o[i * 4 + 3]])
                })
            }
        }
    }

    /// Raw address bytes fed to the bucket hash.
    #[inline]
    pub(crate) fn hash_bytes(&self) -> ([u8; 16], usize) {
        let mut buf = [0u8; 16];
        match self {
            HostKey::V4(a) => {
                buf[..4].copy_from_slice(&a.octets());
                (buf, 4)
            }
            HostKey::V6 { addr, .. } => {
                buf.copy_from_slice(&addr.octets());
                (buf, 16)
            }
        }
    }

    /// The destination address without the zone.
    pub fn ip(&self) -> IpAddr {
        match self {
            HostKey::V4(a) => IpAddr::V4(*a),
            HostKey::V6 { addr, .. } => IpAddr::V6(*addr),
        }
    }
}

impl From<Ipv4Addr> for HostKey {
    fn from(addr: Ipv4Addr) -> Self {
        HostKey::V4(addr)
    }
}

impl From<Ipv6Addr> for HostKey {
    fn from(addr: Ipv6Addr) -> Self {
        HostKey::V6 { addr, zone: 0 }
    }
}

impl From<IpAddr> for HostKey {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(a) => a.into(),
        }
    }
}

impl From<SocketAddr> for HostKey {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(a) => HostKey::V4(*a.ip()),
            SocketAddr::V6(a) => HostKey::V6 {
                addr: *a.ip(),
                zone: a.scope_id(),
            },
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::V4(a) => write!(f, "{a}"),
            HostKey::V6 { addr, zone: 0 } => write!(f, "{addr}"),
            HostKey::V6 { addr, zone } => write!(f, "{addr}%{zone}"),
        }
    }
}

/// A key stored field by field so lock-free readers can compare it with
/// plain atomic loads.
///
/// Written only while the owning slot is unpublished.
pub(crate) struct AtomicKey {
    family: AtomicU8,
    words: [AtomicU32; 4],
    zone: AtomicU32,
}

impl AtomicKey {
    pub(crate) fn new() -> Self {
        Self {
            family: AtomicU8::new(0),
            words: core::array::from_fn(|_| AtomicU32::new(0)),
            zone: AtomicU32::new(0),
        }
    }

    pub(crate) fn store(&self, key: &HostKey) {
        self.family.store(key.family() as u8, Ordering::Relaxed);
        for (slot, w) in self.words.iter().zip(key.words()) {
            slot.store(w, Ordering::Relaxed);
        }
        self.zone.store(key.zone(), Ordering::Relaxed);
    }

    /// Field-by-field comparison; cheapest discriminators first.
    #[inline]
    pub(crate) fn matches(&self, key: &HostKey) -> bool {
        if self.family.load(Ordering::Relaxed) != key.family() as u8 {
            return false;
        }
        let words = key.words();
        let n = match key {
            HostKey::V4(_) => 1,
            HostKey::V6 { .. } => 4,
        };
        if (0..n).any(|i| self.words[i].load(Ordering::Relaxed) != words[i]) {
            return false;
        }
        self.zone.load(Ordering::Relaxed) == key.zone()
    }

    /// Rebuild the key; `None` for a slot that was never populated.
    pub(crate) fn load(&self) -> Option<HostKey> {
        let w: [u32; 4] = core::array::from_fn(|i| self.words[i].load(Ordering::Relaxed));
        match self.family.load(Ordering::Relaxed) {
            f if f == AddressFamily::Inet as u8 => Some(HostKey::V4(Ipv4Addr::from(w[0].to_ne_bytes()))),
            f if f == AddressFamily::Inet6 as u8 => {
                let mut o = [0u8; 16];
                for (i, word) in w.iter().enumerate() {
                    o[i * 4..i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
                }
                Some(HostKey::V6 {
                    addr: Ipv6Addr::from(o),
                    zone: self.zone.load(Ordering::Relaxed),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV6;

    #[test]
    fn test_atomic_key_round_trip() {
        let keys = [
            HostKey::from(Ipv4Addr::new(192, 0, 2, 1)),
            HostKey::v6_scoped("fe80::1".parse().unwrap(), 3),
            HostKey::from("2001:db8::5".parse::<Ipv6Addr>().unwrap()),
        ];
        let slot = AtomicKey::new();
        assert!(slot.load().is_none());
        for k in keys {
            slot.store(&k);
            assert!(slot.matches(&k));
            assert_eq!(slot.load(), Some(k));
        }
    }

    #[test]
    fn test_zone_distinguishes_keys() {
        let addr: Ipv6Addr = "fe80::1".parse().unwrap();
        let slot = AtomicKey::new();
        slot.store(&HostKey::v6_scoped(addr, 1));
        assert!(!slot.matches(&HostKey::v6_scoped(addr, 2)));
        assert!(!slot.matches(&HostKey::from(addr)));
    }

    #[test]
    fn test_family_distinguishes_keys() {
        // IPv4-compatible ::192.0.2.1 carries the same address bits.
        let v4 = HostKey::from(Ipv4Addr::new(192, 0, 2, 1));
        let slot = AtomicKey::new();
        slot.store(&v4);
        assert!(!slot.matches(&HostKey::from("::c000:201".parse::<Ipv6Addr>().unwrap())));
    }

    #[test]
    fn test_socket_addr_scope_becomes_zone() {
        let sa = SocketAddr::V6(SocketAddrV6::new("fe80::2".parse().unwrap(), 443, 0, 7));
        let key = HostKey::from(sa);
        assert_eq!(key.zone(), 7);
        assert_eq!(key.family(), AddressFamily::Inet6);
        assert_eq!(key.to_string(), "fe80::2%7");
    }
}
