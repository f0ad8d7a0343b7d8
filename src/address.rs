//! Reserved address classification.
//!
//! Membership is decided numerically with CIDR prefix masks over both address
//! families. IPv6 addresses that embed an IPv4 address (`::ffff:a.b.c.d`,
//! `::a.b.c.d`, `64:ff9b::a.b.c.d`) are also checked against the IPv4 table.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A named reserved block, e.g. `loopback` = `127.0.0.0/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub name: &'static str,
    pub net: IpNet,
}

impl AddressRange {
    pub const fn v4(name: &'static str, octets: [u8; 4], prefix_len: u8) -> Self {
        let base = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
        Self {
            name,
            net: IpNet::V4(Ipv4Net::new_assert(base, prefix_len)),
        }
    }

    pub const fn v6(name: &'static str, segments: [u16; 8], prefix_len: u8) -> Self {
        let base = Ipv6Addr::new(
            segments[0],
            segments[1],
            segments[2],
            segments[3],
            segments[4],
            segments[5],
            segments[6],
            segments[7],
        );
        Self {
            name,
            net: IpNet::V6(Ipv6Net::new_assert(base, prefix_len)),
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.net.contains(&ip)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.net)
    }
}

pub const DEFAULT_RESERVED_RANGES: &[AddressRange] = &[
    AddressRange::v4("this-network", [0, 0, 0, 0], 8),
    AddressRange::v4("private-10", [10, 0, 0, 0], 8),
    AddressRange::v4("shared-cgnat", [100, 64, 0, 0], 10),
    AddressRange::v4("loopback", [127, 0, 0, 0], 8),
    AddressRange::v4("link-local", [169, 254, 0, 0], 16),
    AddressRange::v4("private-172", [172, 16, 0, 0], 12),
    AddressRange::v4("ietf-protocol", [192, 0, 0, 0], 24),
    AddressRange::v4("private-192", [192, 168, 0, 0], 16),
    AddressRange::v4("benchmarking", [198, 18, 0, 0], 15),
    AddressRange::v4("multicast", [224, 0, 0, 0], 4),
    AddressRange::v4("reserved", [240, 0, 0, 0], 4),
    AddressRange::v6("unspecified-v6", [0, 0, 0, 0, 0, 0, 0, 0], 128),
    AddressRange::v6("loopback-v6", [0, 0, 0, 0, 0, 0, 0, 1], 128),
    AddressRange::v6("unique-local", [0xfc00, 0, 0, 0, 0, 0, 0, 0], 7),
    AddressRange::v6("link-local-v6", [0xfe80, 0, 0, 0, 0, 0, 0, 0], 10),
    AddressRange::v6("site-local-v6", [0xfec0, 0, 0, 0, 0, 0, 0, 0], 10),
    AddressRange::v6("multicast-v6", [0xff00, 0, 0, 0, 0, 0, 0, 0], 8),
];

/// Decides whether a single address falls inside any configured reserved range.
#[derive(Debug, Clone)]
pub struct AddressClassifier {
    ranges: Vec<AddressRange>,
}

impl Default for AddressClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVED_RANGES.to_vec())
    }
}

impl AddressClassifier {
    pub fn new(ranges: Vec<AddressRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    /// Returns the first reserved range containing `ip`, checking the embedded
    /// IPv4 address of mapped/compatible/NAT64 forms as well.
    pub fn classify(&self, ip: IpAddr) -> Option<&AddressRange> {
        let embedded = match ip {
            IpAddr::V6(v6) => embedded_ipv4(&v6).map(IpAddr::V4),
            IpAddr::V4(_) => None,
        };

        self.ranges.iter().find(|range| {
            range.contains(ip) || embedded.map(|v4| range.contains(v4)).unwrap_or(false)
        })
    }

    pub fn is_reserved(&self, ip: IpAddr) -> bool {
        self.classify(ip).is_some()
    }
}

/// Classifies against the default reserved table.
pub fn is_reserved_address(ip: IpAddr) -> bool {
    AddressClassifier::default().is_reserved(ip)
}

fn embedded_ipv4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }

    let segments = ip.segments();
    let tail = ((segments[6] as u32) << 16) | segments[7] as u32;

    // ::a.b.c.d (deprecated IPv4-compatible). `::` and `::1` are their own ranges.
    if segments[..6] == [0, 0, 0, 0, 0, 0] && tail > 1 {
        return Some(Ipv4Addr::from(tail));
    }

    // 64:ff9b::/96 well-known NAT64 prefix
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        return Some(Ipv4Addr::from(tail));
    }

    None
}
