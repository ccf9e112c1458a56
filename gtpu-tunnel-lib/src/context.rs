//! Per-flow GTP-U tunnel context
//!
//! A [`GtpuContext`] holds the TEID, the outer endpoints and a pre-built
//! outer header stack (`IP / UDP / GTP-U`) that the encapsulation path copies
//! verbatim in front of every packet of the flow, patching only the length
//! and checksum fields.
//!
//! The address family is part of the endpoint variant and is fixed for the
//! life of the context: the `update_*` methods and the address accessors
//! panic when called for the other family.
//!
//! ```
//! use gtpu_tunnel::context::{GtpuContext, ENCAPSULATION_LEN};
//! use std::net::Ipv4Addr;
//!
//! let ctx = GtpuContext::new_ipv4(0x1234, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
//! assert!(!ctx.is_ipv6());
//! assert_eq!(ctx.outer_hdr().len(), ENCAPSULATION_LEN);
//! assert_eq!(ctx.dst_ipv4(), Ipv4Addr::new(10, 0, 0, 2));
//! ```

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::config::TunnelRecord;
use crate::packet::ipv4::{Ipv4Header, IPV4_HLEN, IPV4_VERSION};
use crate::packet::ipv6::{Ipv6Header, IPV6_HLEN, IPV6_VERSION};
use crate::packet::protocol::IpProto;
use crate::packet::tunnel::gtpv1::{
    Gtpv1Header, Gtpv1MessageType, GTPV1_FLAGS, GTPV1_HLEN, GTPV1_U_PORT,
};
use crate::packet::udp::UdpHeader;
use crate::packet::HeaderParser;

/// Outer IPv4 + UDP + GTP-U header length
pub const ENCAPSULATION_LEN: usize = IPV4_HLEN + UDP_HLEN + GTPV1_HLEN;

/// Outer IPv6 + UDP + GTP-U header length
pub const ENCAPSULATION6_LEN: usize = IPV6_HLEN + UDP_HLEN + GTPV1_HLEN;

pub const UDP_HLEN: usize = 8;

pub const IPV4_HDR_TTL: u8 = 64;
pub const IPV6_HOP_LIMIT: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Size of the outer header stack for this family
    #[inline]
    pub const fn encapsulation_len(self) -> usize {
        match self {
            AddressFamily::Ipv4 => ENCAPSULATION_LEN,
            AddressFamily::Ipv6 => ENCAPSULATION6_LEN,
        }
    }

    /// Outer IP header length for this family
    #[inline]
    pub const fn ip_header_len(self) -> usize {
        match self {
            AddressFamily::Ipv4 => IPV4_HLEN,
            AddressFamily::Ipv6 => IPV6_HLEN,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Outer tunnel endpoints, tagged by address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelEndpoints {
    V4 { src: Ipv4Addr, dst: Ipv4Addr },
    V6 { src: Ipv6Addr, dst: Ipv6Addr },
}

impl TunnelEndpoints {
    #[inline]
    pub fn family(&self) -> AddressFamily {
        match self {
            TunnelEndpoints::V4 { .. } => AddressFamily::Ipv4,
            TunnelEndpoints::V6 { .. } => AddressFamily::Ipv6,
        }
    }
}

impl fmt::Display for TunnelEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelEndpoints::V4 { src, dst } => write!(f, "{} -> {}", src, dst),
            TunnelEndpoints::V6 { src, dst } => write!(f, "{} -> {}", src, dst),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct GtpuContext {
    teid: u32,
    endpoints: TunnelEndpoints,
    outer_hdr: Box<[u8]>,
}

impl GtpuContext {
    pub fn new(teid: u32, endpoints: TunnelEndpoints) -> Self {
        GtpuContext {
            teid,
            endpoints,
            outer_hdr: build_outer_hdr(teid, &endpoints),
        }
    }

    pub fn new_ipv4(teid: u32, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self::new(teid, TunnelEndpoints::V4 { src, dst })
    }

    pub fn new_ipv6(teid: u32, src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        Self::new(teid, TunnelEndpoints::V6 { src, dst })
    }

    pub fn from_record(record: &TunnelRecord) -> Self {
        Self::new(record.teid, record.endpoints)
    }

    /// Replaces TEID and endpoints and rebuilds the template.
    ///
    /// # Panics
    ///
    /// If `endpoints` belongs to a different address family.
    pub fn update(&mut self, teid: u32, endpoints: TunnelEndpoints) {
        assert_eq!(
            self.family(),
            endpoints.family(),
            "tunnel context family cannot change"
        );
        self.teid = teid;
        self.endpoints = endpoints;
        self.outer_hdr = build_outer_hdr(teid, &endpoints);
    }

    pub fn update_ipv4(&mut self, teid: u32, src: Ipv4Addr, dst: Ipv4Addr) {
        self.update(teid, TunnelEndpoints::V4 { src, dst });
    }

    pub fn update_ipv6(&mut self, teid: u32, src: Ipv6Addr, dst: Ipv6Addr) {
        self.update(teid, TunnelEndpoints::V6 { src, dst });
    }

    pub fn update_from_record(&mut self, record: &TunnelRecord) {
        self.update(record.teid, record.endpoints);
    }

    /// Pre-built outer header stack, exactly `encapsulation_len()` bytes
    #[inline]
    pub fn outer_hdr(&self) -> &[u8] {
        &self.outer_hdr
    }

    #[inline]
    pub fn is_ipv6(&self) -> bool {
        matches!(self.endpoints, TunnelEndpoints::V6 { .. })
    }

    #[inline]
    pub fn family(&self) -> AddressFamily {
        self.endpoints.family()
    }

    #[inline]
    pub fn encapsulation_len(&self) -> usize {
        self.family().encapsulation_len()
    }

    #[inline]
    pub fn teid(&self) -> u32 {
        self.teid
    }

    #[inline]
    pub fn endpoints(&self) -> &TunnelEndpoints {
        &self.endpoints
    }

    pub fn src_ipv4(&self) -> Ipv4Addr {
        match self.endpoints {
            TunnelEndpoints::V4 { src, .. } => src,
            TunnelEndpoints::V6 { .. } => panic!("IPv4 address requested from an IPv6 tunnel"),
        }
    }

    pub fn dst_ipv4(&self) -> Ipv4Addr {
        match self.endpoints {
            TunnelEndpoints::V4 { dst, .. } => dst,
            TunnelEndpoints::V6 { .. } => panic!("IPv4 address requested from an IPv6 tunnel"),
        }
    }

    pub fn src_ipv6(&self) -> Ipv6Addr {
        match self.endpoints {
            TunnelEndpoints::V6 { src, .. } => src,
            TunnelEndpoints::V4 { .. } => panic!("IPv6 address requested from an IPv4 tunnel"),
        }
    }

    pub fn dst_ipv6(&self) -> Ipv6Addr {
        match self.endpoints {
            TunnelEndpoints::V6 { dst, .. } => dst,
            TunnelEndpoints::V4 { .. } => panic!("IPv6 address requested from an IPv4 tunnel"),
        }
    }
}

impl fmt::Debug for GtpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GtpuContext")
            .field("teid", &format_args!("0x{:08x}", self.teid))
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl fmt::Display for GtpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GTP-U teid=0x{:08x} {}", self.teid, self.endpoints)
    }
}

fn build_outer_hdr(teid: u32, endpoints: &TunnelEndpoints) -> Box<[u8]> {
    let family = endpoints.family();
    let mut hdr = vec![0u8; family.encapsulation_len()].into_boxed_slice();
    let ip_len = family.ip_header_len();
    let (ip, l4) = hdr.split_at_mut(ip_len);

    // the buffer is sized from the same constants as the views, so the
    // parses below cannot fail
    match *endpoints {
        TunnelEndpoints::V4 { src, dst } => {
            if let Ok((ipv4, _)) = Ipv4Header::from_bytes_mut(ip) {
                ipv4.set_version_ihl(IPV4_VERSION, (IPV4_HLEN / 4) as u8);
                ipv4.set_ttl(IPV4_HDR_TTL);
                ipv4.set_protocol(IpProto::UDP);
                ipv4.set_src_ip(src);
                ipv4.set_dst_ip(dst);
            }
        }
        TunnelEndpoints::V6 { src, dst } => {
            if let Ok((ipv6, _)) = Ipv6Header::from_bytes_mut(ip) {
                ipv6.set_version_tc_flow(IPV6_VERSION, 0, 0);
                ipv6.set_hop_limit(IPV6_HOP_LIMIT);
                ipv6.set_next_header(IpProto::UDP);
                ipv6.set_src_ip(src);
                ipv6.set_dst_ip(dst);
            }
        }
    }

    if let Ok((udp, gtp)) = UdpHeader::from_bytes_mut(l4) {
        udp.set_dst_port(GTPV1_U_PORT);
        if let Ok((gtpu, _)) = Gtpv1Header::from_bytes_mut(gtp) {
            gtpu.set_flags(GTPV1_FLAGS);
            gtpu.set_message_type(Gtpv1MessageType::GPdu);
            gtpu.set_teid(teid);
        }
    }

    hdr
}
