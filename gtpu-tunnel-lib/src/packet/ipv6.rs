//! IPv6 header (RFC 8200)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version| Traffic Class |           Flow Label                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Payload Length        |  Next Header  |   Hop Limit   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                         Source Address                        +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                      Destination Address                      +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Extension headers are not walked: the view covers the fixed 40 bytes
//! and `next_header` is taken at face value.
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::ipv6::Ipv6Header;
//! use gtpu_tunnel::packet::protocol::IpProto;
//! use gtpu_tunnel::packet::HeaderParser;
//! use std::net::Ipv6Addr;
//!
//! let mut packet = vec![
//!     0x60, 0x00, 0x00, 0x00,  // Version=6
//!     0x00, 0x08,              // Payload Length: 8 bytes
//!     0x11,                    // Next Header: UDP
//!     0xff,                    // Hop Limit: 255
//! ];
//! packet.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
//! packet.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
//! packet.extend_from_slice(&[0u8; 8]);
//!
//! let (header, payload) = Ipv6Header::from_bytes(&packet).unwrap();
//! assert_eq!(header.next_header(), IpProto::UDP);
//! assert_eq!(header.hop_limit(), 255);
//! assert_eq!(header.src_ip(), Ipv6Addr::LOCALHOST);
//! assert_eq!(payload.len(), 8);
//! ```

use std::fmt::{self, Formatter};
use std::net::Ipv6Addr;

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::checksum;
use crate::packet::protocol::IpProto;
use crate::packet::{HeaderParser, PacketHeader};

pub const IPV6_HLEN: usize = 40;
pub const IPV6_VERSION: u8 = 6;

#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct Ipv6Header {
    /// Version (4 bits), Traffic Class (8 bits), Flow Label (20 bits)
    ver_tc_flow: [u8; 4],
    /// Payload length (excludes the header itself)
    payload_length: U16<BigEndian>,
    next_header: IpProto,
    hop_limit: u8,
    src_ip: [u8; 16],
    dst_ip: [u8; 16],
}

impl Ipv6Header {
    #[inline]
    pub fn version(&self) -> u8 {
        self.ver_tc_flow[0] >> 4
    }

    #[inline]
    pub fn traffic_class(&self) -> u8 {
        (self.ver_tc_flow[0] << 4) | (self.ver_tc_flow[1] >> 4)
    }

    #[inline]
    pub fn flow_label(&self) -> u32 {
        u32::from_be_bytes(self.ver_tc_flow) & 0x000F_FFFF
    }

    #[inline]
    pub fn payload_length(&self) -> usize {
        self.payload_length.get() as usize
    }

    #[inline]
    pub fn total_length(&self) -> usize {
        Self::FIXED_LEN + self.payload_length()
    }

    #[inline]
    pub fn next_header(&self) -> IpProto {
        self.next_header
    }

    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    #[inline]
    pub fn src_ip(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.src_ip)
    }

    #[inline]
    pub fn dst_ip(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst_ip)
    }

    /// Writes version, traffic class and flow label in one go
    #[inline]
    pub fn set_version_tc_flow(&mut self, version: u8, traffic_class: u8, flow_label: u32) {
        let word = ((version as u32) << 28)
            | ((traffic_class as u32) << 20)
            | (flow_label & 0x000F_FFFF);
        self.ver_tc_flow = word.to_be_bytes();
    }

    #[inline]
    pub fn set_payload_length(&mut self, len: u16) {
        self.payload_length.set(len);
    }

    #[inline]
    pub fn set_next_header(&mut self, proto: IpProto) {
        self.next_header = proto;
    }

    #[inline]
    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        self.hop_limit = hop_limit;
    }

    #[inline]
    pub fn set_src_ip(&mut self, addr: Ipv6Addr) {
        self.src_ip = addr.octets();
    }

    #[inline]
    pub fn set_dst_ip(&mut self, addr: Ipv6Addr) {
        self.dst_ip = addr.octets();
    }

    /// Unfolded sum of the transport pseudo-header: both addresses, the
    /// upper-layer length and the next header value.
    #[inline]
    pub fn pseudo_header_sum(&self, l4_len: u32) -> u32 {
        let sum = checksum::sum_words(0, &self.src_ip);
        let sum = checksum::sum_words(sum, &self.dst_ip);
        sum + (l4_len >> 16) + (l4_len & 0xFFFF) + self.next_header.value() as u32
    }
}

impl PacketHeader for Ipv6Header {
    const NAME: &'static str = "IPv6Header";
    type InnerType = IpProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.next_header
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.version() == IPV6_VERSION
    }
}

impl HeaderParser for Ipv6Header {
    type Output<'a> = &'a Ipv6Header;

    #[inline]
    fn into_view<'a>(header: &'a Self, _: &'a [u8]) -> Self::Output<'a> {
        header
    }
}

impl fmt::Display for Ipv6Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv6 {} -> {} next={} hlim={} plen={}",
            self.src_ip(),
            self.dst_ip(),
            self.next_header(),
            self.hop_limit(),
            self.payload_length()
        )
    }
}
