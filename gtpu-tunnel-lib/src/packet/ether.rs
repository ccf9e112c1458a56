//! Ethernet II and 802.1Q headers
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Destination MAC Address                    |
//! +                               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                               |                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
//! |                      Source MAC Address                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           EtherType           |  [ 802.1Q TCI | EtherType ]   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Parsing an [`EtherHeader`] consumes at most one 802.1Q tag; a second tag
//! is left in the payload and shows up as the inner type `VLAN_8021Q`.
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::ether::EtherHeader;
//! use gtpu_tunnel::packet::protocol::EtherProto;
//! use gtpu_tunnel::packet::HeaderParser;
//!
//! let packet = vec![
//!     0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,  // Destination MAC
//!     0x11, 0x22, 0x33, 0x44, 0x55, 0x66,  // Source MAC
//!     0x81, 0x00,                          // EtherType: 802.1Q
//!     0x20, 0x2a,                          // TCI: PCP=1, VID=42
//!     0x86, 0xdd,                          // Inner EtherType: IPv6
//! ];
//!
//! let (eth, payload) = EtherHeader::from_bytes(&packet).unwrap();
//! assert_eq!(eth.inner_type(), EtherProto::IPV6);
//! assert_eq!(eth.vlan().unwrap().vlan_id(), 42);
//! assert_eq!(eth.header_len(), 18);
//! assert!(payload.is_empty());
//! ```

use core::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, U16};

use crate::packet::protocol::EtherProto;
use crate::packet::{HeaderParser, PacketHeader, PacketHeaderError};

pub const ETH_ALEN: usize = 6;
pub const ETH_HLEN: usize = 14;
pub const VLAN_TAG_LEN: usize = 4;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Serialize,
    Deserialize,
)]
#[serde(into = "String")]
#[serde(try_from = "String")]
#[repr(transparent)]
pub struct EthAddr([u8; ETH_ALEN]);

impl EthAddr {
    #[inline]
    pub const fn new(octets: [u8; ETH_ALEN]) -> Self {
        EthAddr(octets)
    }

    #[inline]
    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }
}

impl Display for EthAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum EtherError {
    #[error("Invalid Ethernet address format")]
    InvalidAddressFormat,
}

impl FromStr for EthAddr {
    type Err = EtherError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = [0u8; ETH_ALEN];
        let mut parts = s.split(':');
        for byte in addr.iter_mut() {
            let part = parts.next().ok_or(EtherError::InvalidAddressFormat)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| EtherError::InvalidAddressFormat)?;
        }
        if parts.next().is_some() {
            return Err(EtherError::InvalidAddressFormat);
        }
        Ok(EthAddr(addr))
    }
}

impl From<EthAddr> for String {
    #[inline]
    fn from(addr: EthAddr) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for EthAddr {
    type Error = EtherError;
    #[inline]
    fn try_from(s: String) -> Result<Self, Self::Error> {
        EthAddr::from_str(&s)
    }
}

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout, Debug, Clone, Copy)]
pub struct EtherHeader {
    dest: EthAddr,
    source: EthAddr,
    proto: EtherProto,
}

impl EtherHeader {
    #[inline]
    pub fn dest(&self) -> &EthAddr {
        &self.dest
    }

    #[inline]
    pub fn source(&self) -> &EthAddr {
        &self.source
    }

    #[inline]
    pub fn protocol(&self) -> EtherProto {
        self.proto
    }

    #[inline]
    pub fn set_dest(&mut self, addr: EthAddr) {
        self.dest = addr;
    }

    #[inline]
    pub fn set_source(&mut self, addr: EthAddr) {
        self.source = addr;
    }

    #[inline]
    pub fn set_protocol(&mut self, proto: EtherProto) {
        self.proto = proto;
    }
}

impl PacketHeader for EtherHeader {
    const NAME: &'static str = "EtherHeader";
    type InnerType = EtherProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.proto
    }
}

impl HeaderParser for EtherHeader {
    type Output<'a> = EtherHeaderVlan<'a>;

    #[inline]
    fn into_view<'a>(header: &'a Self, _: &'a [u8]) -> Self::Output<'a> {
        EtherHeaderVlan::Standard(header)
    }

    #[inline]
    fn from_bytes<'a>(buf: &'a [u8]) -> Result<(Self::Output<'a>, &'a [u8]), PacketHeaderError> {
        let (eth, rest) = EtherHeader::ref_from_prefix(buf)
            .map_err(|_| PacketHeaderError::TooShort(Self::NAME))?;

        if eth.proto != EtherProto::VLAN_8021Q {
            return Ok((EtherHeaderVlan::Standard(eth), rest));
        }

        let (vlan, rest) = Ether8021qHeader::from_bytes(rest)?;
        Ok((EtherHeaderVlan::VLAN8021Q(eth, vlan), rest))
    }
}

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout, Debug, Clone, Copy)]
pub struct Ether8021qHeader {
    tci: U16<BigEndian>,
    proto: EtherProto,
}

impl Ether8021qHeader {
    /// Raw Tag Control Information (PCP, DEI and VID together)
    #[inline]
    pub fn tci(&self) -> u16 {
        self.tci.get()
    }

    #[inline]
    pub fn set_tci(&mut self, tci: u16) {
        self.tci.set(tci);
    }

    pub fn vlan_id(&self) -> u16 {
        self.tci.get() & 0x0FFF
    }

    pub fn vlan_pcp(&self) -> u8 {
        ((self.tci.get() >> 13) & 0x07) as u8
    }

    pub fn vlan_dei(&self) -> bool {
        ((self.tci.get() >> 12) & 0x01) != 0
    }

    #[inline]
    pub fn protocol(&self) -> EtherProto {
        self.proto
    }

    #[inline]
    pub fn set_protocol(&mut self, proto: EtherProto) {
        self.proto = proto;
    }
}

impl Display for Ether8021qHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "802.1Q vid={} pcp={} dei={} proto={}",
            self.vlan_id(),
            self.vlan_pcp(),
            self.vlan_dei(),
            self.protocol()
        )
    }
}

impl PacketHeader for Ether8021qHeader {
    const NAME: &'static str = "Ether8021qHeader";
    type InnerType = EtherProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.proto
    }
}

impl HeaderParser for Ether8021qHeader {
    type Output<'a> = &'a Ether8021qHeader;

    #[inline]
    fn into_view<'a>(header: &'a Self, _options: &'a [u8]) -> Self::Output<'a> {
        header
    }
}

#[derive(Debug, Clone)]
pub enum EtherHeaderVlan<'a> {
    Standard(&'a EtherHeader),
    VLAN8021Q(&'a EtherHeader, &'a Ether8021qHeader),
}

impl Display for EtherHeaderVlan<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EtherHeaderVlan::Standard(eth) => {
                write!(
                    f,
                    "Ethernet {} -> {} proto={}",
                    eth.source(),
                    eth.dest(),
                    eth.protocol()
                )
            }
            EtherHeaderVlan::VLAN8021Q(eth, vlan) => {
                write!(
                    f,
                    "Ethernet {} -> {} proto={} [{}]",
                    eth.source(),
                    eth.dest(),
                    eth.protocol(),
                    vlan
                )
            }
        }
    }
}

impl Deref for EtherHeaderVlan<'_> {
    type Target = EtherHeader;

    fn deref(&self) -> &Self::Target {
        match self {
            EtherHeaderVlan::Standard(eth) => eth,
            EtherHeaderVlan::VLAN8021Q(eth, _) => eth,
        }
    }
}

impl<'a> EtherHeaderVlan<'a> {
    /// Protocol following the link layer, after the VLAN tag if any
    pub fn inner_type(&self) -> EtherProto {
        match self {
            EtherHeaderVlan::Standard(eth) => eth.protocol(),
            EtherHeaderVlan::VLAN8021Q(_, vlan) => vlan.protocol(),
        }
    }

    pub fn vlan(&self) -> Option<&'a Ether8021qHeader> {
        match self {
            EtherHeaderVlan::Standard(_) => None,
            EtherHeaderVlan::VLAN8021Q(_, vlan) => Some(vlan),
        }
    }

    /// Length of the link layer: 14 bytes, or 18 with a VLAN tag
    pub fn header_len(&self) -> usize {
        match self {
            EtherHeaderVlan::Standard(_) => ETH_HLEN,
            EtherHeaderVlan::VLAN8021Q(_, _) => ETH_HLEN + VLAN_TAG_LEN,
        }
    }
}
