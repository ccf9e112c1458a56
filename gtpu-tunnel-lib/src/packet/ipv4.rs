//! IPv4 header (RFC 791)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version|  IHL  |    DSCP   |ECN|          Total Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Identification        |Flags|      Fragment Offset    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Time to Live |    Protocol   |         Header Checksum       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Source Address                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Destination Address                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Options (if IHL > 5)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Besides the read accessors, the header exposes setters so that an outer
//! header can be written directly into packet headroom, plus the helpers
//! needed for checksumming: [`Ipv4Header::update_checksum`] and
//! [`Ipv4Header::pseudo_header_sum`].
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::ipv4::Ipv4Header;
//! use gtpu_tunnel::packet::protocol::IpProto;
//! use gtpu_tunnel::packet::HeaderParser;
//! use std::net::Ipv4Addr;
//!
//! let packet = vec![
//!     0x45,              // Version=4, IHL=5 (20 bytes)
//!     0x00,              // DSCP=0, ECN=0
//!     0x00, 0x1c,        // Total length: 28 bytes
//!     0x00, 0x00,        // Identification
//!     0x40, 0x00,        // Flags=DF
//!     0x40,              // TTL: 64
//!     0x11,              // Protocol: UDP
//!     0x00, 0x00,        // Checksum
//!     0x0A, 0x00, 0x00, 0x01,  // Source: 10.0.0.1
//!     0x0A, 0x00, 0x00, 0x02,  // Destination: 10.0.0.2
//!     0x00, 0x35, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00,
//! ];
//!
//! let (header, payload) = Ipv4Header::from_bytes(&packet).unwrap();
//! assert_eq!(header.protocol(), IpProto::UDP);
//! assert_eq!(header.src_ip(), Ipv4Addr::new(10, 0, 0, 1));
//! assert_eq!(header.payload_len(), 8);
//! assert_eq!(payload.len(), 8);
//! ```

use std::fmt::{self, Formatter};
use std::net::Ipv4Addr;
use std::ops::Deref;

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::checksum;
use crate::packet::protocol::IpProto;
use crate::packet::{HeaderParser, PacketHeader};

pub const IPV4_HLEN: usize = 20;
pub const IPV4_VERSION: u8 = 4;

#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct Ipv4Header {
    ver_ihl: u8,
    dscp_ecn: u8,
    total_length: U16<BigEndian>,
    identification: U16<BigEndian>,
    flags_frag_offset: U16<BigEndian>,
    ttl: u8,
    protocol: IpProto,
    checksum: U16<BigEndian>,
    src_ip: U32<BigEndian>,
    dst_ip: U32<BigEndian>,
}

impl Ipv4Header {
    #[inline]
    pub fn version(&self) -> u8 {
        self.ver_ihl >> 4
    }

    /// Header length in 32-bit words
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.ver_ihl & 0x0F
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }

    #[inline]
    pub fn dscp(&self) -> u8 {
        self.dscp_ecn >> 2
    }

    #[inline]
    pub fn ecn(&self) -> u8 {
        self.dscp_ecn & 0x03
    }

    #[inline]
    pub fn total_length(&self) -> usize {
        self.total_length.get() as usize
    }

    /// Length of everything after the header, as claimed by `total_length`
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.total_length().saturating_sub(self.header_len())
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.identification.get()
    }

    #[inline]
    pub fn flags_frag_offset(&self) -> u16 {
        self.flags_frag_offset.get()
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn protocol(&self) -> IpProto {
        self.protocol
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum.get()
    }

    #[inline]
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_ip.get())
    }

    #[inline]
    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_ip.get())
    }

    #[inline]
    pub fn has_options(&self) -> bool {
        self.ihl() > 5
    }

    /// Sets version and IHL together
    #[inline]
    pub fn set_version_ihl(&mut self, version: u8, ihl: u8) {
        self.ver_ihl = (version << 4) | (ihl & 0x0F);
    }

    #[inline]
    pub fn set_dscp_ecn(&mut self, dscp_ecn: u8) {
        self.dscp_ecn = dscp_ecn;
    }

    #[inline]
    pub fn set_total_length(&mut self, len: u16) {
        self.total_length.set(len);
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.identification.set(id);
    }

    #[inline]
    pub fn set_flags_frag_offset(&mut self, value: u16) {
        self.flags_frag_offset.set(value);
    }

    #[inline]
    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    #[inline]
    pub fn set_protocol(&mut self, proto: IpProto) {
        self.protocol = proto;
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        self.checksum.set(checksum);
    }

    #[inline]
    pub fn set_src_ip(&mut self, addr: Ipv4Addr) {
        self.src_ip.set(addr.into());
    }

    #[inline]
    pub fn set_dst_ip(&mut self, addr: Ipv4Addr) {
        self.dst_ip.set(addr.into());
    }

    /// Recomputes the header checksum over the fixed 20 bytes.
    ///
    /// Only valid for headers without options, which is all this crate ever
    /// writes.
    pub fn update_checksum(&mut self) {
        self.set_checksum(0);
        let cs = checksum::finish(checksum::sum_words(0, self.as_bytes()));
        self.set_checksum(cs);
    }

    /// Checks the header checksum over `header_bytes`, options included.
    pub fn verify_checksum(header_bytes: &[u8]) -> bool {
        checksum::fold(checksum::sum_words(0, header_bytes)) == 0xFFFF
    }

    /// Unfolded sum of the transport pseudo-header: both addresses, the
    /// protocol and `l4_len`.
    #[inline]
    pub fn pseudo_header_sum(&self, l4_len: u16) -> u32 {
        let src = self.src_ip.get();
        let dst = self.dst_ip.get();
        (src >> 16)
            + (src & 0xFFFF)
            + (dst >> 16)
            + (dst & 0xFFFF)
            + self.protocol.value() as u32
            + l4_len as u32
    }
}

/// IPv4 header together with its raw options
#[derive(Debug, Clone, Copy)]
pub struct Ipv4HeaderOpt<'a> {
    pub header: &'a Ipv4Header,
    pub raw_options: &'a [u8],
}

impl Deref for Ipv4HeaderOpt<'_> {
    type Target = Ipv4Header;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.header
    }
}

impl PacketHeader for Ipv4Header {
    const NAME: &'static str = "IPv4Header";
    type InnerType = IpProto;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.protocol
    }

    #[inline]
    fn total_len(&self, _buf: &[u8]) -> usize {
        self.header_len()
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.version() == IPV4_VERSION && self.ihl() >= 5
    }
}

impl HeaderParser for Ipv4Header {
    type Output<'a> = Ipv4HeaderOpt<'a>;

    #[inline]
    fn into_view<'a>(header: &'a Self, raw_options: &'a [u8]) -> Self::Output<'a> {
        Ipv4HeaderOpt {
            header,
            raw_options,
        }
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} proto={} ttl={} len={}",
            self.src_ip(),
            self.dst_ip(),
            self.protocol(),
            self.ttl(),
            self.total_length()
        )?;

        if self.has_options() {
            write!(f, " +opts")?;
        }

        Ok(())
    }
}

impl fmt::Display for Ipv4HeaderOpt<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.header.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketHeaderError;

    fn create_test_packet(ihl: u8, proto: u8, payload: &[u8]) -> Vec<u8> {
        let hlen = ihl as usize * 4;
        let mut packet = Vec::new();
        packet.push(0x40 | ihl);
        packet.push(0);
        packet.extend_from_slice(&((hlen + payload.len()) as u16).to_be_bytes());
        packet.extend_from_slice(&0x1c46u16.to_be_bytes());
        packet.extend_from_slice(&0x4000u16.to_be_bytes());
        packet.push(64);
        packet.push(proto);
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&[192, 168, 0, 1]);
        packet.extend_from_slice(&[192, 168, 0, 199]);
        packet.resize(hlen, 0x01); // NOP options
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn test_ipv4_header_size() {
        assert_eq!(std::mem::size_of::<Ipv4Header>(), IPV4_HLEN);
    }

    #[test]
    fn test_ipv4_parse_with_options() {
        let packet = create_test_packet(6, 17, &[0xAA; 8]);
        let (ip, payload) = Ipv4Header::from_bytes(&packet).unwrap();

        assert_eq!(ip.ihl(), 6);
        assert_eq!(ip.header_len(), 24);
        assert!(ip.has_options());
        assert_eq!(ip.raw_options, &[0x01; 4]);
        assert_eq!(ip.payload_len(), 8);
        assert_eq!(payload, &[0xAA; 8]);
    }

    #[test]
    fn test_ipv4_rejects_bad_version_and_ihl() {
        let mut packet = create_test_packet(5, 6, &[]);
        packet[0] = 0x65;
        assert_eq!(
            Ipv4Header::from_bytes(&packet).unwrap_err(),
            PacketHeaderError::Invalid("IPv4Header")
        );

        packet[0] = 0x44;
        assert_eq!(
            Ipv4Header::from_bytes(&packet).unwrap_err(),
            PacketHeaderError::Invalid("IPv4Header")
        );
    }

    #[test]
    fn test_ipv4_options_truncated() {
        let mut packet = create_test_packet(5, 6, &[]);
        packet[0] = 0x47; // claims 28 bytes
        assert_eq!(
            Ipv4Header::from_bytes(&packet).unwrap_err(),
            PacketHeaderError::TooShort("IPv4Header")
        );
    }

    #[test]
    fn test_ipv4_update_checksum_known_value() {
        // Same header as the classic Wikipedia checksum example
        let mut packet = vec![
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x12, 0x34, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        {
            let (ip, _) = Ipv4Header::from_bytes_mut(&mut packet).unwrap();
            ip.update_checksum();
            assert_eq!(ip.checksum(), 0xb861);
        }
        assert!(Ipv4Header::verify_checksum(&packet));
    }

    #[test]
    fn test_ipv4_setters() {
        let mut buf = [0u8; IPV4_HLEN];
        {
            let (ip, _) = Ipv4Header::from_bytes_mut(&mut buf).unwrap();
            ip.set_version_ihl(4, 5);
            ip.set_total_length(100);
            ip.set_ttl(64);
            ip.set_protocol(IpProto::UDP);
            ip.set_src_ip(Ipv4Addr::new(10, 1, 2, 3));
            ip.set_dst_ip(Ipv4Addr::new(10, 4, 5, 6));
        }
        assert_eq!(buf[0], 0x45);
        assert_eq!(&buf[2..4], &[0x00, 100]);
        assert_eq!(buf[8], 64);
        assert_eq!(buf[9], 17);
        assert_eq!(&buf[12..16], &[10, 1, 2, 3]);
        assert_eq!(&buf[16..20], &[10, 4, 5, 6]);
    }

    #[test]
    fn test_ipv4_pseudo_header_sum() {
        let packet = create_test_packet(5, 17, &[]);
        let (ip, _) = Ipv4Header::from_bytes(&packet).unwrap();
        // c0a8 + 0001 + c0a8 + 00c7 + 0011 + 0008
        let expected = 0xc0a8 + 0x0001 + 0xc0a8 + 0x00c7 + 17 + 8;
        assert_eq!(ip.pseudo_header_sum(8), expected);
    }
}
