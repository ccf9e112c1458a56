//! TCP header (RFC 793)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Data |       |C|E|U|A|P|R|S|F|                               |
//! | Offset| Rsrvd |W|C|R|C|S|S|Y|I|            Window             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |         Urgent Pointer        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The tunnel engine never rewrites TCP; it only needs the checksum to be
//! valid on the inner segment. Options are skipped, not decoded.

use std::fmt::{self, Formatter};

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::checksum;
use crate::packet::{HeaderParser, PacketHeader};

#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct TcpHeader {
    src_port: U16<BigEndian>,
    dst_port: U16<BigEndian>,
    sequence_number: U32<BigEndian>,
    acknowledgment_number: U32<BigEndian>,
    data_offset_flags: U16<BigEndian>,
    window_size: U16<BigEndian>,
    checksum: U16<BigEndian>,
    urgent_pointer: U16<BigEndian>,
}

impl TcpHeader {
    pub const FLAG_FIN: u8 = 0x01;
    pub const FLAG_SYN: u8 = 0x02;
    pub const FLAG_RST: u8 = 0x04;
    pub const FLAG_PSH: u8 = 0x08;
    pub const FLAG_ACK: u8 = 0x10;

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.src_port.get()
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.dst_port.get()
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number.get()
    }

    /// Data offset in 32-bit words
    #[inline]
    pub fn data_offset(&self) -> u8 {
        (self.data_offset_flags.get() >> 12) as u8
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        (self.data_offset_flags.get() & 0xFF) as u8
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum.get()
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        self.checksum.set(checksum);
    }

    /// Checksum of a whole segment, given the IP pseudo-header sum. The
    /// checksum field inside `segment` must be zero.
    pub fn compute_checksum(pseudo_sum: u32, segment: &[u8]) -> u16 {
        checksum::finish(checksum::sum_words(pseudo_sum, segment))
    }
}

impl PacketHeader for TcpHeader {
    const NAME: &'static str = "TcpHeader";
    type InnerType = ();

    #[inline]
    fn inner_type(&self) -> Self::InnerType {}

    #[inline]
    fn total_len(&self, _buf: &[u8]) -> usize {
        self.data_offset() as usize * 4
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.data_offset() >= 5
    }
}

impl HeaderParser for TcpHeader {
    type Output<'a> = &'a TcpHeader;

    #[inline]
    fn into_view<'a>(header: &'a Self, _options: &'a [u8]) -> Self::Output<'a> {
        header
    }
}

impl fmt::Display for TcpHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TCP {} -> {} seq={} flags=0x{:02x} csum=0x{:04x}",
            self.src_port(),
            self.dst_port(),
            self.sequence_number(),
            self.flags(),
            self.checksum()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_segment(data_offset: u8) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&443u16.to_be_bytes());
        packet.extend_from_slice(&51000u16.to_be_bytes());
        packet.extend_from_slice(&1u32.to_be_bytes());
        packet.extend_from_slice(&0u32.to_be_bytes());
        let off_flags = ((data_offset as u16) << 12) | TcpHeader::FLAG_SYN as u16;
        packet.extend_from_slice(&off_flags.to_be_bytes());
        packet.extend_from_slice(&65535u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.resize(data_offset as usize * 4, 0x01);
        packet
    }

    #[test]
    fn test_tcp_header_size() {
        assert_eq!(std::mem::size_of::<TcpHeader>(), 20);
    }

    #[test]
    fn test_tcp_parse_skips_options() {
        let mut packet = create_test_segment(6);
        packet.extend_from_slice(b"data");

        let (tcp, payload) = TcpHeader::from_bytes(&packet).unwrap();
        assert_eq!(tcp.src_port(), 443);
        assert_eq!(tcp.dst_port(), 51000);
        assert_eq!(tcp.data_offset(), 6);
        assert_eq!(tcp.flags(), TcpHeader::FLAG_SYN);
        assert_eq!(payload, b"data");
    }

    #[test]
    fn test_tcp_rejects_small_offset() {
        let packet = create_test_segment(5);
        let mut bad = packet.clone();
        bad[12] = 0x40;
        assert!(TcpHeader::from_bytes(&bad).is_err());
        assert!(TcpHeader::from_bytes(&packet).is_ok());
    }

    #[test]
    fn test_tcp_checksum_sums_to_ones() {
        let mut segment = create_test_segment(5);
        let pseudo = 0x1234u32;
        let cs = TcpHeader::compute_checksum(pseudo, &segment);
        {
            let (tcp, _) = TcpHeader::from_bytes_mut(&mut segment).unwrap();
            tcp.set_checksum(cs);
        }
        assert_eq!(checksum::fold(checksum::sum_words(pseudo, &segment)), 0xFFFF);
    }
}
