//! UDP header (RFC 768)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Length             |           Checksum            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum covers a pseudo-header supplied by the IP layer
//! (see [`Ipv4Header::pseudo_header_sum`](crate::packet::ipv4::Ipv4Header::pseudo_header_sum)
//! and [`Ipv6Header::pseudo_header_sum`](crate::packet::ipv6::Ipv6Header::pseudo_header_sum)).
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::udp::UdpHeader;
//! use gtpu_tunnel::packet::HeaderParser;
//!
//! let packet = vec![
//!     0x08, 0x68,        // Source port: 2152
//!     0x08, 0x68,        // Destination port: 2152 (GTP-U)
//!     0x00, 0x10,        // Length: 16
//!     0x00, 0x00,        // Checksum
//!     0x30, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
//! ];
//!
//! let (header, payload) = UdpHeader::from_bytes(&packet).unwrap();
//! assert_eq!(header.dst_port(), 2152);
//! assert_eq!(header.payload_len(), 8);
//! assert_eq!(payload.len(), 8);
//! ```

use std::fmt::{self, Formatter};
use std::mem;

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::checksum;
use crate::packet::{HeaderParser, PacketHeader};

/// Offset of the checksum field inside the UDP header
pub const UDP_CHECKSUM_OFFSET: usize = 6;

#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct UdpHeader {
    src_port: U16<BigEndian>,
    dst_port: U16<BigEndian>,
    length: U16<BigEndian>,
    checksum: U16<BigEndian>,
}

impl UdpHeader {
    #[inline]
    pub fn src_port(&self) -> u16 {
        self.src_port.get()
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.dst_port.get()
    }

    /// Returns the total length of the UDP datagram (header + data)
    #[inline]
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum.get()
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        mem::size_of::<UdpHeader>()
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.length() as usize).saturating_sub(Self::FIXED_LEN)
    }

    #[inline]
    pub fn set_src_port(&mut self, port: u16) {
        self.src_port.set(port);
    }

    #[inline]
    pub fn set_dst_port(&mut self, port: u16) {
        self.dst_port.set(port);
    }

    #[inline]
    pub fn set_length(&mut self, length: u16) {
        self.length.set(length);
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        self.checksum.set(checksum);
    }

    /// Computes the checksum of a whole datagram from scratch.
    ///
    /// `pseudo_sum` is the unfolded pseudo-header sum from the IP layer. The
    /// checksum field inside `udp_data` must be zero.
    pub fn compute_checksum(pseudo_sum: u32, udp_data: &[u8]) -> u16 {
        checksum::transport_finish(checksum::sum_words(pseudo_sum, udp_data))
    }

    /// Verifies the checksum of a whole datagram. A zero checksum means
    /// "not computed" and is accepted.
    pub fn verify_checksum(&self, pseudo_sum: u32, udp_data: &[u8]) -> bool {
        if self.checksum() == 0 {
            return true;
        }
        checksum::fold(checksum::sum_words(pseudo_sum, udp_data)) == 0xFFFF
    }
}

impl PacketHeader for UdpHeader {
    const NAME: &'static str = "UdpHeader";
    type InnerType = ();

    #[inline]
    fn inner_type(&self) -> Self::InnerType {}

    #[inline]
    fn is_valid(&self) -> bool {
        self.length() >= Self::FIXED_LEN as u16
    }
}

impl HeaderParser for UdpHeader {
    type Output<'a> = &'a UdpHeader;

    #[inline]
    fn into_view<'a>(header: &'a Self, _: &'a [u8]) -> Self::Output<'a> {
        header
    }
}

impl fmt::Display for UdpHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UDP {} -> {} len={} csum=0x{:04x}",
            self.src_port(),
            self.dst_port(),
            self.length(),
            self.checksum()
        )
    }
}
