//! GTPv1-U header (3GPP TS 29.281)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Ver  |PT |(*)|E|S|PN|        Message Type                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Length                                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         TEID                                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |       Sequence Number (opt)   |   N-PDU (opt) | Next Ext (opt)|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The encapsulation engine only ever writes the mandatory 8 bytes with
//! flags `0x30` (version 1, PT=1) and message type G-PDU. `length` counts
//! everything after the mandatory header.
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::tunnel::gtpv1::{Gtpv1Header, Gtpv1MessageType};
//! use gtpu_tunnel::packet::HeaderParser;
//!
//! let packet = vec![
//!     0x32,        // Version 1, PT=1, S=1
//!     0xFF,        // Message type: G-PDU
//!     0x00, 0x08,  // Length: 8 bytes (4 optional + 4 payload)
//!     0x00, 0x00, 0x00, 0x01,  // TEID: 1
//!     0x00, 0x2a,  // Sequence number: 42
//!     0x00,        // N-PDU number
//!     0x00,        // Next extension: none
//!     0x45, 0x00, 0x00, 0x00,
//! ];
//!
//! let (header, payload) = Gtpv1Header::from_bytes(&packet).unwrap();
//! assert_eq!(header.message_type_enum(), Gtpv1MessageType::GPdu);
//! assert_eq!(header.teid(), 1);
//! assert_eq!(header.sequence_number(), Some(42));
//! assert_eq!(payload.len(), 4);
//! ```

use std::fmt::{self, Formatter};

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, IntoBytes, Unaligned};

use crate::packet::{HeaderParser, PacketHeader};

/// GTP-C (control plane) UDP port
pub const GTPV1_C_PORT: u16 = 2123;

/// GTP-U (user plane) UDP port
pub const GTPV1_U_PORT: u16 = 2152;

/// Flags byte for a plain GTPv1 header: version 1, PT=1, no optional fields
pub const GTPV1_FLAGS: u8 = 0x30;

/// Size of the mandatory GTPv1 header
pub const GTPV1_HLEN: usize = 8;

/// GTP-U message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Gtpv1MessageType {
    EchoRequest = 1,
    EchoResponse = 2,
    ErrorIndication = 26,
    SupportedExtensionHeadersNotification = 31,
    EndMarker = 254,
    GPdu = 255,
    Unknown = 0,
}

impl From<u8> for Gtpv1MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Gtpv1MessageType::EchoRequest,
            2 => Gtpv1MessageType::EchoResponse,
            26 => Gtpv1MessageType::ErrorIndication,
            31 => Gtpv1MessageType::SupportedExtensionHeadersNotification,
            254 => Gtpv1MessageType::EndMarker,
            255 => Gtpv1MessageType::GPdu,
            _ => Gtpv1MessageType::Unknown,
        }
    }
}

impl fmt::Display for Gtpv1MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Gtpv1MessageType::EchoRequest => write!(f, "Echo Request"),
            Gtpv1MessageType::EchoResponse => write!(f, "Echo Response"),
            Gtpv1MessageType::ErrorIndication => write!(f, "Error Indication"),
            Gtpv1MessageType::SupportedExtensionHeadersNotification => {
                write!(f, "Supported Extension Headers Notification")
            }
            Gtpv1MessageType::EndMarker => write!(f, "End Marker"),
            Gtpv1MessageType::GPdu => write!(f, "G-PDU"),
            Gtpv1MessageType::Unknown => write!(f, "Unknown"),
        }
    }
}

#[repr(C, packed)]
#[derive(
    FromBytes, IntoBytes, Unaligned, Debug, Clone, Copy, zerocopy::KnownLayout, zerocopy::Immutable,
)]
pub struct Gtpv1Header {
    flags: u8,
    message_type: u8,
    length: U16<BigEndian>,
    teid: U32<BigEndian>,
}

impl Gtpv1Header {
    pub const VERSION_MASK: u8 = 0xE0;
    pub const VERSION_SHIFT: u8 = 5;

    /// Protocol Type: 1 = GTP, 0 = GTP'
    pub const FLAG_PT: u8 = 0x10;
    pub const FLAG_RESERVED: u8 = 0x08;
    pub const FLAG_E: u8 = 0x04;
    pub const FLAG_S: u8 = 0x02;
    pub const FLAG_PN: u8 = 0x01;

    pub const VERSION_1: u8 = 1;

    /// Header length with sequence, N-PDU and next-extension fields
    pub const OPTIONAL_HEADER_LEN: usize = 12;

    #[inline]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.flags & Self::VERSION_MASK) >> Self::VERSION_SHIFT
    }

    #[inline]
    pub fn is_gtp(&self) -> bool {
        self.flags & Self::FLAG_PT != 0
    }

    #[inline]
    pub fn has_optional_fields(&self) -> bool {
        self.flags & (Self::FLAG_E | Self::FLAG_S | Self::FLAG_PN) != 0
    }

    #[inline]
    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    #[inline]
    pub fn message_type_enum(&self) -> Gtpv1MessageType {
        self.message_type.into()
    }

    /// Returns true if this carries user data
    #[inline]
    pub fn is_gpdu(&self) -> bool {
        self.message_type == Gtpv1MessageType::GPdu as u8
    }

    /// Payload length, not including the mandatory header
    #[inline]
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// Tunnel Endpoint Identifier
    #[inline]
    pub fn teid(&self) -> u32 {
        self.teid.get()
    }

    #[inline]
    pub fn header_length(&self) -> usize {
        if self.has_optional_fields() {
            Self::OPTIONAL_HEADER_LEN
        } else {
            GTPV1_HLEN
        }
    }

    #[inline]
    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }

    #[inline]
    pub fn set_message_type(&mut self, message_type: Gtpv1MessageType) {
        self.message_type = message_type as u8;
    }

    #[inline]
    pub fn set_length(&mut self, length: u16) {
        self.length.set(length);
    }

    #[inline]
    pub fn set_teid(&mut self, teid: u32) {
        self.teid.set(teid);
    }
}

/// GTPv1 header with its optional fields, if any
#[derive(Debug, Clone)]
pub struct Gtpv1HeaderOpt<'a> {
    pub header: &'a Gtpv1Header,
    pub raw_options: &'a [u8],
}

impl Gtpv1HeaderOpt<'_> {
    pub fn sequence_number(&self) -> Option<u16> {
        match self.raw_options {
            [hi, lo, ..] if self.header.flags & Gtpv1Header::FLAG_S != 0 => {
                Some(u16::from_be_bytes([*hi, *lo]))
            }
            _ => None,
        }
    }
}

impl std::ops::Deref for Gtpv1HeaderOpt<'_> {
    type Target = Gtpv1Header;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.header
    }
}

impl PacketHeader for Gtpv1Header {
    const NAME: &'static str = "Gtpv1Header";
    type InnerType = u8;

    #[inline]
    fn inner_type(&self) -> Self::InnerType {
        self.message_type
    }

    #[inline]
    fn total_len(&self, _buf: &[u8]) -> usize {
        self.header_length()
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.version() == Self::VERSION_1 && self.flags & Self::FLAG_RESERVED == 0
    }
}

impl HeaderParser for Gtpv1Header {
    type Output<'a> = Gtpv1HeaderOpt<'a>;

    #[inline]
    fn into_view<'a>(header: &'a Self, raw_options: &'a [u8]) -> Self::Output<'a> {
        Gtpv1HeaderOpt {
            header,
            raw_options,
        }
    }
}

impl fmt::Display for Gtpv1Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GTPv1 {} msg={} len={} teid=0x{:08x}",
            if self.is_gtp() { "GTP" } else { "GTP'" },
            self.message_type_enum(),
            self.length(),
            self.teid()
        )
    }
}

impl fmt::Display for Gtpv1HeaderOpt<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.header.fmt(f)?;
        if let Some(seq) = self.sequence_number() {
            write!(f, " seq={}", seq)?;
        }
        Ok(())
    }
}
