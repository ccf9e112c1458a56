//! Zero-copy wire header views
//!
//! Every header is a `#[repr(C, packed)]` struct whose fields use
//! `zerocopy` big-endian wrappers, so a view can be laid directly over a
//! packet buffer for reading ([`HeaderParser::from_bytes`]) or rewriting
//! ([`HeaderParser::from_bytes_mut`]) without copying.

use std::mem;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Ref, Unaligned};

pub mod checksum;
pub mod ether;
pub mod ipv4;
pub mod ipv6;
pub mod protocol;
pub mod tcp;
pub mod tunnel;
pub mod udp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketHeaderError {
    #[error("buffer too short for {0}")]
    TooShort(&'static str),
    #[error("invalid {0}")]
    Invalid(&'static str),
    #[error("{0}")]
    Other(&'static str),
}

pub trait PacketHeader: Sized {
    const FIXED_LEN: usize = mem::size_of::<Self>();
    const NAME: &'static str;
    type InnerType;

    /// return the inner type of the header
    fn inner_type(&self) -> Self::InnerType;

    /// Returns the length of the header including any options
    fn total_len(&self, buf: &[u8]) -> usize {
        let _ = buf;
        Self::FIXED_LEN
    }

    /// check whether the header is valid
    #[inline]
    fn is_valid(&self) -> bool {
        true
    }
}

pub trait HeaderParser:
    PacketHeader + FromBytes + IntoBytes + KnownLayout + Immutable + Unaligned
{
    /// The high-level view returned to the user.
    /// Can be `&'a Self` for fixed headers or a custom wrapper<'a> for variable ones.
    type Output<'a>
    where
        Self: 'a;

    /// Transform the raw struct and the options slice into the Output type.
    fn into_view<'a>(header: &'a Self, options: &'a [u8]) -> Self::Output<'a>;

    /// parse the header, ensuring validity and length
    #[inline]
    fn from_bytes<'a>(buf: &'a [u8]) -> Result<(Self::Output<'a>, &'a [u8]), PacketHeaderError> {
        let (header_ref, rest_buf) = Ref::<_, Self>::from_prefix(buf)
            .map_err(|_| PacketHeaderError::TooShort(Self::NAME))?;

        if !header_ref.is_valid() {
            return Err(PacketHeaderError::Invalid(Self::NAME));
        }

        let header = Ref::into_ref(header_ref);

        let total_len = header.total_len(buf);
        let options_len = total_len.saturating_sub(Self::FIXED_LEN);

        if rest_buf.len() < options_len {
            return Err(PacketHeaderError::TooShort(Self::NAME));
        }

        let (options, payload) = rest_buf.split_at(options_len);

        Ok((Self::into_view(header, options), payload))
    }

    /// Mutable view over the fixed part of the header.
    ///
    /// No validity check is made: the caller is usually about to overwrite
    /// the fields.
    #[inline]
    fn from_bytes_mut(buf: &mut [u8]) -> Result<(&mut Self, &mut [u8]), PacketHeaderError> {
        Self::mut_from_prefix(buf).map_err(|_| PacketHeaderError::TooShort(Self::NAME))
    }
}
