use thiserror::Error;

use crate::mbuf::BufferError;
use crate::packet::protocol::{EtherProto, IpProto};
use crate::packet::PacketHeaderError;

/// Why a packet was not transformed.
///
/// Every variant leaves the packet buffer as it was. Callers that only need
/// the data-plane result code can use [`TunnelError::code`] or
/// [`result_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    #[error("packet buffer has no storage")]
    NoStorage,
    #[error("insufficient headroom: need {needed} bytes, {available} available")]
    InsufficientHeadroom { needed: usize, available: usize },
    #[error("packet too short: need {needed} bytes, {available} available")]
    TooShort { needed: usize, available: usize },
    #[error("direction {dir} does not match port {port}")]
    WrongDirection { dir: u8, port: u8 },
    #[error("no tunnel context attached to the packet")]
    MissingContext,
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("unsupported layer 3 protocol {0}")]
    UnsupportedL3(EtherProto),
    #[error("unsupported layer 4 protocol {0}")]
    UnsupportedL4(IpProto),
    #[error("malformed packet: {0}")]
    Malformed(#[from] PacketHeaderError),
    #[error("ARP frame")]
    Arp,
    #[error("not a GTP-U packet")]
    NotTunnel,
    #[error("tunnel mode needs TSO/LRO offload disabled and software mode forced")]
    OffloadEnabled,
}

impl TunnelError {
    /// Uniform data-plane failure code
    #[inline]
    pub fn code(&self) -> i32 {
        -1
    }
}

/// Collapses a transform result into the data-plane convention: `0` on
/// success, `-1` on any failure.
#[inline]
pub fn result_code(result: &Result<(), TunnelError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
