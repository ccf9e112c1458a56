//! GTP-U user-plane tunnelling over in-place packet buffers
//!
//! Outgoing Ethernet frames are wrapped in `IP / UDP / GTP-U` headers built
//! from a per-flow [`GtpuContext`](context::GtpuContext); incoming GTP-U
//! frames are stripped back to their inner packet. Both transforms rewrite a
//! [`PacketBuf`](mbuf::PacketBuf) in place and never allocate.

#[macro_use]
mod macros;

pub mod config;
pub mod context;
pub mod error;
pub mod gtpu;
pub mod handler;
pub mod mbuf;
pub mod packet;

pub use config::{DataplaneOptions, TunnelBatch, TunnelRecord, TunnelSpec};
pub use context::{AddressFamily, GtpuContext, TunnelEndpoints};
pub use error::{result_code, TunnelError};
pub use gtpu::GtpuManager;
pub use handler::{TunnelHandler, TunnelMode, TunnelType};
pub use mbuf::PacketBuf;
