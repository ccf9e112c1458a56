//! Tunnel handler interface
//!
//! A data-plane pipeline talks to a tunnel implementation through
//! [`TunnelHandler`]: per-packet hooks for each direction, plus the control
//! operations that turn configuration records into per-flow contexts.
//!
//! Which of those a given handler instance may serve is declared up front
//! with a [`TunnelMode`]. Calling an operation outside the declared mode is a
//! wiring bug and panics.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::config::{ConfigError, DataplaneOptions, TunnelBatch, TunnelRecord};
use crate::error::TunnelError;
use crate::mbuf::PacketBuf;

/// Capability bits of a tunnel handler instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TunnelMode(u8);

impl TunnelMode {
    pub const NONE: TunnelMode = TunnelMode(0);
    /// Egress: encapsulate outgoing packets
    pub const TX: TunnelMode = TunnelMode(0x01);
    /// Ingress: decapsulate incoming packets
    pub const RX: TunnelMode = TunnelMode(0x02);
    /// Context management
    pub const DP: TunnelMode = TunnelMode(0x04);
    /// Control-plane configuration parsing
    pub const CP: TunnelMode = TunnelMode(0x08);
    pub const ALL: TunnelMode = TunnelMode(0x0F);

    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, other: TunnelMode) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(&self, other: TunnelMode) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for TunnelMode {
    type Output = TunnelMode;

    #[inline]
    fn bitor(self, rhs: TunnelMode) -> TunnelMode {
        TunnelMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for TunnelMode {
    #[inline]
    fn bitor_assign(&mut self, rhs: TunnelMode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (TunnelMode::TX, "TX"),
            (TunnelMode::RX, "RX"),
            (TunnelMode::DP, "DP"),
            (TunnelMode::CP, "CP"),
        ];
        let active: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if active.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", active.join("|"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum TunnelType {
    #[strum(serialize = "GTP")]
    Gtp,
}

pub trait TunnelHandler {
    /// Per-flow state attached to packets
    type Context;

    /// Egress hook: encapsulate `pkt` using its attached context.
    fn on_tx(&self, dir: u8, pkt: &mut PacketBuf<Self::Context>) -> Result<(), TunnelError>;

    /// Ingress hook: strip the tunnel headers from `pkt` if it carries any.
    fn on_rx(&self, dir: u8, pkt: &mut PacketBuf<Self::Context>) -> Result<(), TunnelError>;

    fn tunnel_context(&self, record: &TunnelRecord) -> Self::Context;

    fn update_tunnel_context(&self, record: &TunnelRecord, context: &mut Self::Context);

    fn delete_tunnel_context(&self, context: Self::Context) {
        drop(context);
    }

    /// Decodes a control-plane batch into records.
    fn parse_tunnel(&self, batch: &TunnelBatch) -> Result<Vec<TunnelRecord>, ConfigError>;

    /// Data-plane switches the surrounding system must set while this
    /// handler's transforms are active.
    fn required_dataplane_options(&self) -> DataplaneOptions;

    fn tunnel_type(&self) -> TunnelType;

    fn tunnel_type_str(&self) -> &'static str {
        self.tunnel_type().into()
    }
}
