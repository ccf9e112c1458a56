//! GTP-U tunnel handler
//!
//! [`prepend`] and [`adjust`] are the two packet transforms; [`GtpuManager`]
//! wires them to a port and a capability set behind the [`TunnelHandler`]
//! interface.
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use gtpu_tunnel::context::GtpuContext;
//! use gtpu_tunnel::gtpu::GtpuManager;
//! use gtpu_tunnel::handler::{TunnelHandler, TunnelMode};
//! use gtpu_tunnel::mbuf::PacketBuf;
//!
//! let manager = GtpuManager::new(TunnelMode::ALL, 0);
//!
//! // a 14-byte Ethernet header, then IPv4/UDP
//! let mut frame = vec![0u8; 12];
//! frame.extend_from_slice(&[0x08, 0x00]);
//! frame.extend_from_slice(&[
//!     0x45, 0, 0, 28, 0, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2,
//!     0x13, 0x88, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00,
//! ]);
//!
//! let mut pkt = PacketBuf::with_headroom(128, &frame);
//! pkt.set_context(Arc::new(GtpuContext::new_ipv4(
//!     7,
//!     Ipv4Addr::new(192, 0, 2, 1),
//!     Ipv4Addr::new(192, 0, 2, 2),
//! )));
//!
//! manager.on_tx(0, &mut pkt).unwrap();
//! assert_eq!(pkt.len(), frame.len() + 36);
//!
//! manager.on_rx(0, &mut pkt).unwrap();
//! assert_eq!(pkt.data(), frame.as_slice());
//! ```

use tracing::{debug, trace};

use crate::config::{ConfigError, DataplaneOptions, TunnelBatch, TunnelRecord};
use crate::context::{GtpuContext, TunnelEndpoints};
use crate::error::TunnelError;
use crate::handler::{TunnelHandler, TunnelMode, TunnelType};
use crate::mbuf::PacketBuf;

mod decap;
mod encap;

pub use decap::decapsulate;
pub use encap::encapsulate;

/// Egress transform using the context attached to `pkt`.
pub fn prepend(pkt: &mut PacketBuf<GtpuContext>) -> Result<(), TunnelError> {
    if !pkt.has_storage() {
        return Err(TunnelError::NoStorage);
    }
    // taken out for the call and put back, no reference count traffic
    let ctx = pkt.clear_context().ok_or(TunnelError::MissingContext)?;
    let result = encapsulate(&ctx, pkt);
    pkt.set_context(ctx);
    result
}

/// Ingress transform. Needs no context: the TEID is not checked.
#[inline]
pub fn adjust(pkt: &mut PacketBuf<GtpuContext>) -> Result<(), TunnelError> {
    decapsulate(pkt)
}

/// GTP-U handler bound to one port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtpuManager {
    mode: TunnelMode,
    port_id: u8,
}

impl GtpuManager {
    pub fn new(mode: TunnelMode, port_id: u8) -> Self {
        GtpuManager { mode, port_id }
    }

    /// Builds a handler after checking that the data-plane `options` meet
    /// [`TunnelHandler::required_dataplane_options`] whenever a packet
    /// transform is enabled.
    pub fn with_dataplane(
        mode: TunnelMode,
        port_id: u8,
        options: &DataplaneOptions,
    ) -> Result<Self, TunnelError> {
        if mode.intersects(TunnelMode::TX | TunnelMode::RX)
            && !options.satisfies(&DataplaneOptions::for_tunnels())
        {
            return Err(TunnelError::OffloadEnabled);
        }
        Ok(Self::new(mode, port_id))
    }

    #[inline]
    pub fn mode(&self) -> TunnelMode {
        self.mode
    }

    #[inline]
    pub fn port_id(&self) -> u8 {
        self.port_id
    }

    #[inline]
    fn require(&self, needed: TunnelMode, op: &str) {
        assert!(
            self.mode.contains(needed),
            "{op} needs {needed} capability, handler mode is {}",
            self.mode
        );
    }

    #[inline]
    fn check_direction(&self, dir: u8) -> Result<(), TunnelError> {
        if dir != self.port_id {
            return Err(TunnelError::WrongDirection {
                dir,
                port: self.port_id,
            });
        }
        Ok(())
    }

    /// The IPv6 control path fills both outer addresses from `dip`.
    fn endpoints_of(record: &TunnelRecord) -> TunnelEndpoints {
        match record.endpoints {
            v4 @ TunnelEndpoints::V4 { .. } => v4,
            TunnelEndpoints::V6 { dst, .. } => TunnelEndpoints::V6 { src: dst, dst },
        }
    }
}

impl TunnelHandler for GtpuManager {
    type Context = GtpuContext;

    fn on_tx(&self, dir: u8, pkt: &mut PacketBuf<GtpuContext>) -> Result<(), TunnelError> {
        self.require(TunnelMode::TX, "on_tx");
        self.check_direction(dir)?;
        prepend(pkt).inspect_err(|e| trace!("encap dropped: {e}"))
    }

    fn on_rx(&self, dir: u8, pkt: &mut PacketBuf<GtpuContext>) -> Result<(), TunnelError> {
        self.require(TunnelMode::RX, "on_rx");
        self.check_direction(dir)?;
        adjust(pkt).inspect_err(|e| trace!("decap skipped: {e}"))
    }

    fn tunnel_context(&self, record: &TunnelRecord) -> GtpuContext {
        self.require(TunnelMode::DP, "tunnel_context");
        let ctx = GtpuContext::new(record.teid, Self::endpoints_of(record));
        debug!("new tunnel context for {}: {}", record.client_addr(), ctx);
        ctx
    }

    fn update_tunnel_context(&self, record: &TunnelRecord, context: &mut GtpuContext) {
        self.require(TunnelMode::DP, "update_tunnel_context");
        context.update(record.teid, Self::endpoints_of(record));
        debug!("updated tunnel context for {}: {}", record.client_addr(), context);
    }

    fn parse_tunnel(&self, batch: &TunnelBatch) -> Result<Vec<TunnelRecord>, ConfigError> {
        self.require(TunnelMode::CP, "parse_tunnel");
        batch.records()
    }

    fn required_dataplane_options(&self) -> DataplaneOptions {
        self.require(TunnelMode::TX | TunnelMode::RX, "required_dataplane_options");
        DataplaneOptions::for_tunnels()
    }

    #[inline]
    fn tunnel_type(&self) -> TunnelType {
        TunnelType::Gtp
    }
}


#[cfg(test)]
mod tests {
    use super::frames::*;
    use super::*;
    use crate::packet::protocol::IpProto;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::sync::Arc;

    fn record4(teid: u32) -> TunnelRecord {
        TunnelRecord {
            teid,
            client_ip: 0x0A2D0007,
            endpoints: TunnelEndpoints::V4 {
                src: Ipv4Addr::new(198, 51, 100, 1),
                dst: Ipv4Addr::new(198, 51, 100, 2),
            },
        }
    }

    fn record6(teid: u32) -> TunnelRecord {
        TunnelRecord {
            teid,
            client_ip: 0x0A2D0007,
            endpoints: TunnelEndpoints::V6 {
                src: "2001:db8:ffff::1".parse().unwrap(),
                dst: "2001:db8:ffff::2".parse().unwrap(),
            },
        }
    }

    #[test]
    fn test_round_trip() {
        let manager = GtpuManager::new(TunnelMode::ALL, 1);
        let payloads: [&[u8]; 2] = [b"x", b"round trip payload"];

        for record in [record4(0xabcdef01), record6(0x10)] {
            let ctx = Arc::new(manager.tunnel_context(&record));
            for inner in [InnerIp::V4, InnerIp::V6] {
                for proto in [IpProto::UDP, IpProto::TCP] {
                    for vlan in [None, Some(0x0064)] {
                        for payload in payloads {
                            let frame = build_frame(vlan, inner, proto, payload);
                            let mut pkt = PacketBuf::with_headroom(128, &frame);
                            pkt.set_context(ctx.clone());

                            manager.on_tx(1, &mut pkt).unwrap();
                            assert_eq!(pkt.len(), frame.len() + ctx.encapsulation_len());

                            let l2_len = if vlan.is_some() { 18 } else { 14 };
                            let (written, expected) = outer_udp_checksums(pkt.data(), l2_len);
                            assert_eq!(written, expected);

                            manager.on_rx(1, &mut pkt).unwrap();
                            assert_eq!(
                                pkt.data(),
                                frame.as_slice(),
                                "{} inner={:?} proto={} vlan={:?}",
                                ctx,
                                inner,
                                proto,
                                vlan
                            );
                            assert_eq!(pkt.headroom(), 128);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_on_tx_wrong_direction() {
        let manager = GtpuManager::new(TunnelMode::TX | TunnelMode::RX, 0);
        let frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"abc");
        let mut pkt = PacketBuf::with_headroom(64, &frame);
        pkt.set_context(Arc::new(GtpuContext::from_record(&record4(1))));

        assert_eq!(
            manager.on_tx(1, &mut pkt).unwrap_err(),
            TunnelError::WrongDirection { dir: 1, port: 0 }
        );
        assert_eq!(
            manager.on_rx(2, &mut pkt).unwrap_err(),
            TunnelError::WrongDirection { dir: 2, port: 0 }
        );
        assert_eq!(pkt.data(), frame.as_slice());
    }

    #[test]
    fn test_on_tx_missing_context() {
        let manager = GtpuManager::new(TunnelMode::TX, 3);
        let frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"abc");
        let mut pkt = PacketBuf::with_headroom(64, &frame);

        assert_eq!(
            manager.on_tx(3, &mut pkt).unwrap_err(),
            TunnelError::MissingContext
        );
        assert_eq!(pkt.data(), frame.as_slice());
    }

    #[test]
    fn test_prepend_keeps_context_attached() {
        let ctx = Arc::new(GtpuContext::from_record(&record4(9)));
        let frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"abc");

        let mut pkt = PacketBuf::with_headroom(64, &frame);
        pkt.set_context(ctx.clone());
        prepend(&mut pkt).unwrap();
        assert!(Arc::ptr_eq(pkt.context().unwrap(), &ctx));
        assert_eq!(Arc::strong_count(&ctx), 2);

        // also on failure
        let mut pkt = PacketBuf::with_headroom(0, &frame);
        pkt.set_context(ctx.clone());
        assert!(matches!(
            prepend(&mut pkt),
            Err(TunnelError::InsufficientHeadroom { .. })
        ));
        assert!(Arc::ptr_eq(pkt.context().unwrap(), &ctx));
        assert_eq!(Arc::strong_count(&ctx), 3);
    }

    #[test]
    fn test_prepend_checks_storage_before_context() {
        let mut pkt: PacketBuf<GtpuContext> = PacketBuf::new(0, 0);
        assert_eq!(prepend(&mut pkt).unwrap_err(), TunnelError::NoStorage);
    }

    #[test]
    fn test_on_rx_needs_no_context() {
        let manager = GtpuManager::new(TunnelMode::ALL, 0);
        let frame = build_frame(Some(7), InnerIp::V6, IpProto::TCP, b"abc");
        let mut pkt = PacketBuf::with_headroom(64, &frame);
        pkt.set_context(Arc::new(manager.tunnel_context(&record4(5))));
        manager.on_tx(0, &mut pkt).unwrap();
        pkt.clear_context();

        manager.on_rx(0, &mut pkt).unwrap();
        assert_eq!(pkt.data(), frame.as_slice());
    }

    #[test]
    #[should_panic(expected = "on_tx needs TX capability")]
    fn test_on_tx_without_capability_panics() {
        let manager = GtpuManager::new(TunnelMode::RX | TunnelMode::DP, 0);
        let mut pkt: PacketBuf<GtpuContext> = PacketBuf::new(64, 32);
        let _ = manager.on_tx(0, &mut pkt);
    }

    #[test]
    #[should_panic(expected = "parse_tunnel needs CP capability")]
    fn test_parse_tunnel_without_capability_panics() {
        let manager = GtpuManager::new(TunnelMode::TX | TunnelMode::RX, 0);
        let _ = manager.parse_tunnel(&TunnelBatch::default());
    }

    #[test]
    #[should_panic(expected = "required_dataplane_options needs TX|RX capability")]
    fn test_dataplane_options_need_both_directions() {
        let manager = GtpuManager::new(TunnelMode::TX, 0);
        manager.required_dataplane_options();
    }

    #[test]
    fn test_with_dataplane() {
        let forced = DataplaneOptions::for_tunnels();
        let manager = GtpuManager::with_dataplane(TunnelMode::ALL, 2, &forced).unwrap();
        assert_eq!(manager.port_id(), 2);
        assert_eq!(manager.required_dataplane_options(), forced);

        let partial = DataplaneOptions {
            tso_offload_disable: true,
            ..Default::default()
        };
        assert_eq!(
            GtpuManager::with_dataplane(TunnelMode::RX, 0, &partial).unwrap_err(),
            TunnelError::OffloadEnabled
        );

        // control-only handlers do not touch packets
        let cp = GtpuManager::with_dataplane(TunnelMode::CP | TunnelMode::DP, 0, &partial);
        assert!(cp.is_ok());
    }

    #[test]
    fn test_ipv6_context_uses_destination_for_both_endpoints() {
        let manager = GtpuManager::new(TunnelMode::DP, 0);
        let record = record6(77);
        let TunnelEndpoints::V6 { dst, .. } = record.endpoints else {
            unreachable!()
        };

        let mut ctx = manager.tunnel_context(&record);
        assert_eq!(ctx.src_ipv6(), dst);
        assert_eq!(ctx.dst_ipv6(), dst);

        let mut moved = record6(78);
        moved.endpoints = TunnelEndpoints::V6 {
            src: "2001:db8::a".parse().unwrap(),
            dst: "2001:db8::b".parse().unwrap(),
        };
        manager.update_tunnel_context(&moved, &mut ctx);
        assert_eq!(ctx.teid(), 78);
        assert_eq!(ctx.src_ipv6(), "2001:db8::b".parse::<Ipv6Addr>().unwrap());
        assert_eq!(ctx.dst_ipv6(), "2001:db8::b".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn test_ipv4_context_keeps_both_endpoints() {
        let manager = GtpuManager::new(TunnelMode::DP, 0);
        let ctx = manager.tunnel_context(&record4(1));
        assert_eq!(ctx.src_ipv4(), Ipv4Addr::new(198, 51, 100, 1));
        assert_eq!(ctx.dst_ipv4(), Ipv4Addr::new(198, 51, 100, 2));
        manager.delete_tunnel_context(ctx);
    }

    #[test]
    #[should_panic(expected = "tunnel context family cannot change")]
    fn test_update_across_families_panics() {
        let manager = GtpuManager::new(TunnelMode::DP, 0);
        let mut ctx = manager.tunnel_context(&record4(1));
        manager.update_tunnel_context(&record6(1), &mut ctx);
    }

    #[test]
    fn test_parse_tunnel() {
        let manager = GtpuManager::new(TunnelMode::CP, 0);
        let batch = TunnelBatch::from_json(
            r#"{"attr":[{"version":4,"client_ip":167772161,"sip":"1.1.1.1","dip":"2.2.2.2","teid":100}]}"#,
        )
        .unwrap();
        let records = manager.parse_tunnel(&batch).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].client_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(records[0].teid, 100);
    }

    #[test]
    fn test_tunnel_type() {
        let manager = GtpuManager::new(TunnelMode::NONE, 0);
        assert_eq!(manager.tunnel_type(), TunnelType::Gtp);
        assert_eq!(manager.tunnel_type_str(), "GTP");
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GtpuContext>();
        assert_send_sync::<GtpuManager>();
        assert_send_sync::<PacketBuf<GtpuContext>>();
    }
}
