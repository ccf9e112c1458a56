use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ahash::RandomState;
use clap::ValueEnum;
use tracing::info;

use gtpu_tunnel::packet::ether::EtherHeader;
use gtpu_tunnel::packet::ipv4::Ipv4Header;
use gtpu_tunnel::packet::ipv6::Ipv6Header;
use gtpu_tunnel::packet::protocol::{EtherProto, IpProto};
use gtpu_tunnel::packet::tcp::TcpHeader;
use gtpu_tunnel::packet::tunnel::gtpv1::{Gtpv1Header, GTPV1_U_PORT};
use gtpu_tunnel::packet::udp::UdpHeader;
use gtpu_tunnel::packet::HeaderParser;
use gtpu_tunnel::{
    DataplaneOptions, GtpuContext, GtpuManager, PacketBuf, TunnelBatch, TunnelHandler, TunnelMode,
};

use crate::packet_metadata::PacketMetadata;
use crate::stats::{LocalStats, Stats, FLUSH_INTERVAL};

/// Which transform the replay applies to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Encap,
    Decap,
}

/// Replays captured frames through one tunnel handler.
pub struct Replay {
    manager: GtpuManager,
    direction: Direction,
    port: u8,
    headroom: usize,
    /// tunnel contexts keyed by client (inner source) address
    contexts: HashMap<Ipv4Addr, Arc<GtpuContext>, RandomState>,
    dump_packet: bool,
}

impl Replay {
    pub fn new(
        direction: Direction,
        port: u8,
        headroom: usize,
        batch: &TunnelBatch,
        dump_packet: bool,
    ) -> Result<Self, String> {
        let transform = match direction {
            Direction::Encap => TunnelMode::TX,
            Direction::Decap => TunnelMode::RX,
        };
        // a software replay has no offloads to turn off
        let manager = GtpuManager::with_dataplane(
            transform | TunnelMode::DP | TunnelMode::CP,
            port,
            &DataplaneOptions::for_tunnels(),
        )
        .map_err(|e| e.to_string())?;

        let records = manager
            .parse_tunnel(batch)
            .map_err(|e| format!("Invalid tunnel batch: {}", e))?;

        let mut contexts: HashMap<Ipv4Addr, Arc<GtpuContext>, RandomState> = HashMap::default();
        for record in &records {
            let client = record.client_addr();
            match contexts.get_mut(&client) {
                Some(ctx) if ctx.family() == record.endpoints.family() => {
                    manager.update_tunnel_context(record, Arc::make_mut(ctx));
                }
                _ => {
                    contexts.insert(client, Arc::new(manager.tunnel_context(record)));
                }
            }
        }
        info!(
            "Loaded {} tunnel contexts from {} records ({})",
            contexts.len(),
            records.len(),
            manager.tunnel_type_str()
        );

        Ok(Replay {
            manager,
            direction,
            port,
            headroom,
            contexts,
            dump_packet,
        })
    }

    #[inline]
    pub fn context_for(&self, client: &Ipv4Addr) -> Option<&Arc<GtpuContext>> {
        self.contexts.get(client)
    }

    /// Runs one captured frame through the handler and counts the outcome.
    pub fn process_packet<Pkt: PacketMetadata>(
        &self,
        pkt_count: u64,
        pkt: &Pkt,
        local_stats: &mut LocalStats,
        stats: &Stats,
    ) -> PacketBuf<GtpuContext> {
        local_stats.total_packets += 1;
        local_stats.total_bytes += pkt.caplen() as u64;

        let mut buf = PacketBuf::with_headroom(self.headroom, pkt.data());
        let result = match self.direction {
            Direction::Encap => {
                if let Some(ctx) = client_of(pkt.data()).and_then(|ip| self.contexts.get(&ip)) {
                    buf.set_context(ctx.clone());
                }
                self.manager.on_tx(self.port, &mut buf)
            }
            Direction::Decap => self.manager.on_rx(self.port, &mut buf),
        };
        local_stats.record(&result);
        local_stats.output_bytes += buf.len() as u64;

        if self.dump_packet {
            println!(
                "{:>5}   {} ({} -> {} bytes)",
                pkt_count,
                pkt.timestamp(),
                pkt.caplen(),
                buf.len()
            );
            match &result {
                Ok(()) => {
                    dump_headers(buf.data());
                }
                Err(e) => println!("        untouched: {e}"),
            }
        }

        // Periodic flush to shared stats
        if local_stats.should_flush(FLUSH_INTERVAL) {
            local_stats.flush(stats);
        }

        buf
    }
}

/// Source address of an `Ethernet [+VLAN] / IPv4` frame
fn client_of(frame: &[u8]) -> Option<Ipv4Addr> {
    let (eth, l3) = EtherHeader::from_bytes(frame).ok()?;
    if eth.inner_type() != EtherProto::IPV4 {
        return None;
    }
    let (ip, _) = Ipv4Header::from_bytes(l3).ok()?;
    Some(ip.src_ip())
}

fn dump_ip(proto: EtherProto, bytes: &[u8]) -> Option<(IpProto, &[u8])> {
    match proto {
        EtherProto::IPV4 => {
            let (ip, rest) = Ipv4Header::from_bytes(bytes).ok()?;
            println!("        {ip}");
            Some((ip.protocol(), rest))
        }
        EtherProto::IPV6 => {
            let (ip, rest) = Ipv6Header::from_bytes(bytes).ok()?;
            println!("        {ip}");
            Some((ip.next_header(), rest))
        }
        _ => None,
    }
}

fn dump_l4(proto: IpProto, bytes: &[u8]) -> Option<&[u8]> {
    if proto == IpProto::UDP {
        let (udp, rest) = UdpHeader::from_bytes(bytes).ok()?;
        println!("        {udp}");
        (udp.dst_port() == GTPV1_U_PORT).then_some(rest)
    } else if proto == IpProto::TCP {
        let (tcp, _) = TcpHeader::from_bytes(bytes).ok()?;
        println!("        {tcp}");
        None
    } else {
        None
    }
}

/// Prints the header stack down to the inner transport header.
fn dump_headers(frame: &[u8]) -> Option<()> {
    let (eth, l3) = EtherHeader::from_bytes(frame).ok()?;
    println!("        {eth}");

    let (proto, l4) = dump_ip(eth.inner_type(), l3)?;
    let gtp_bytes = dump_l4(proto, l4)?;

    let (gtp, inner) = Gtpv1Header::from_bytes(gtp_bytes).ok()?;
    println!("        {gtp}");

    let inner_proto = match inner.first()? >> 4 {
        4 => EtherProto::IPV4,
        _ => EtherProto::IPV6,
    };
    let (proto, l4) = dump_ip(inner_proto, inner)?;
    dump_l4(proto, l4).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Captured(Vec<u8>);

    impl PacketMetadata for Captured {
        fn caplen(&self) -> u32 {
            self.0.len() as u32
        }

        fn data(&self) -> &[u8] {
            &self.0
        }

        fn timestamp(&self) -> crate::packet_metadata::TimestampNsec {
            unreachable!("not dumped")
        }
    }

    fn batch() -> TunnelBatch {
        TunnelBatch::from_json(
            r#"{"attr":[
                {"version":4,"client_ip":167772161,"sip":"192.0.2.1","dip":"192.0.2.2","teid":1},
                {"version":4,"client_ip":167772161,"sip":"192.0.2.1","dip":"192.0.2.3","teid":2},
                {"version":6,"client_ip":167772162,"sip":"2001:db8::1","dip":"2001:db8::2","teid":3}
            ]}"#,
        )
        .unwrap()
    }

    /// Ethernet / IPv4 10.0.0.1 -> 10.0.0.9 / UDP 5000 -> 53, no payload
    fn client_frame(last_octet: u8) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&[
            0x45, 0, 0, 28, 0, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, last_octet, 10, 0, 0, 9,
        ]);
        frame.extend_from_slice(&[0x13, 0x88, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00]);
        frame
    }

    #[test]
    fn test_later_records_update_context() {
        let replay = Replay::new(Direction::Encap, 0, 128, &batch(), false).unwrap();

        let ctx = replay.context_for(&Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        assert_eq!(ctx.teid(), 2);
        assert_eq!(ctx.dst_ipv4(), Ipv4Addr::new(192, 0, 2, 3));

        let ctx6 = replay.context_for(&Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        assert!(ctx6.is_ipv6());
    }

    #[test]
    fn test_encap_then_decap() {
        let stats = Stats::default();
        let mut local = LocalStats::new();
        let frame = client_frame(1);

        let encap = Replay::new(Direction::Encap, 0, 128, &batch(), false).unwrap();
        let out = encap.process_packet(1, &Captured(frame.clone()), &mut local, &stats);
        assert_eq!(out.len(), frame.len() + 36);
        assert_eq!(local.transformed, 1);

        let decap = Replay::new(Direction::Decap, 0, 0, &TunnelBatch::default(), false).unwrap();
        let back = decap.process_packet(2, &Captured(out.data().to_vec()), &mut local, &stats);
        assert_eq!(back.data(), frame.as_slice());
        assert_eq!(local.transformed, 2);
    }

    #[test]
    fn test_unknown_client_is_counted() {
        let stats = Stats::default();
        let mut local = LocalStats::new();
        let replay = Replay::new(Direction::Encap, 0, 128, &batch(), false).unwrap();

        let out = replay.process_packet(1, &Captured(client_frame(77)), &mut local, &stats);
        assert_eq!(out.len(), client_frame(77).len());
        assert_eq!(local.no_context, 1);
    }
}
