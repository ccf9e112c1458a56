//! Egress transform: wrap `Ethernet [+VLAN] / IP / UDP|TCP` in
//! `IP / UDP / GTP-U`.
//!
//! ```text
//! before:              [eth][vlan?][inner ip][l4 ...]
//! after:   [eth][vlan?][outer ip][udp][gtp-u][inner ip][l4 ...]
//!          |<-- encapsulation_len -->|
//! ```
//!
//! The link header moves to the new front of the frame; the outer stack is
//! the context template patched with lengths and checksums.
//!
//! The outer UDP checksum is derived from the inner one instead of summing
//! the whole inner packet. A valid inner L4 segment sums to the complement
//! of its pseudo-header sum `P_in`, so
//!
//! ```text
//! csum = ~fold(P_out + sum(outer udp .. inner l4) + ~fold(P_in))
//! ```
//!
//! which only touches the outer UDP and GTP-U headers and the inner IP
//! header. The result equals a full recomputation as long as the inner
//! transport checksum is correct.
//!
//! Inner UDP without a checksum (zero) has no such invariant: over IPv4 the
//! outer checksum is left at zero as well, over IPv6 the whole datagram is
//! summed.

use crate::context::{AddressFamily, GtpuContext, UDP_HLEN};
use crate::error::TunnelError;
use crate::mbuf::PacketBuf;
use crate::packet::checksum;
use crate::packet::ether::{Ether8021qHeader, EthAddr, EtherHeader};
use crate::packet::ipv4::Ipv4Header;
use crate::packet::ipv6::{Ipv6Header, IPV6_HLEN};
use crate::packet::protocol::{EtherProto, IpProto};
use crate::packet::tcp::TcpHeader;
use crate::packet::tunnel::gtpv1::{Gtpv1Header, GTPV1_HLEN};
use crate::packet::udp::{UdpHeader, UDP_CHECKSUM_OFFSET};
use crate::packet::{HeaderParser, PacketHeaderError};

/// What the egress path needs to know about the original frame
#[derive(Debug, Clone, Copy)]
struct InnerLayout {
    dest: EthAddr,
    source: EthAddr,
    vlan_tci: Option<u16>,
    l2_len: usize,
    ip_hlen: usize,
    src_port: u16,
    /// inner UDP datagram sent without a checksum
    no_l4_checksum: bool,
    /// folded inner pseudo-header sum
    pseudo: u16,
}

impl InnerLayout {
    fn parse(frame: &[u8]) -> Result<Self, TunnelError> {
        let (eth, l3) = EtherHeader::from_bytes(frame)?;

        let (ip_hlen, proto, pseudo, l4) = match eth.inner_type() {
            EtherProto::IPV4 => {
                let (ip, l4) = Ipv4Header::from_bytes(l3)?;
                let l4_len = ip.payload_len() as u16;
                (ip.header_len(), ip.protocol(), ip.pseudo_header_sum(l4_len), l4)
            }
            EtherProto::IPV6 => {
                let (ip, l4) = Ipv6Header::from_bytes(l3)?;
                let l4_len = ip.payload_length() as u32;
                (IPV6_HLEN, ip.next_header(), ip.pseudo_header_sum(l4_len), l4)
            }
            other => return Err(TunnelError::UnsupportedL3(other)),
        };

        let (src_port, no_l4_checksum) = match proto {
            IpProto::UDP => {
                let (udp, _) = UdpHeader::from_bytes(l4)?;
                (udp.src_port(), udp.checksum() == 0)
            }
            IpProto::TCP => (TcpHeader::from_bytes(l4)?.0.src_port(), false),
            other => return Err(TunnelError::UnsupportedL4(other)),
        };

        Ok(InnerLayout {
            dest: *eth.dest(),
            source: *eth.source(),
            vlan_tci: eth.vlan().map(|vlan| vlan.tci()),
            l2_len: eth.header_len(),
            ip_hlen,
            src_port,
            no_l4_checksum,
            pseudo: checksum::fold(pseudo),
        })
    }
}

/// Encapsulates `pkt` with the outer headers of `ctx`.
///
/// Every check runs before the buffer is touched, so on error the frame is
/// exactly as it was.
///
/// The outer UDP checksum is derived from the inner transport checksum,
/// which must be valid (or zero for UDP); a corrupt inner checksum carries
/// over into the outer one.
pub fn encapsulate<C>(ctx: &GtpuContext, pkt: &mut PacketBuf<C>) -> Result<(), TunnelError> {
    if !pkt.has_storage() {
        return Err(TunnelError::NoStorage);
    }

    let layout = InnerLayout::parse(pkt.data())?;

    let family = ctx.family();
    let encap_len = family.encapsulation_len();
    if pkt.headroom() < encap_len {
        return Err(TunnelError::InsufficientHeadroom {
            needed: encap_len,
            available: pkt.headroom(),
        });
    }

    let outer_ip_len = pkt.len() + encap_len - layout.l2_len;
    // IPv4 carries the total length, IPv6 the payload length only
    let length_field = match family {
        AddressFamily::Ipv4 => outer_ip_len,
        AddressFamily::Ipv6 => outer_ip_len - family.ip_header_len(),
    };
    if length_field > u16::MAX as usize {
        return Err(PacketHeaderError::Other("frame too large for the outer IP header").into());
    }

    pkt.prepend(encap_len)?.fill(0);
    write_outer(ctx, &layout, pkt.data_mut(), outer_ip_len)
}

fn write_outer(
    ctx: &GtpuContext,
    layout: &InnerLayout,
    frame: &mut [u8],
    outer_ip_len: usize,
) -> Result<(), TunnelError> {
    let family = ctx.family();
    let encap_len = family.encapsulation_len();
    let ip_len = family.ip_header_len();
    let udp_len = outer_ip_len - ip_len;

    let outer_proto = match family {
        AddressFamily::Ipv4 => EtherProto::IPV4,
        AddressFamily::Ipv6 => EtherProto::IPV6,
    };

    let (l2, outer) = frame.split_at_mut(layout.l2_len);

    // the original link header sits right after the new region and gets
    // overwritten by the template below
    let (eth, vlan_bytes) = EtherHeader::from_bytes_mut(l2)?;
    eth.set_dest(layout.dest);
    eth.set_source(layout.source);
    match layout.vlan_tci {
        Some(tci) => {
            eth.set_protocol(EtherProto::VLAN_8021Q);
            let (vlan, _) = Ether8021qHeader::from_bytes_mut(vlan_bytes)?;
            vlan.set_tci(tci);
            vlan.set_protocol(outer_proto);
        }
        None => eth.set_protocol(outer_proto),
    }

    outer[..encap_len].copy_from_slice(ctx.outer_hdr());

    let (ip_bytes, udp_bytes) = outer.split_at_mut(ip_len);
    let pseudo_out = match family {
        AddressFamily::Ipv4 => {
            let (ip, _) = Ipv4Header::from_bytes_mut(ip_bytes)?;
            ip.set_total_length(outer_ip_len as u16);
            ip.update_checksum();
            ip.pseudo_header_sum(udp_len as u16)
        }
        AddressFamily::Ipv6 => {
            let (ip, _) = Ipv6Header::from_bytes_mut(ip_bytes)?;
            ip.set_payload_length(udp_len as u16);
            ip.pseudo_header_sum(udp_len as u32)
        }
    };

    {
        let (udp, gtp_bytes) = UdpHeader::from_bytes_mut(udp_bytes)?;
        udp.set_src_port(layout.src_port);
        udp.set_length(udp_len as u16);
        let (gtp, _) = Gtpv1Header::from_bytes_mut(gtp_bytes)?;
        gtp.set_length((udp_len - UDP_HLEN - GTPV1_HLEN) as u16);
    }

    let csum = match (layout.no_l4_checksum, family) {
        (true, AddressFamily::Ipv4) => 0,
        (true, AddressFamily::Ipv6) => {
            checksum::transport_finish(checksum::sum_words(pseudo_out, udp_bytes))
        }
        (false, _) => {
            // outer UDP header, GTP-U header and inner IP header
            let covered = UDP_HLEN + GTPV1_HLEN + layout.ip_hlen;
            let sum = checksum::sum_words(pseudo_out, &udp_bytes[..covered]);
            let sum = checksum::sum_words(sum, &(!layout.pseudo).to_be_bytes());
            checksum::transport_finish(sum)
        }
    };
    udp_bytes[UDP_CHECKSUM_OFFSET..UDP_CHECKSUM_OFFSET + 2].copy_from_slice(&csum.to_be_bytes());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtpu::frames::*;
    use crate::packet::ether::VLAN_TAG_LEN;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ctx4() -> GtpuContext {
        GtpuContext::new_ipv4(
            0x11223344,
            Ipv4Addr::new(172, 16, 0, 1),
            Ipv4Addr::new(172, 16, 0, 2),
        )
    }

    fn ctx6() -> GtpuContext {
        GtpuContext::new_ipv6(
            0x55667788,
            "2001:db8:1::1".parse().unwrap(),
            "2001:db8:2::2".parse().unwrap(),
        )
    }

    #[test]
    fn test_encap_ipv4_udp_layout() {
        let frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"hello gtp");
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);

        encapsulate(&ctx4(), &mut pkt).unwrap();

        let out = pkt.data();
        assert_eq!(out.len(), frame.len() + 36);
        assert_eq!(pkt.headroom(), 64 - 36);
        // link header moved to the front
        assert_eq!(&out[..12], &frame[..12]);
        assert_eq!(&out[12..14], &[0x08, 0x00]);

        let (ip, rest) = Ipv4Header::from_bytes(&out[14..]).unwrap();
        assert_eq!(ip.total_length(), out.len() - 14);
        assert_eq!(ip.ttl(), 64);
        assert_eq!(ip.protocol(), IpProto::UDP);
        assert_eq!(ip.src_ip(), Ipv4Addr::new(172, 16, 0, 1));
        assert!(Ipv4Header::verify_checksum(&out[14..34]));

        let (udp, rest) = UdpHeader::from_bytes(rest).unwrap();
        assert_eq!(udp.src_port(), INNER_SRC_PORT);
        assert_eq!(udp.dst_port(), 2152);
        assert_eq!(udp.length() as usize, out.len() - 34);

        let (gtp, inner) = Gtpv1Header::from_bytes(rest).unwrap();
        assert!(gtp.is_gpdu());
        assert_eq!(gtp.teid(), 0x11223344);
        assert_eq!(gtp.length() as usize, udp.length() as usize - 16);

        // inner packet untouched
        assert_eq!(inner, &frame[14..]);
    }

    #[test]
    fn test_encap_ipv6_outer_layout() {
        let frame = build_frame(None, InnerIp::V4, IpProto::TCP, b"segment");
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);

        encapsulate(&ctx6(), &mut pkt).unwrap();

        let out = pkt.data();
        assert_eq!(out.len(), frame.len() + 56);
        assert_eq!(&out[12..14], &[0x86, 0xdd]);

        let (ip, rest) = Ipv6Header::from_bytes(&out[14..]).unwrap();
        assert_eq!(ip.payload_length(), out.len() - 14 - 40);
        assert_eq!(ip.hop_limit(), 255);
        assert_eq!(ip.dst_ip(), "2001:db8:2::2".parse::<Ipv6Addr>().unwrap());

        let (udp, rest) = UdpHeader::from_bytes(rest).unwrap();
        assert_eq!(udp.length() as usize, ip.payload_length());
        assert_eq!(udp.src_port(), INNER_SRC_PORT);

        let (gtp, inner) = Gtpv1Header::from_bytes(rest).unwrap();
        assert_eq!(gtp.teid(), 0x55667788);
        assert_eq!(inner, &frame[14..]);
    }

    #[test]
    fn test_encap_vlan_tag_reproduced() {
        let frame = build_frame(Some(0x6064), InnerIp::V6, IpProto::UDP, b"v6 inside");
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);

        encapsulate(&ctx4(), &mut pkt).unwrap();

        let out = pkt.data();
        let (eth, rest) = EtherHeader::from_bytes(out).unwrap();
        assert_eq!(eth.protocol(), EtherProto::VLAN_8021Q);
        assert_eq!(eth.vlan().unwrap().tci(), 0x6064);
        assert_eq!(eth.inner_type(), EtherProto::IPV4);
        assert_eq!(eth.header_len(), 14 + VLAN_TAG_LEN);

        let (ip, _) = Ipv4Header::from_bytes(rest).unwrap();
        assert_eq!(ip.total_length(), out.len() - 18);
        assert_eq!(&out[18 + 36..], &frame[18..]);
    }

    #[test]
    fn test_encap_checksum_matches_full_recompute() {
        let cases = [
            (None, InnerIp::V4, IpProto::UDP),
            (None, InnerIp::V4, IpProto::TCP),
            (None, InnerIp::V6, IpProto::UDP),
            (Some(0x0123), InnerIp::V6, IpProto::TCP),
            (Some(0x0fff), InnerIp::V4Options, IpProto::UDP),
        ];
        let payloads: [&[u8]; 3] = [b"", b"odd", b"an even payload!"];

        for (vlan, inner, proto) in cases {
            for payload in payloads {
                for ctx in [ctx4(), ctx6()] {
                    let frame = build_frame(vlan, inner, proto, payload);
                    let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(128, &frame);
                    encapsulate(&ctx, &mut pkt).unwrap();

                    let l2_len = if vlan.is_some() { 18 } else { 14 };
                    let (written, expected) = outer_udp_checksums(pkt.data(), l2_len);
                    assert_eq!(
                        written, expected,
                        "vlan={:?} inner={:?} proto={} payload={:?} family={}",
                        vlan,
                        inner,
                        proto,
                        payload,
                        ctx.family()
                    );
                }
            }
        }
    }

    #[test]
    fn test_encap_insufficient_headroom_untouched() {
        let frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"payload");

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(35, &frame);
        let err = encapsulate(&ctx4(), &mut pkt).unwrap_err();
        assert_eq!(
            err,
            TunnelError::InsufficientHeadroom {
                needed: 36,
                available: 35
            }
        );
        assert_eq!(pkt.data(), frame.as_slice());
        assert_eq!(pkt.headroom(), 35);

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(55, &frame);
        assert!(matches!(
            encapsulate(&ctx6(), &mut pkt),
            Err(TunnelError::InsufficientHeadroom { needed: 56, .. })
        ));
        assert_eq!(pkt.data(), frame.as_slice());

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(36, &frame);
        assert!(encapsulate(&ctx4(), &mut pkt).is_ok());
        assert_eq!(pkt.headroom(), 0);
    }

    #[test]
    fn test_encap_rejects_unsupported_l3() {
        let mut frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"");
        frame[12..14].copy_from_slice(&[0x08, 0x06]);
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);

        assert_eq!(
            encapsulate(&ctx4(), &mut pkt).unwrap_err(),
            TunnelError::UnsupportedL3(EtherProto::ARP)
        );
        assert_eq!(pkt.data(), frame.as_slice());
    }

    #[test]
    fn test_encap_rejects_unsupported_l4() {
        let frame = build_frame(None, InnerIp::V4, IpProto::ICMP, b"ping");
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);

        assert_eq!(
            encapsulate(&ctx4(), &mut pkt).unwrap_err(),
            TunnelError::UnsupportedL4(IpProto::ICMP)
        );
        assert_eq!(pkt.data(), frame.as_slice());
    }

    #[test]
    fn test_encap_truncated_l4_is_malformed() {
        let mut frame = build_frame(None, InnerIp::V4, IpProto::TCP, b"");
        frame.truncate(14 + 20 + 10);
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);

        assert_eq!(
            encapsulate(&ctx4(), &mut pkt).unwrap_err(),
            TunnelError::Malformed(PacketHeaderError::TooShort("TcpHeader"))
        );
    }

    #[test]
    fn test_encap_parse_errors_win_over_headroom() {
        let frame = build_frame(None, InnerIp::V4, IpProto::ICMP, b"");
        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(0, &frame);
        assert_eq!(
            encapsulate(&ctx4(), &mut pkt).unwrap_err(),
            TunnelError::UnsupportedL4(IpProto::ICMP)
        );
    }

    /// Largest UDP payload whose frame still fits the outer length field
    const MAX_IPV4_OUTER_PAYLOAD: usize = 65535 - 36 - 20 - 8;
    const MAX_IPV6_OUTER_PAYLOAD: usize = 65535 - 16 - 40 - 8;

    #[test]
    fn test_encap_length_limits() {
        let cases = [
            (ctx4(), InnerIp::V4, MAX_IPV4_OUTER_PAYLOAD),
            (ctx6(), InnerIp::V6, MAX_IPV6_OUTER_PAYLOAD),
        ];

        for (ctx, inner, max_payload) in cases {
            let payload = vec![0x5a; max_payload];
            let frame = build_frame(None, inner, IpProto::UDP, &payload);
            let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);
            encapsulate(&ctx, &mut pkt).unwrap();

            let out = pkt.data();
            let ip_len_field = u16::from_be_bytes(match ctx.family() {
                AddressFamily::Ipv4 => [out[16], out[17]],
                AddressFamily::Ipv6 => [out[18], out[19]],
            });
            assert_eq!(ip_len_field, u16::MAX);
            let (written, expected) = outer_udp_checksums(out, 14);
            assert_eq!(written, expected);

            let payload = vec![0x5a; max_payload + 1];
            let frame = build_frame(None, inner, IpProto::UDP, &payload);
            let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);
            assert_eq!(
                encapsulate(&ctx, &mut pkt).unwrap_err(),
                TunnelError::Malformed(PacketHeaderError::Other(
                    "frame too large for the outer IP header"
                ))
            );
            assert_eq!(pkt.data(), frame.as_slice());
            assert_eq!(pkt.headroom(), 64);
        }
    }

    #[test]
    fn test_encap_ipv6_outer_takes_frames_ipv4_cannot() {
        let payload = vec![0xa5; MAX_IPV4_OUTER_PAYLOAD + 1];
        let frame = build_frame(None, InnerIp::V4, IpProto::UDP, &payload);

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);
        assert!(encapsulate(&ctx4(), &mut pkt).is_err());

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);
        encapsulate(&ctx6(), &mut pkt).unwrap();
        assert_eq!(pkt.len(), frame.len() + 56);
    }

    #[test]
    fn test_encap_inner_udp_without_checksum() {
        let mut frame = build_frame(None, InnerIp::V4, IpProto::UDP, b"no checksum here");
        // inner UDP checksum after eth(14) + ip(20) + ports and length(6)
        frame[14 + 20 + 6..14 + 20 + 8].fill(0);

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);
        encapsulate(&ctx4(), &mut pkt).unwrap();
        let (written, _) = outer_udp_checksums(pkt.data(), 14);
        assert_eq!(written, 0);

        let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(64, &frame);
        encapsulate(&ctx6(), &mut pkt).unwrap();
        let (written, expected) = outer_udp_checksums(pkt.data(), 14);
        assert_ne!(written, 0);
        assert_eq!(written, expected);
    }

    #[test]
    fn test_encap_no_storage() {
        let mut pkt: PacketBuf<()> = PacketBuf::new(0, 0);
        assert_eq!(
            encapsulate(&ctx4(), &mut pkt).unwrap_err(),
            TunnelError::NoStorage
        );
    }
}
