//! Ingress transform: strip `IP / UDP / GTP-U` and rebuild the link header
//! in front of the inner packet.
//!
//! Detection is purely header based (UDP destination port 2152 and a G-PDU
//! message type), so it works without any per-flow state. Anything that does
//! not look like a tunnel is reported and left alone.

use crate::context::{AddressFamily, ENCAPSULATION_LEN};
use crate::error::TunnelError;
use crate::mbuf::PacketBuf;
use crate::packet::ether::{Ether8021qHeader, EthAddr, EtherHeader};
use crate::packet::ipv4::Ipv4Header;
use crate::packet::ipv6::Ipv6Header;
use crate::packet::protocol::{EtherProto, IpProto};
use crate::packet::tunnel::gtpv1::{Gtpv1Header, GTPV1_U_PORT};
use crate::packet::udp::UdpHeader;
use crate::packet::{HeaderParser, PacketHeaderError};

use zerocopy::FromBytes;

/// Link header of the tunnelled frame, kept across the trim
#[derive(Debug, Clone, Copy)]
struct OuterLink {
    dest: EthAddr,
    source: EthAddr,
    vlan_tci: Option<u16>,
}

/// Removes the GTP-U encapsulation from `pkt`.
///
/// All validation happens before the frame is trimmed; on error the buffer
/// is unchanged.
pub fn decapsulate<C>(pkt: &mut PacketBuf<C>) -> Result<(), TunnelError> {
    if !pkt.has_storage() {
        return Err(TunnelError::NoStorage);
    }
    if pkt.len() < ENCAPSULATION_LEN {
        return Err(TunnelError::TooShort {
            needed: ENCAPSULATION_LEN,
            available: pkt.len(),
        });
    }

    let (link, family, inner_version) = validate(pkt.data())?;

    pkt.adj(family.encapsulation_len())?;

    let inner_proto = if inner_version == 4 {
        EtherProto::IPV4
    } else {
        EtherProto::IPV6
    };

    let (eth, vlan_bytes) = EtherHeader::from_bytes_mut(pkt.data_mut())?;
    eth.set_dest(link.dest);
    eth.set_source(link.source);
    match link.vlan_tci {
        Some(tci) => {
            eth.set_protocol(EtherProto::VLAN_8021Q);
            let (vlan, _) = Ether8021qHeader::from_bytes_mut(vlan_bytes)?;
            vlan.set_tci(tci);
            vlan.set_protocol(inner_proto);
        }
        None => eth.set_protocol(inner_proto),
    }

    Ok(())
}

/// Checks that `frame` is a GTP-U G-PDU and returns the link header, the
/// outer family and the inner IP version nibble.
fn validate(frame: &[u8]) -> Result<(OuterLink, AddressFamily, u8), TunnelError> {
    let (eth, l3) = EtherHeader::from_bytes(frame)?;

    if eth.protocol() == EtherProto::ARP {
        return Err(TunnelError::Arp);
    }

    let family = match eth.inner_type() {
        EtherProto::IPV4 => AddressFamily::Ipv4,
        EtherProto::IPV6 => AddressFamily::Ipv6,
        other => return Err(TunnelError::UnsupportedL3(other)),
    };

    let encap_len = family.encapsulation_len();
    if frame.len() < encap_len {
        return Err(TunnelError::TooShort {
            needed: encap_len,
            available: frame.len(),
        });
    }

    let udp_bytes = match family {
        AddressFamily::Ipv4 => {
            let (ip, rest) = Ipv4Header::from_bytes(l3)?;
            // the strip length assumes an option-less outer header
            if ip.protocol() != IpProto::UDP || ip.has_options() {
                return Err(TunnelError::NotTunnel);
            }
            rest
        }
        AddressFamily::Ipv6 => {
            let (ip, rest) = Ipv6Header::from_bytes(l3)?;
            if ip.next_header() != IpProto::UDP {
                return Err(TunnelError::NotTunnel);
            }
            rest
        }
    };

    let (udp, gtp_bytes) = UdpHeader::from_bytes(udp_bytes)?;
    if udp.dst_port() != GTPV1_U_PORT {
        return Err(TunnelError::NotTunnel);
    }

    let (gtp, _) = <Gtpv1Header as FromBytes>::ref_from_prefix(gtp_bytes)
        .map_err(|_| PacketHeaderError::TooShort("Gtpv1Header"))?;
    if !gtp.is_gpdu() {
        return Err(TunnelError::NotTunnel);
    }

    let inner_offset = eth.header_len() + encap_len;
    let inner_version = frame
        .get(inner_offset)
        .map(|b| b >> 4)
        .ok_or(TunnelError::TooShort {
            needed: inner_offset + 1,
            available: frame.len(),
        })?;

    let link = OuterLink {
        dest: *eth.dest(),
        source: *eth.source(),
        vlan_tci: eth.vlan().map(|vlan| vlan.tci()),
    };

    Ok((link, family, inner_version))
}
