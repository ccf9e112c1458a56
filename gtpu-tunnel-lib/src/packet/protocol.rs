//! EtherType and IP protocol numbers
//!
//! Only the numbers the tunnel engine inspects or writes are named here;
//! any other value still round-trips and prints as hex.
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::protocol::{EtherProto, IpProto};
//!
//! assert_eq!(format!("{}", IpProto::UDP), "udp");
//! assert_eq!(format!("{}", IpProto::IPV6_ICMP), "ipv6-icmp");
//! assert_eq!(format!("{}", IpProto::from(200)), "0xc8");
//!
//! let value: u16 = EtherProto::IPV6.into();
//! assert_eq!(value, 0x86DD);
//! assert!(!IpProto::from(200).is_known());
//! ```

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16};

crate::protocol_constants! {
    EtherProto, U16<BigEndian>, u16:
        IPV4 = 0x0800;
        ARP = 0x0806;
        RARP = 0x8035;
        VLAN_8021Q = 0x8100;
        IPV6 = 0x86DD;
        MPLS_UC = 0x8847;
        VLAN_8021AD = 0x88A8;
}

crate::protocol_constants! {
    IpProto, u8, u8:
        IPV6_HOPOPT = 0;
        ICMP = 1;
        IP_ENCAP = 4;
        TCP = 6;
        UDP = 17;
        IPV6 = 41;
        IPV6_ROUTE = 43;
        IPV6_FRAG = 44;
        GRE = 47;
        IPV6_ICMP = 58;
        IPV6_NONXT = 59;
        IPV6_OPTS = 60;
        SCTP = 132;
}

impl EtherProto {
    /// Returns true for the two network protocols a GTP-U tunnel can carry
    #[inline]
    pub fn is_ip(&self) -> bool {
        *self == EtherProto::IPV4 || *self == EtherProto::IPV6
    }
}

impl IpProto {
    /// Returns true for transport protocols whose checksum covers a pseudo-header
    #[inline]
    pub fn is_udp_or_tcp(&self) -> bool {
        *self == IpProto::UDP || *self == IpProto::TCP
    }
}
