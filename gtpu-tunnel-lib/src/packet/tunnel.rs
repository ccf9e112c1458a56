//! Tunnel protocol headers
//!
//! | Protocol | Module | Description |
//! |----------|--------|-------------|
//! | [GTPv1-U](gtpv1) | `gtpv1` | GPRS Tunneling Protocol v1 User Plane (3GPP TS 29.281) - UDP port 2152 |

pub mod gtpv1;
