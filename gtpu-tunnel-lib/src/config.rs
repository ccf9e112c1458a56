//! Tunnel configuration records
//!
//! The control channel sends a batch of per-client tunnel entries:
//!
//! ```json
//! { "attr": [
//!     { "version": 4, "client_ip": 167772161, "sip": "1.1.1.1", "dip": "2.2.2.2", "teid": 100 }
//! ] }
//! ```
//!
//! Each [`TunnelSpec`] is decoded into a [`TunnelRecord`] whose endpoints are
//! already parsed for the declared address family.
//!
//! ```
//! use gtpu_tunnel::config::TunnelBatch;
//! use gtpu_tunnel::context::AddressFamily;
//!
//! let batch = TunnelBatch::from_json(
//!     r#"{"attr":[{"version":6,"client_ip":1,"sip":"2001:db8::1","dip":"2001:db8::2","teid":5}]}"#,
//! ).unwrap();
//! let records = batch.records().unwrap();
//! assert_eq!(records[0].endpoints.family(), AddressFamily::Ipv6);
//! ```

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::TunnelEndpoints;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported IP version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("malformed tunnel batch: {0}")]
    Json(#[from] serde_json::Error),
}

/// One tunnel entry as sent on the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSpec {
    pub version: u32,
    pub client_ip: u32,
    pub sip: String,
    pub dip: String,
    pub teid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelBatch {
    pub attr: Vec<TunnelSpec>,
}

/// A decoded tunnel entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelRecord {
    pub teid: u32,
    pub client_ip: u32,
    pub endpoints: TunnelEndpoints,
}

impl TunnelRecord {
    /// The client address as an IPv4 address
    #[inline]
    pub fn client_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.client_ip)
    }
}

impl TunnelSpec {
    pub fn to_record(&self) -> Result<TunnelRecord, ConfigError> {
        let endpoints = match self.version {
            4 => TunnelEndpoints::V4 {
                src: parse_addr("sip", &self.sip)?,
                dst: parse_addr("dip", &self.dip)?,
            },
            6 => TunnelEndpoints::V6 {
                src: parse_addr("sip", &self.sip)?,
                dst: parse_addr("dip", &self.dip)?,
            },
            v => return Err(ConfigError::UnsupportedVersion(v)),
        };

        Ok(TunnelRecord {
            teid: self.teid,
            client_ip: self.client_ip,
            endpoints,
        })
    }
}

fn parse_addr<A>(field: &'static str, value: &str) -> Result<A, ConfigError>
where
    A: std::str::FromStr,
{
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

impl TunnelBatch {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Decodes every entry; the first bad entry fails the whole batch.
    pub fn records(&self) -> Result<Vec<TunnelRecord>, ConfigError> {
        self.attr.iter().map(TunnelSpec::to_record).collect()
    }
}

impl From<TunnelRecord> for TunnelSpec {
    fn from(record: TunnelRecord) -> Self {
        let (version, sip, dip) = match record.endpoints {
            TunnelEndpoints::V4 { src, dst } => (4, IpAddr::V4(src), IpAddr::V4(dst)),
            TunnelEndpoints::V6 { src, dst } => (6, IpAddr::V6(src), IpAddr::V6(dst)),
        };
        TunnelSpec {
            version,
            client_ip: record.client_ip,
            sip: sip.to_string(),
            dip: dip.to_string(),
            teid: record.teid,
        }
    }
}

/// Data-plane switches that must be set while tunnels are active.
///
/// Hardware segmentation and receive offloads assume plain headers and would
/// produce wrong checksums on tunnelled frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataplaneOptions {
    pub tso_offload_disable: bool,
    pub lro_offload_disable: bool,
    pub force_software_mode: bool,
}

impl DataplaneOptions {
    /// The settings GTP-U encapsulation requires
    pub const fn for_tunnels() -> Self {
        DataplaneOptions {
            tso_offload_disable: true,
            lro_offload_disable: true,
            force_software_mode: true,
        }
    }

    /// True when every switch set in `required` is also set here
    pub fn satisfies(&self, required: &DataplaneOptions) -> bool {
        (self.tso_offload_disable || !required.tso_offload_disable)
            && (self.lro_offload_disable || !required.lro_offload_disable)
            && (self.force_software_mode || !required.force_software_mode)
    }
}
