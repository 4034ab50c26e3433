//! Verdict persistence
//!
//! Verdicts are keyed by the endpoint re-based into signed integer ranges:
//! the dotted-quad address minus 2^31 and the port minus 2^15. The sweep
//! only ever writes resolved verdicts; rows are never deleted here.

pub mod memory;
pub mod sqlite;

use crate::utils::address_table::Endpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub use memory::MemoryVerdictStore;
pub use sqlite::SqliteVerdictStore;

/// Bias subtracted from the unsigned address
pub const ADDRESS_BIAS: i64 = 2_147_483_648;
/// Bias subtracted from the port
pub const PORT_BIAS: i32 = 32_768;

pub fn encode_address(address: Ipv4Addr) -> i32 {
    (u32::from(address) as i64 - ADDRESS_BIAS) as i32
}

pub fn decode_address(encoded: i32) -> Ipv4Addr {
    Ipv4Addr::from((encoded as i64 + ADDRESS_BIAS) as u32)
}

pub fn encode_port(port: u16) -> i16 {
    (port as i32 - PORT_BIAS) as i16
}

pub fn decode_port(encoded: i16) -> u16 {
    (encoded as i32 + PORT_BIAS) as u16
}

/// Storage key of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub ip: i32,
    pub port: i16,
}

impl From<Endpoint> for EndpointKey {
    fn from(endpoint: Endpoint) -> Self {
        Self {
            ip: encode_address(endpoint.address),
            port: encode_port(endpoint.port),
        }
    }
}

impl From<EndpointKey> for Endpoint {
    fn from(key: EndpointKey) -> Self {
        Endpoint::new(decode_address(key.ip), decode_port(key.port))
    }
}

/// Persisted whitelist state of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub endpoint: Endpoint,
    pub whitelisted: Option<bool>,
}

impl VerdictRecord {
    pub fn new(endpoint: Endpoint, whitelisted: Option<bool>) -> Self {
        Self {
            endpoint,
            whitelisted,
        }
    }

    pub fn key(&self) -> EndpointKey {
        self.endpoint.into()
    }
}

/// Destination for resolved verdicts
#[async_trait]
pub trait VerdictStore: Send + Sync {
    /// Write a verdict and return how many rows it touched
    async fn record(&self, record: &VerdictRecord) -> crate::Result<usize>;
}
