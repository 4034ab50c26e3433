//! Server list ping
//!
//! Asks a server for its status JSON and decides whether its protocol
//! version is one the join flow can speak.

use crate::error::ProbeError;
use crate::network::packet::{self, PacketReader, STATUS_ID};
use crate::network::transport::FramedTransport;
use crate::network::version::{GameVersion, VersionCatalog};
use crate::utils::address_table::Endpoint;
use crate::ScanError;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

/// Protocol number announced in the status handshake. Servers answer a
/// status request regardless of the client's version.
pub const STATUS_PROTOCOL: i32 = 0;

/// Result of asking an endpoint for its version
#[derive(Debug)]
pub enum ProbeVerdict {
    Supported(GameVersion),
    Unsupported(ProbeError),
    Unreachable(ScanError),
}

impl ProbeVerdict {
    pub fn is_supported(&self) -> bool {
        matches!(self, ProbeVerdict::Supported(_))
    }
}

#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe_version(&self, endpoint: Endpoint) -> ProbeVerdict;
}

/// Parsed status reply
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    raw: Value,
}

impl ServerStatus {
    /// Parse a status payload: `[packet id varint][json string]`
    pub fn from_payload(payload: Bytes) -> Result<Self, ProbeError> {
        let mut reader = PacketReader::new(payload);
        let id = reader
            .varint()
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;
        if id != STATUS_ID {
            return Err(ProbeError::UnexpectedPacket(id));
        }
        let json = reader
            .string()
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        let raw = serde_json::from_str(json).map_err(|e| ProbeError::Malformed(e.to_string()))?;
        Ok(Self { raw })
    }

    /// `version.protocol` as reported by the server
    pub fn protocol(&self) -> Result<i64, ProbeError> {
        let protocol = self
            .raw
            .get("version")
            .and_then(|v| v.get("protocol"))
            .ok_or(ProbeError::MissingProtocol)?;
        match protocol {
            Value::Number(n) => n.as_i64().ok_or(ProbeError::NonNumericProtocol),
            Value::Null => Err(ProbeError::MissingProtocol),
            _ => Err(ProbeError::NonNumericProtocol),
        }
    }

    /// Self-reported version name, often a proxy brand
    pub fn version_name(&self) -> Option<&str> {
        self.raw.get("version")?.get("name")?.as_str()
    }

    /// `(online, max)` player counts
    pub fn players(&self) -> Option<(i64, i64)> {
        let players = self.raw.get("players")?;
        Some((players.get("online")?.as_i64()?, players.get("max")?.as_i64()?))
    }

    /// Description flattened to plain text
    pub fn motd(&self) -> String {
        let mut out = String::new();
        if let Some(description) = self.raw.get("description") {
            flatten_text(description, &mut out);
        }
        out
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

fn flatten_text(component: &Value, out: &mut String) {
    match component {
        Value::String(s) => out.push_str(s),
        Value::Array(parts) => parts.iter().for_each(|p| flatten_text(p, out)),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(extra) = map.get("extra") {
                flatten_text(extra, out);
            }
        }
        _ => {}
    }
}

/// Status probe over the framed transport
pub struct StatusProber {
    transport: FramedTransport,
    catalog: Arc<dyn VersionCatalog>,
}

impl StatusProber {
    pub fn new(transport: FramedTransport, catalog: Arc<dyn VersionCatalog>) -> Self {
        Self { transport, catalog }
    }

    /// Fetch and parse the status reply
    pub async fn probe(&self, endpoint: Endpoint) -> crate::Result<ServerStatus> {
        let host = endpoint.address.to_string();
        let ping = packet::status_ping(STATUS_PROTOCOL, &host, endpoint.port);
        let payload = self.transport.send(endpoint.ip(), endpoint.port, &ping).await?;
        Ok(ServerStatus::from_payload(payload)?)
    }

    /// Map a status reply to a joinable version
    pub fn resolve_version(&self, status: &ServerStatus) -> Result<GameVersion, ProbeError> {
        let protocol = status.protocol()?;
        let name = self
            .catalog
            .lookup_game_version(protocol)
            .ok_or(ProbeError::UnknownProtocol(protocol))?;
        if !self.catalog.is_supported(&name) {
            return Err(ProbeError::UnsupportedVersion(name));
        }
        // catalogue entries are all valid i32 protocol numbers
        let protocol = i32::try_from(protocol).map_err(|_| ProbeError::UnknownProtocol(protocol))?;
        Ok(GameVersion::new(name, protocol))
    }
}

#[async_trait]
impl StatusProbe for StatusProber {
    async fn probe_version(&self, endpoint: Endpoint) -> ProbeVerdict {
        let status = match self.probe(endpoint).await {
            Ok(status) => status,
            Err(ScanError::Probe(reason)) => return ProbeVerdict::Unsupported(reason),
            Err(e) => return ProbeVerdict::Unreachable(e),
        };

        log::debug!(
            "{} status: {} players={:?} motd={:?}",
            endpoint,
            status.version_name().unwrap_or("?"),
            status.players(),
            status.motd()
        );

        match self.resolve_version(&status) {
            Ok(version) => ProbeVerdict::Supported(version),
            Err(reason) => ProbeVerdict::Unsupported(reason),
        }
    }
}
