//! Error handling for the whitelist scanner
//!
//! Every failure in the sweep is recoverable at the level of a single
//! endpoint. The types here let callers tell transport failures (skip the
//! endpoint) apart from probe failures (skip silently) and configuration or
//! storage failures (surface to the operator).

use std::time::Duration;
use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Reasons a status reply cannot be turned into a joinable game version.
///
/// None of these are failures of the sweep; the endpoint is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("status reply has no protocol version")]
    MissingProtocol,

    #[error("status reply protocol version is not a number")]
    NonNumericProtocol,

    #[error("protocol {0} does not map to a known game version")]
    UnknownProtocol(i64),

    #[error("game version {0} is not supported")]
    UnsupportedVersion(String),

    #[error("unexpected status packet id {0:#04x}")]
    UnexpectedPacket(i32),

    #[error("malformed status reply: {0}")]
    Malformed(String),
}

impl ScanError {
    /// Connect, read and timeout failures of the raw transport
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ScanError::Network(_) | ScanError::Timeout | ScanError::Decode(_) | ScanError::Io(_)
        )
    }
}

/// Retry behaviour for transient join outcomes.
///
/// The sweep waits a fixed backoff between attempts. `max_attempts` is
/// `None` for the unbounded loop the scanner runs in production; tests and
/// cautious operators can cap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Duration,
    max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(backoff: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    /// Delay before the next attempt
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `retries` retries already ran
    pub fn allows(&self, retries: u32) -> bool {
        match self.max_attempts {
            Some(max) => retries < max,
            None => true,
        }
    }
}

impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::Parse(e.to_string())
    }
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::Parse(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ScanError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ScanError::Timeout
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(e: rusqlite::Error) -> Self {
        ScanError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        ScanError::Fetch(e.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::Parse(e.to_string())
    }
}
