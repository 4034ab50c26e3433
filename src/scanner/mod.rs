//! Whitelist scanner: per-endpoint join classification and the sweep driver

pub mod engine;
pub mod join;

use crate::utils::address_table::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use engine::ScanEngine;
pub use join::{JoinOrchestrator, JoinSettings};

/// Why an attempt ended without a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCause {
    /// Token refresh failed before connecting
    RefreshFailed,
    /// Nothing happened within the connect deadline
    ConnectDeadline,
    /// The connector panicked while opening the session
    SetupFault,
    /// Session ended before any event
    SessionClosed,
    /// Kicked for a reason other than the whitelist
    AmbiguousKick,
    /// Transport or authentication error that is not worth retrying
    SessionError,
    /// Retry cap reached
    RetryExhausted,
    /// Sweep cancelled while waiting to retry
    Cancelled,
}

impl fmt::Display for UnknownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnknownCause::RefreshFailed => "refresh failed",
            UnknownCause::ConnectDeadline => "connect deadline",
            UnknownCause::SetupFault => "setup fault",
            UnknownCause::SessionClosed => "session closed",
            UnknownCause::AmbiguousKick => "ambiguous kick",
            UnknownCause::SessionError => "session error",
            UnknownCause::RetryExhausted => "retries exhausted",
            UnknownCause::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Result of one join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Whitelisted,
    NotWhitelisted,
    Unknown(UnknownCause),
    /// Transient failure; reattempt after the backoff. Never persisted.
    Retry,
}

impl Outcome {
    /// Value to persist, if any
    pub fn verdict(&self) -> Option<bool> {
        match self {
            Outcome::Whitelisted => Some(true),
            Outcome::NotWhitelisted => Some(false),
            Outcome::Unknown(_) | Outcome::Retry => None,
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Outcome::Retry)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Whitelisted => f.write_str("whitelisted"),
            Outcome::NotWhitelisted => f.write_str("not whitelisted"),
            Outcome::Unknown(cause) => write!(f, "unknown ({})", cause),
            Outcome::Retry => f.write_str("retry"),
        }
    }
}

/// Where a slot's processing stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResult {
    Unreachable,
    Unsupported,
    Joined(Outcome),
}

/// Everything the sweep learned about one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    pub endpoint: Endpoint,
    pub result: SlotResult,
    /// Number of `Retry` outcomes before the final one
    pub retries: u32,
    pub persisted: bool,
    /// The store accepted the write but had no row for the endpoint
    pub unmatched: bool,
    pub store_failed: bool,
}

impl SlotReport {
    pub fn new(endpoint: Endpoint, result: SlotResult) -> Self {
        Self {
            endpoint,
            result,
            retries: 0,
            persisted: false,
            unmatched: false,
            store_failed: false,
        }
    }
}
