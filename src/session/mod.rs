//! Bot session seam
//!
//! A session is the client side of one login attempt. It reports what the
//! server does through [`SessionEvent`]s and can be ended at any point.
//! The join orchestrator only depends on these traits; the wire
//! implementation in [`wire`] covers the offline-mode login phase.

pub mod wire;

use crate::credentials::Credential;
use crate::network::version::GameVersion;
use crate::utils::address_table::Endpoint;
use async_trait::async_trait;
use serde_json::Value;

pub use wire::WireConnector;

/// Disconnect reason as sent by the server
#[derive(Debug, Clone, PartialEq)]
pub enum KickReason {
    Text(String),
    Structured(Value),
}

impl KickReason {
    /// Interpret a raw reason string: JSON chat components become
    /// `Structured`, a bare JSON string or plain text becomes `Text`
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::String(text)) => KickReason::Text(text),
            Ok(value @ (Value::Object(_) | Value::Array(_))) => KickReason::Structured(value),
            _ => KickReason::Text(raw.to_string()),
        }
    }

    /// Reason as searchable text; structured reasons are serialized whole
    /// so translation keys stay visible
    pub fn to_text(&self) -> String {
        match self {
            KickReason::Text(text) => text.clone(),
            KickReason::Structured(value) => value.to_string(),
        }
    }
}

/// Something the session observed
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Login completed
    Login,
    /// Disconnected by the server
    Kicked(KickReason),
    /// Transport or authentication failure
    Error(String),
    /// Chat line seen in game
    Chat { username: String, message: String },
}

/// One live login attempt
#[async_trait]
pub trait BotSession: Send {
    /// Name the bot is logged in as
    fn username(&self) -> &str;

    /// Next event, or `None` once the session is over.
    ///
    /// Must be cancel safe: the orchestrator races it against timers.
    async fn next_event(&mut self) -> Option<SessionEvent>;

    async fn send_chat(&mut self, message: &str) -> crate::Result<()>;

    /// Terminate the session. Safe to call more than once.
    async fn end(&mut self);
}

/// Opens bot sessions
#[async_trait]
pub trait BotConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &Credential,
        endpoint: Endpoint,
        version: &GameVersion,
    ) -> crate::Result<Box<dyn BotSession>>;
}
