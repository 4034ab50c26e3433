//! Offline-mode login over the raw wire protocol
//!
//! Speaks the handshake and login states only. That is enough to see a
//! whitelist disconnect or a successful login on servers that do not
//! require account authentication. Online-mode servers answer with an
//! encryption request, which is reported as an error event.

use super::{BotConnector, BotSession, KickReason, SessionEvent};
use crate::credentials::Credential;
use crate::network::codec::LengthFrameCodec;
use crate::network::packet::{self, login, NextState, PacketReader, PROTOCOL_MANDATORY_UUID};
use crate::network::transport::DEFAULT_TIMEOUT;
use crate::network::version::GameVersion;
use crate::utils::address_table::Endpoint;
use crate::ScanError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Connector for offline-mode servers
#[derive(Debug, Clone, Copy)]
pub struct WireConnector {
    /// Bound on the TCP connect and the two login writes
    timeout: Duration,
}

impl Default for WireConnector {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl WireConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn open(
        &self,
        credential: &Credential,
        endpoint: Endpoint,
        version: &GameVersion,
    ) -> crate::Result<Framed<TcpStream, LengthFrameCodec>> {
        let target = SocketAddr::new(endpoint.ip(), endpoint.port);
        let stream = TcpStream::connect(target)
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;
        let mut framed = Framed::new(stream, LengthFrameCodec::new());

        let host = endpoint.address.to_string();
        framed
            .send(packet::handshake(version.protocol, &host, endpoint.port, NextState::Login).finish())
            .await?;
        framed
            .send(packet::login_start(&credential.username, version.protocol).finish())
            .await?;

        Ok(framed)
    }
}

#[async_trait]
impl BotConnector for WireConnector {
    async fn connect(
        &self,
        credential: &Credential,
        endpoint: Endpoint,
        version: &GameVersion,
    ) -> crate::Result<Box<dyn BotSession>> {
        let framed = tokio::time::timeout(self.timeout, self.open(credential, endpoint, version))
            .await
            .map_err(|_| ScanError::Timeout)??;

        log::trace!("{} login started as {} ({})", endpoint, credential.username, version);

        Ok(Box::new(WireSession {
            framed,
            username: credential.username.clone(),
            protocol: version.protocol,
            logged_in: false,
            ended: false,
        }))
    }
}

/// Login-state session over a framed TCP stream
pub struct WireSession {
    framed: Framed<TcpStream, LengthFrameCodec>,
    username: String,
    protocol: i32,
    logged_in: bool,
    ended: bool,
}

impl WireSession {
    /// Interpret one login-state packet. `None` means keep reading.
    async fn handle_login_packet(&mut self, body: bytes::Bytes) -> Option<SessionEvent> {
        let mut reader = PacketReader::new(body);
        let id = match reader.varint() {
            Ok(id) => id,
            Err(e) => return Some(SessionEvent::Error(e.to_string())),
        };

        match id {
            login::DISCONNECT => match reader.string() {
                Ok(raw) => Some(SessionEvent::Kicked(KickReason::parse(&raw))),
                Err(e) => Some(SessionEvent::Error(e.to_string())),
            },
            login::ENCRYPTION_REQUEST => Some(SessionEvent::Error(
                "server requires online-mode authentication".to_string(),
            )),
            login::SUCCESS => {
                self.logged_in = true;
                if self.protocol >= PROTOCOL_MANDATORY_UUID {
                    if let Err(e) = self.framed.send(packet::login_acknowledged().finish()).await {
                        return Some(SessionEvent::Error(e.to_string()));
                    }
                }
                Some(SessionEvent::Login)
            }
            login::SET_COMPRESSION => match reader.varint() {
                Ok(threshold) => {
                    self.framed.codec_mut().set_compression(threshold);
                    None
                }
                Err(e) => Some(SessionEvent::Error(e.to_string())),
            },
            login::PLUGIN_REQUEST => match reader.varint() {
                Ok(message_id) => {
                    let reply = packet::login_plugin_response(message_id).finish();
                    match self.framed.send(reply).await {
                        Ok(()) => None,
                        Err(e) => Some(SessionEvent::Error(e.to_string())),
                    }
                }
                Err(e) => Some(SessionEvent::Error(e.to_string())),
            },
            other => Some(SessionEvent::Error(format!(
                "unexpected login packet {:#04x}",
                other
            ))),
        }
    }
}

#[async_trait]
impl BotSession for WireSession {
    fn username(&self) -> &str {
        &self.username
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        while !self.ended {
            let body = match self.framed.next().await {
                Some(Ok(body)) => body,
                Some(Err(e)) => return Some(SessionEvent::Error(e.to_string())),
                None => return None,
            };

            // configuration/play traffic after login is not interpreted
            if self.logged_in {
                continue;
            }

            if let Some(event) = self.handle_login_packet(body).await {
                return Some(event);
            }
        }
        None
    }

    async fn send_chat(&mut self, _message: &str) -> crate::Result<()> {
        Err(ScanError::Unsupported(
            "chat needs the play state, which the wire session does not speak".to_string(),
        ))
    }

    async fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        if let Err(e) = self.framed.close().await {
            log::trace!("closing session for {}: {}", self.username, e);
        }
    }
}
