//! One-shot length-prefixed exchange over TCP
//!
//! A connection is opened, one packet is written, and inbound bytes are
//! accumulated until the varint length at the head of the reply is
//! satisfied. A single deadline covers the whole exchange: when it fires
//! the in-flight future is dropped, which closes the socket.

use crate::network::packet::MAX_PACKET_LEN;
use crate::network::varint;
use crate::ScanError;
use bytes::{Bytes, BytesMut};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default deadline for a framed exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

const READ_CHUNK: usize = 4096;

/// Framed request/response transport with a fixed deadline
#[derive(Debug, Clone, Copy)]
pub struct FramedTransport {
    timeout: Duration,
}

impl Default for FramedTransport {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl FramedTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `packet` and return the declared-length payload of the reply
    pub async fn send(&self, address: IpAddr, port: u16, packet: &[u8]) -> crate::Result<Bytes> {
        send(address, port, packet, self.timeout).await
    }
}

/// Send `packet` to `address:port` and return exactly the payload the
/// reply's varint header declares.
///
/// Resolves once with the payload, `ScanError::Timeout`, or a network /
/// decode error. Never panics on hostile input.
pub async fn send(address: IpAddr, port: u16, packet: &[u8], timeout: Duration) -> crate::Result<Bytes> {
    let target = SocketAddr::new(address, port);

    match tokio::time::timeout(timeout, exchange(target, packet)).await {
        Ok(Ok(payload)) => {
            log::trace!("{} replied with {} payload bytes", target, payload.len());
            Ok(payload)
        }
        Ok(Err(e)) => {
            log::trace!("{} exchange failed: {}", target, e);
            Err(e)
        }
        Err(_) => {
            log::trace!("{} timed out after {:?}", target, timeout);
            Err(ScanError::Timeout)
        }
    }
}

async fn exchange(target: SocketAddr, packet: &[u8]) -> crate::Result<Bytes> {
    let mut stream = TcpStream::connect(target)
        .await
        .map_err(|e| ScanError::Network(e.to_string()))?;

    stream
        .write_all(packet)
        .await
        .map_err(|e| ScanError::Network(e.to_string()))?;

    let mut header = BytesMut::with_capacity(varint::MAX_VARINT_LEN);
    let mut declared: Option<usize> = None;
    let mut payload = BytesMut::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        if n == 0 {
            return Err(ScanError::Network(match declared {
                Some(len) => format!(
                    "connection closed after {} of {} payload bytes",
                    payload.len(),
                    len
                ),
                None => "connection closed before a length was received".to_string(),
            }));
        }

        let data = &chunk[..n];

        let expected = match declared {
            Some(len) => {
                payload.extend_from_slice(data);
                len
            }
            None => {
                header.extend_from_slice(data);
                let Some((len, used)) = varint::decode(&header)? else {
                    continue;
                };
                if len < 0 || len as usize > MAX_PACKET_LEN {
                    return Err(ScanError::Decode(format!("declared length {} out of range", len)));
                }
                payload.extend_from_slice(&header[used..]);
                declared = Some(len as usize);
                len as usize
            }
        };

        if payload.len() >= expected {
            payload.truncate(expected);
            drop(stream);
            return Ok(payload.freeze());
        }
    }
}
