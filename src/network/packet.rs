//! Packet crafting and parsing for the handshake, status and login states

use crate::network::varint;
use crate::ScanError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest packet body the protocol allows (a 3-byte varint length)
pub const MAX_PACKET_LEN: usize = 2_097_151;

/// Handshake packet id, shared by the status and login flows
pub const HANDSHAKE_ID: i32 = 0x00;
/// Status request / response id
pub const STATUS_ID: i32 = 0x00;

/// Clientbound login packet ids
pub mod login {
    pub const DISCONNECT: i32 = 0x00;
    pub const ENCRYPTION_REQUEST: i32 = 0x01;
    pub const SUCCESS: i32 = 0x02;
    pub const SET_COMPRESSION: i32 = 0x03;
    pub const PLUGIN_REQUEST: i32 = 0x04;

    /// Serverbound ids
    pub const START: i32 = 0x00;
    pub const PLUGIN_RESPONSE: i32 = 0x02;
    pub const ACKNOWLEDGED: i32 = 0x03;
}

/// First protocol that sends the player UUID in Login Start (1.20.2)
pub const PROTOCOL_MANDATORY_UUID: i32 = 764;
/// 1.19.3 dropped the signature block from Login Start
pub const PROTOCOL_OPTIONAL_UUID: i32 = 761;
/// 1.19 introduced the optional signature block
pub const PROTOCOL_SIGNATURE_DATA: i32 = 759;
/// 1.19.1 added the optional UUID after the signature block
pub const PROTOCOL_SIGNATURE_AND_UUID: i32 = 760;

/// State requested by the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status = 1,
    Login = 2,
}

/// Builder for a packet body: id followed by fields
pub struct PacketBuilder {
    buf: BytesMut,
}

impl PacketBuilder {
    pub fn new(packet_id: i32) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        varint::encode(packet_id, &mut buf);
        Self { buf }
    }

    pub fn varint(mut self, value: i32) -> Self {
        varint::encode(value, &mut self.buf);
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        varint::encode(value.len() as i32, &mut self.buf);
        self.buf.put_slice(value.as_bytes());
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.buf.put_u16(value);
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.buf.put_u8(value as u8);
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.put_slice(value);
        self
    }

    /// Packet body without the length prefix
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Packet body with its varint length prefix
    pub fn build(self) -> Bytes {
        frame(&self.buf)
    }
}

/// Prefix a packet body with its varint length
pub fn frame(body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + varint::MAX_VARINT_LEN);
    varint::encode(body.len() as i32, &mut out);
    out.put_slice(body);
    out.freeze()
}

/// Handshake announcing `protocol` and the address the client dialled
pub fn handshake(protocol: i32, host: &str, port: u16, next: NextState) -> PacketBuilder {
    PacketBuilder::new(HANDSHAKE_ID)
        .varint(protocol)
        .string(host)
        .u16(port)
        .varint(next as i32)
}

/// Framed handshake + status request, sent in a single write
pub fn status_ping(protocol: i32, host: &str, port: u16) -> Bytes {
    let mut out = BytesMut::new();
    out.put(handshake(protocol, host, port, NextState::Status).build());
    out.put(PacketBuilder::new(STATUS_ID).build());
    out.freeze()
}

/// Login Start, shaped for the fields `protocol` expects.
///
/// No signature or UUID is offered where they are optional; where the
/// UUID is mandatory the nil UUID is sent and the server derives its own.
pub fn login_start(username: &str, protocol: i32) -> PacketBuilder {
    let builder = PacketBuilder::new(login::START).string(username);

    if protocol >= PROTOCOL_MANDATORY_UUID {
        builder.bytes(&[0u8; 16])
    } else if protocol >= PROTOCOL_OPTIONAL_UUID {
        builder.bool(false)
    } else if protocol == PROTOCOL_SIGNATURE_AND_UUID {
        builder.bool(false).bool(false)
    } else if protocol == PROTOCOL_SIGNATURE_DATA {
        builder.bool(false)
    } else {
        builder
    }
}

/// Reply to a login plugin request we do not understand
pub fn login_plugin_response(message_id: i32) -> PacketBuilder {
    PacketBuilder::new(login::PLUGIN_RESPONSE)
        .varint(message_id)
        .bool(false)
}

pub fn login_acknowledged() -> PacketBuilder {
    PacketBuilder::new(login::ACKNOWLEDGED)
}

/// Cursor over a received packet body
pub struct PacketReader {
    buf: Bytes,
}

impl PacketReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn varint(&mut self) -> crate::Result<i32> {
        match varint::decode(&self.buf)? {
            Some((value, len)) => {
                self.buf.advance(len);
                Ok(value)
            }
            None => Err(ScanError::Decode("packet ends inside a varint".to_string())),
        }
    }

    pub fn string(&mut self) -> crate::Result<String> {
        let len = self.varint()?;
        if len < 0 || len as usize > self.buf.len() {
            return Err(ScanError::Decode(format!(
                "string length {} exceeds remaining {} bytes",
                len,
                self.buf.len()
            )));
        }
        let raw = self.buf.split_to(len as usize);
        String::from_utf8(raw.to_vec()).map_err(|e| ScanError::Decode(e.to_string()))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ping_layout() {
        let packet = status_ping(0, "a", 25565);
        // handshake: len=7 | id 0 | proto 0 | "a" | 0x63dd | next 1, then request: len=1 | id 0
        assert_eq!(
            &packet[..],
            &[0x07, 0x00, 0x00, 0x01, b'a', 0x63, 0xdd, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn test_login_start_shapes() {
        let legacy = login_start("bot", 754).finish();
        assert_eq!(&legacy[..], &[0x00, 0x03, b'b', b'o', b't']);

        let signed = login_start("bot", PROTOCOL_SIGNATURE_DATA).finish();
        assert_eq!(signed.len(), legacy.len() + 1);

        let signed_uuid = login_start("bot", PROTOCOL_SIGNATURE_AND_UUID).finish();
        assert_eq!(signed_uuid.len(), legacy.len() + 2);

        let optional = login_start("bot", 763).finish();
        assert_eq!(&optional[..], &[0x00, 0x03, b'b', b'o', b't', 0x00]);

        let mandatory = login_start("bot", 767).finish();
        assert_eq!(mandatory.len(), legacy.len() + 16);
    }

    #[test]
    fn test_reader_rejects_truncated_string() {
        let body = PacketBuilder::new(0).varint(10).bytes(b"abc").finish();
        let mut reader = PacketReader::new(body);
        assert_eq!(reader.varint().unwrap(), 0);
        assert!(matches!(reader.string(), Err(ScanError::Decode(_))));
    }

    #[test]
    fn test_reader_string() {
        let body = PacketBuilder::new(0x00).string("{\"text\":\"hi\"}").finish();
        let mut reader = PacketReader::new(body);
        assert_eq!(reader.varint().unwrap(), 0);
        assert_eq!(reader.string().unwrap(), "{\"text\":\"hi\"}");
        assert_eq!(reader.remaining(), 0);
    }
}
