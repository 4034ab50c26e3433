//! Frame codec for a persistent protocol session
//!
//! Frames are `[varint length][body]`. Once the server enables compression
//! every body gains a leading varint "uncompressed length"; zero means the
//! body is sent as-is. Compressed bodies are rejected, the login flow never
//! needs them.

use crate::network::packet::MAX_PACKET_LEN;
use crate::network::varint;
use crate::ScanError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, Default)]
pub struct LengthFrameCodec {
    compression: Option<i32>,
}

impl LengthFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to the compressed frame layout. A negative threshold turns it
    /// back off, as the protocol specifies.
    pub fn set_compression(&mut self, threshold: i32) {
        self.compression = if threshold >= 0 { Some(threshold) } else { None };
    }

    pub fn compression(&self) -> Option<i32> {
        self.compression
    }
}

impl Decoder for LengthFrameCodec {
    type Item = Bytes;
    type Error = ScanError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((len, used)) = varint::decode(src)? else {
            return Ok(None);
        };
        if len < 0 || len as usize > MAX_PACKET_LEN {
            return Err(ScanError::Decode(format!("frame length {} out of range", len)));
        }
        let len = len as usize;

        if src.len() < used + len {
            src.reserve(used + len - src.len());
            return Ok(None);
        }

        src.advance(used);
        let mut body = src.split_to(len);

        if self.compression.is_some() {
            let Some((data_len, data_used)) = varint::decode(&body)? else {
                return Err(ScanError::Decode("frame ends inside the data length".to_string()));
            };
            if data_len != 0 {
                return Err(ScanError::Decode(format!(
                    "compressed frame ({} bytes inflated) is not supported",
                    data_len
                )));
            }
            body.advance(data_used);
        }

        Ok(Some(body.freeze()))
    }
}

impl Encoder<Bytes> for LengthFrameCodec {
    type Error = ScanError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if body.len() > MAX_PACKET_LEN {
            return Err(ScanError::Decode(format!("packet of {} bytes is too large", body.len())));
        }

        if self.compression.is_some() {
            varint::encode(body.len() as i32 + 1, dst);
            dst.put_u8(0);
        } else {
            varint::encode(body.len() as i32, dst);
        }
        dst.put_slice(&body);
        Ok(())
    }
}
