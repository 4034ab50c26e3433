//! Variable-length integer encoding used by the game wire protocol
//!
//! Each byte carries 7 bits of magnitude, least significant group first,
//! with the high bit set on every byte except the last. A 32-bit value
//! takes at most five bytes.

use crate::ScanError;
use bytes::BufMut;

/// Longest valid encoding of a 32-bit varint
pub const MAX_VARINT_LEN: usize = 5;

const SEGMENT_BITS: u8 = 0x7f;
const CONTINUE_BIT: u8 = 0x80;

/// Decode a varint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the final byte, so callers
/// reading from a socket can wait for more data. Returns the value and the
/// number of bytes consumed otherwise.
pub fn decode(buf: &[u8]) -> crate::Result<Option<(i32, usize)>> {
    let mut value: u32 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(ScanError::Decode("varint is longer than 5 bytes".to_string()));
        }

        value |= ((byte & SEGMENT_BITS) as u32) << (7 * i);

        if byte & CONTINUE_BIT == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }

    if buf.len() >= MAX_VARINT_LEN {
        return Err(ScanError::Decode("varint is longer than 5 bytes".to_string()));
    }

    Ok(None)
}

/// Append the encoding of `value` to `out`
pub fn encode<B: BufMut>(value: i32, out: &mut B) {
    let mut value = value as u32;
    loop {
        if value & !(SEGMENT_BITS as u32) == 0 {
            out.put_u8(value as u8);
            return;
        }
        out.put_u8((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
}

/// Number of bytes `encode` writes for `value`
pub fn encoded_len(value: i32) -> usize {
    let value = value as u32;
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_known_encodings() {
        let cases: &[(i32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (255, &[0xff, 0x01]),
            (25565, &[0xdd, 0xc7, 0x01]),
            (2097151, &[0xff, 0xff, 0x7f]),
            (i32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x07]),
            (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];

        for &(value, bytes) in cases {
            let mut out = BytesMut::new();
            encode(value, &mut out);
            assert_eq!(&out[..], bytes, "encoding {}", value);
            assert_eq!(encoded_len(value), bytes.len());
            assert_eq!(decode(bytes).unwrap(), Some((value, bytes.len())));
        }
    }

    #[test]
    fn test_incomplete_is_not_an_error() {
        assert_eq!(decode(&[]).unwrap(), None);
        assert_eq!(decode(&[0x80]).unwrap(), None);
        assert_eq!(decode(&[0xdd, 0xc7]).unwrap(), None);
    }

    #[test]
    fn test_trailing_bytes_are_not_consumed() {
        assert_eq!(decode(&[0x05, 0xaa, 0xbb]).unwrap(), Some((5, 1)));
    }

    #[test]
    fn test_overlong_varint_is_malformed() {
        let err = decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));

        let err = decode(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }
}
