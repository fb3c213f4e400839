//! Variable-length Integer Encoding (Varint)
//!
//! Every integer inside a packed node is a varint. Two flavours exist:
//!
//! ## Forward Varints
//! - 7 bits of payload per byte, high bit set on every byte but the last
//! - Small numbers (0-127) use 1 byte, `u64::MAX` uses 10
//! - Signed values go through ZigZag first, so `-1` also fits in 1 byte:
//!   `0 → 0, -1 → 1, 1 → 2, -2 → 3, ...`
//!
//! ## Back-lengths
//! Each node element ends with its own size written as a varint whose bytes are
//! stored in *reverse* order. Reading from the last byte towards the front yields
//! the usual little-endian 7-bit groups, which is what lets a cursor step
//! backwards through a node without any offset index:
//!
//! ```text
//! forward varint of 300:  [0xAC, 0x02]
//! back-length of 300:     [0x02, 0xAC]   ← read right to left
//! ```
//!
//! Decoding never panics: truncated or oversized input is an error, since
//! node and snapshot bytes may come from outside the process.

use bytes::{Buf, BufMut};

use crate::{Error, Result};

/// Longest possible encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// ZigZag-map a signed integer onto the unsigned range.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(unsigned: u64) -> i64 {
    let value = (unsigned >> 1) as i64;
    if (unsigned & 1) != 0 {
        !value
    } else {
        value
    }
}

/// Encode a signed integer as a varint (ZigZag encoding)
pub fn encode_varint(buf: &mut impl BufMut, value: i64) {
    encode_varint_u64(buf, zigzag_encode(value));
}

/// Encode an unsigned integer as a varint
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a varint to a signed integer
pub fn decode_varint(buf: &mut impl Buf) -> Result<i64> {
    decode_varint_u64(buf).map(zigzag_decode)
}

/// Decode a varint to an unsigned integer
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(Error::UnexpectedEof);
        }
        let byte = buf.get_u8();
        if shift == 63 && byte > 1 {
            return Err(Error::VarintOverflow);
        }
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(value);
        }

        shift += 7;

        if shift >= 64 {
            return Err(Error::VarintOverflow);
        }
    }
}

/// Number of bytes [`encode_varint_u64`] writes for `value`.
#[inline]
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Encode `value` as a back-length: a varint with its bytes reversed.
pub fn encode_backlen(buf: &mut impl BufMut, mut value: u64) {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        scratch[len] = byte;
        len += 1;
        if value == 0 {
            break;
        }
    }
    for byte in scratch[..len].iter().rev() {
        buf.put_u8(*byte);
    }
}

/// Decode the back-length whose final byte sits at `buf[end - 1]`.
///
/// Returns the decoded value and the number of bytes it occupied.
pub fn decode_backlen(buf: &[u8], end: usize) -> Result<(u64, usize)> {
    if end > buf.len() {
        return Err(Error::UnexpectedEof);
    }

    let mut value: u64 = 0;
    let mut shift = 0;
    let mut used = 0;

    loop {
        if used >= end {
            return Err(Error::UnexpectedEof);
        }
        let byte = buf[end - 1 - used];
        used += 1;
        if shift == 63 && byte > 1 {
            return Err(Error::VarintOverflow);
        }
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((value, used));
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::VarintOverflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint_small_negative() {
        let mut buf = BytesMut::new();
        encode_varint(&mut buf, -5);

        let mut cursor = buf.as_ref();
        assert_eq!(decode_varint(&mut cursor).unwrap(), -5);
    }

    #[test]
    fn test_varint_i64_extremes() {
        for val in [i64::MIN, i64::MIN + 1, -1, 0, 1, i64::MAX - 1, i64::MAX] {
            let mut buf = BytesMut::new();
            encode_varint(&mut buf, val);
            let mut cursor = buf.as_ref();
            assert_eq!(decode_varint(&mut cursor).unwrap(), val);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn test_varint_compression() {
        // ZigZag doubles the magnitude, so 63 is the last 1-byte positive value
        let mut buf = BytesMut::new();
        encode_varint(&mut buf, 63);
        assert_eq!(buf.len(), 1);

        let mut buf = BytesMut::new();
        encode_varint(&mut buf, 64);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_varint_len_matches_encoding() {
        let boundaries = [
            0u64,
            127,
            128,
            (1 << 14) - 1,
            1 << 14,
            1 << 35,
            1 << 56,
            1 << 63,
            u64::MAX,
        ];
        for value in boundaries {
            let mut buf = BytesMut::new();
            encode_varint_u64(&mut buf, value);
            assert_eq!(
                varint_len(value),
                buf.len(),
                "varint_len({}) disagrees with encoder",
                value
            );
        }
    }

    #[test]
    fn test_decode_truncated_varint() {
        let mut buf: &[u8] = &[0x80, 0x80];
        assert_eq!(decode_varint_u64(&mut buf), Err(Error::UnexpectedEof));

        let mut empty: &[u8] = &[];
        assert_eq!(decode_varint_u64(&mut empty), Err(Error::UnexpectedEof));
    }

    #[test]
    fn test_decode_oversized_varint() {
        let mut buf: &[u8] = &[0xFF; 11];
        assert_eq!(decode_varint_u64(&mut buf), Err(Error::VarintOverflow));

        // 10th byte may only carry the top bit of a u64
        let mut buf: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        assert_eq!(decode_varint_u64(&mut buf), Err(Error::VarintOverflow));
    }

    #[test]
    fn test_backlen_reads_right_to_left() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"prefix");
        encode_backlen(&mut buf, 300);
        assert_eq!(&buf[6..], &[0x02, 0xAC]);

        let (value, used) = decode_backlen(&buf, buf.len()).unwrap();
        assert_eq!(value, 300);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_backlen_boundaries() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_backlen(&mut buf, value);
            assert_eq!(buf.len(), varint_len(value));
            assert_eq!(decode_backlen(&buf, buf.len()).unwrap(), (value, buf.len()));
        }
    }

    #[test]
    fn test_backlen_truncated() {
        // Continuation bit set on the only byte: runs off the front of the buffer
        assert_eq!(decode_backlen(&[0x80], 1), Err(Error::UnexpectedEof));
        assert_eq!(decode_backlen(&[0x01], 2), Err(Error::UnexpectedEof));
    }

    #[test]
    fn test_delta_encoding_stream_ids() {
        // Sequence deltas can be negative when the ms part moved forward
        let deltas: Vec<i64> = vec![0, 1, 2, -7, 15, 0, -1];
        let mut buf = BytesMut::new();
        for &d in &deltas {
            encode_varint(&mut buf, d);
        }
        let mut cursor = buf.as_ref();
        for &expected in &deltas {
            assert_eq!(decode_varint(&mut cursor).unwrap(), expected);
        }
        assert_eq!(cursor.len(), 0);
    }
}
