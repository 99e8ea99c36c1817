//! Compact-size integers.
//!
//! The variable-length integer encoding used throughout the wire protocol
//! and in BUMP strings: one byte below `0xfd`, otherwise a marker byte
//! followed by a little-endian u16/u32/u64.

use bytes::{Buf, BufMut};

use crate::WireError;

/// Writes `n` as a compact-size integer.
pub fn write_varint<B: BufMut>(buf: &mut B, n: u64) {
    match n {
        0..=0xfc => buf.put_u8(n as u8),
        0xfd..=0xffff => {
            buf.put_u8(0xfd);
            buf.put_u16_le(n as u16);
        }
        0x1_0000..=0xffff_ffff => {
            buf.put_u8(0xfe);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xff);
            buf.put_u64_le(n);
        }
    }
}

/// Reads a compact-size integer, erroring if the buffer is too short.
pub fn read_varint<B: Buf>(buf: &mut B) -> Result<u64, WireError> {
    if buf.remaining() < 1 {
        return Err(WireError::Truncated);
    }
    match buf.get_u8() {
        0xfd => {
            if buf.remaining() < 2 {
                return Err(WireError::Truncated);
            }
            Ok(u64::from(buf.get_u16_le()))
        }
        0xfe => {
            if buf.remaining() < 4 {
                return Err(WireError::Truncated);
            }
            Ok(u64::from(buf.get_u32_le()))
        }
        0xff => {
            if buf.remaining() < 8 {
                return Err(WireError::Truncated);
            }
            Ok(buf.get_u64_le())
        }
        n => Ok(u64::from(n)),
    }
}

/// The encoded length of `n` in bytes.
pub const fn varint_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn round_trip(n: u64, expected_len: usize) {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, n);
        assert_eq!(buf.len(), expected_len);
        assert_eq!(varint_len(n), expected_len);

        let mut slice = &buf[..];
        assert_eq!(read_varint(&mut slice).unwrap(), n);
        assert!(slice.is_empty());
    }

    #[test]
    fn round_trips_at_boundaries() {
        round_trip(0, 1);
        round_trip(0xfc, 1);
        round_trip(0xfd, 3);
        round_trip(0xffff, 3);
        round_trip(0x1_0000, 5);
        round_trip(1_573_650, 5);
        round_trip(0xffff_ffff, 5);
        round_trip(0x1_0000_0000, 9);
    }

    #[test]
    fn truncated_input_errors() {
        let mut buf = &[0xfeu8, 0x12][..];
        assert!(matches!(read_varint(&mut buf), Err(WireError::Truncated)));

        let mut empty = &[][..];
        assert!(matches!(read_varint(&mut empty), Err(WireError::Truncated)));
    }
}
