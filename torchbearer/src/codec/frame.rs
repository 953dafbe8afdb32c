//! Package framing: `magic(2) | length(3, LE) | type(1) | payload | checksum(1) | 0D 0A`.
//!
//! Length covers the whole package, from the first magic byte to the terminator. Checksum is
//! the sum of every byte before it, truncated to 8 bits.

use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

pub const HOST_MAGIC: [u8; 2] = [0xCC, 0x01];
pub const DEVICE_MAGIC: [u8; 2] = [0xCC, 0x81];
pub const TERMINATOR: [u8; 2] = [0x0D, 0x0A];

/// Magic + length, enough to know how long the package is
pub const HEAD_SIZE: usize = 5;
/// Head + type + checksum + terminator
pub const PACKAGE_OVERHEAD: usize = HEAD_SIZE + 1 + 1 + TERMINATOR.len();
pub const MAX_PACKAGE_SIZE: usize = 0xFF_FFFF;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

impl Direction {
    pub const fn magic(self) -> [u8; 2] {
        match self {
            Direction::HostToDevice => HOST_MAGIC,
            Direction::DeviceToHost => DEVICE_MAGIC,
        }
    }
}

/// Single package with framing stripped, payload is not interpreted yet
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Frame {
    pub code: u8,
    pub payload: Bytes,
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |accum, b| accum.wrapping_add(*b))
}

pub fn encode_frame(
    direction: Direction,
    code: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let length = PACKAGE_OVERHEAD + payload.len();
    if length > MAX_PACKAGE_SIZE {
        return Err(Error::PayloadTooLong(payload.len()));
    }
    let start = dst.len();
    dst.reserve(length);
    dst.extend_from_slice(&direction.magic());
    dst.put_uint_le(length as u64, 3);
    dst.put_u8(code);
    dst.extend_from_slice(payload);
    let crc = checksum(&dst[start..]);
    dst.put_u8(crc);
    dst.extend_from_slice(&TERMINATOR);
    Ok(())
}

/// Splits a single package off the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched while the package is incomplete. Any
/// framing violation is an error, there is no resynchronization on a corrupted stream.
pub fn decode_frame(direction: Direction, src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < HEAD_SIZE {
        return Ok(None);
    }
    if src[..2] != direction.magic() {
        return Err(Error::InvalidStartBytes(src[0], src[1]));
    }
    let length = usize::from(src[2]) | usize::from(src[3]) << 8 | usize::from(src[4]) << 16;
    if length < PACKAGE_OVERHEAD {
        return Err(Error::InvalidLength(length));
    }
    if src.len() < length {
        // Data packages are large, avoid growing the buffer chunk by chunk
        src.reserve(length - src.len());
        return Ok(None);
    }

    let expected = checksum(&src[..length - 3]);
    let actual = src[length - 3];
    if expected != actual {
        return Err(Error::InvalidChecksum { expected, actual });
    }
    if src[length - 2..length] != TERMINATOR {
        return Err(Error::InvalidEndBytes(src[length - 2], src[length - 1]));
    }

    let package = src.split_to(length).freeze();
    Ok(Some(Frame {
        code: package[HEAD_SIZE],
        payload: package.slice(HEAD_SIZE + 1..length - 3),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;

    fn device_frame(code: u8, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(Direction::DeviceToHost, code, payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn encode_get_range() {
        let mut dst = BytesMut::new();
        encode_frame(Direction::HostToDevice, 0x0F, &[], &mut dst).unwrap();
        assert_eq!(
            &dst[..],
            &[0xCC, 0x01, 0x09, 0x00, 0x00, 0x0F, 0xE5, 0x0D, 0x0A]
        );
    }

    #[test]
    fn encode_checksum_wraps() {
        let mut dst = BytesMut::new();
        encode_frame(Direction::HostToDevice, 0x0C, &[0xFF, 0xFF, 0xFF, 0xFF], &mut dst).unwrap();
        assert_eq!(dst.len(), 13);
        assert_eq!(dst[2], 13);
        assert_eq!(dst[10], checksum(&dst[..10]));
        assert_eq!(&dst[11..], &TERMINATOR);
    }

    #[test]
    fn frame_round_trip() {
        let payload: Vec<u8> = (0..=255).collect();
        let mut buf = device_frame(0x33, &payload);
        let frame = decode_frame(Direction::DeviceToHost, &mut buf)
            .unwrap()
            .unwrap();
        assert_eq!(frame.code, 0x33);
        assert_eq!(&frame.payload[..], &payload[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn wait_for_full_frame() {
        let full = device_frame(0x0D, &[0x10, 0x27, 0x00, 0x00]);
        for cut in 0..full.len() {
            let mut partial = BytesMut::from(&full[..cut]);
            assert_ok_eq!(decode_frame(Direction::DeviceToHost, &mut partial), None);
            assert_eq!(&partial[..], &full[..cut]);
        }
    }

    #[test]
    fn reject_wrong_magic() {
        let mut buf = BytesMut::new();
        encode_frame(Direction::HostToDevice, 0x04, &[], &mut buf).unwrap();
        assert_matches!(
            decode_frame(Direction::DeviceToHost, &mut buf),
            Err(Error::InvalidStartBytes(0xCC, 0x01))
        );
    }

    #[test]
    fn reject_short_length() {
        let mut buf = BytesMut::from(&[0xCC, 0x81, 0x05, 0x00, 0x00, 0x04][..]);
        assert_matches!(
            decode_frame(Direction::DeviceToHost, &mut buf),
            Err(Error::InvalidLength(5))
        );
    }

    #[test]
    fn reject_corrupted_checksum() {
        let clean = device_frame(0x08, b"Y21B7W-0001");
        // Any single byte after the length field, checksum included, breaks the sum
        for idx in HEAD_SIZE..clean.len() - 2 {
            let mut corrupted = clean.clone();
            corrupted[idx] ^= 0x5A;
            assert_matches!(
                decode_frame(Direction::DeviceToHost, &mut corrupted),
                Err(Error::InvalidChecksum { .. })
            );
        }
    }

    #[test]
    fn reject_bad_terminator() {
        let mut buf = device_frame(0x04, &[]);
        let last = buf.len() - 1;
        buf[last] = 0x0B;
        assert_matches!(
            decode_frame(Direction::DeviceToHost, &mut buf),
            Err(Error::InvalidEndBytes(0x0D, 0x0B))
        );
    }
}
