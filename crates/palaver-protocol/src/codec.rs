//! Length-prefixed text framing.
//!
//! A TCP connection is a stream of bytes with no message boundaries, so
//! every line travels as one *frame*:
//!
//! ```text
//! +--------+--------+------------------------+
//! |  len (u16, BE)  |  len bytes of UTF-8    |
//! +--------+--------+------------------------+
//! ```
//!
//! The payload uses *modified* UTF-8: NUL travels
//! as `C0 80`, and characters outside the Basic Multilingual Plane travel
//! as two 3-byte surrogates. Everything else is byte-identical to UTF-8.
//! Inbound frames are also accepted in standard UTF-8, so clients using
//! either form can connect.
//!
//! [`FrameCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`,
//! which handle buffering; the codec only has to recognise complete frames.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::FrameError;

/// Size of the length prefix in bytes.
const LEN_PREFIX: usize = 2;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Codec for one UTF-8 line per length-prefixed frame.
///
/// Symmetric: the server and clients use the same codec in both
/// directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        // Peek at the length without consuming it, so a partial frame
        // stays intact in the buffer until the rest arrives.
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;

        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let payload = src.split_to(len);
        let line = match String::from_utf8(payload.to_vec()) {
            Ok(line) => line,
            // `C0 80` and encoded surrogates are invalid UTF-8, so plain
            // text never reaches the slow path.
            Err(e) => decode_modified(e.as_bytes()).ok_or(e)?,
        };
        Ok(Some(line))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = FrameError;

    fn encode(
        &mut self,
        item: String,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let size = encoded_len(&item);
        if size > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                size,
                max: MAX_FRAME_LEN,
            });
        }

        dst.reserve(LEN_PREFIX + size);
        dst.put_u16(size as u16);
        if size == item.len() {
            dst.put_slice(item.as_bytes());
        } else {
            encode_modified(&item, dst);
        }
        Ok(())
    }
}

/// Payload size of `line` once framed. Lines longer than
/// [`MAX_FRAME_LEN`] can't be sent.
pub fn encoded_len(line: &str) -> usize {
    line.chars()
        .map(|c| match c {
            '\0' => 2,
            c if c.len_utf8() == 4 => 6,
            c => c.len_utf8(),
        })
        .sum()
}

fn encode_modified(line: &str, dst: &mut BytesMut) {
    let mut buf = [0u8; 4];
    let mut units = [0u16; 2];
    for c in line.chars() {
        match c {
            '\0' => dst.put_slice(&[0xC0, 0x80]),
            c if c.len_utf8() == 4 => {
                for unit in c.encode_utf16(&mut units).iter() {
                    put_three_byte(dst, u32::from(*unit));
                }
            }
            c => dst.put_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
}

fn put_three_byte(dst: &mut BytesMut, code: u32) {
    dst.put_u8(0xE0 | (code >> 12) as u8);
    dst.put_u8(0x80 | ((code >> 6) & 0x3F) as u8);
    dst.put_u8(0x80 | (code & 0x3F) as u8);
}

/// Decodes modified UTF-8, also accepting standard 4-byte sequences.
/// Returns `None` on any malformed sequence or unpaired surrogate.
fn decode_modified(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let (code, used) = decode_one(&bytes[i..])?;
        i += used;

        let c = if (0xD800..0xDC00).contains(&code) {
            let (low, used) = decode_one(&bytes[i..])?;
            if !(0xDC00..0xE000).contains(&low) {
                return None;
            }
            i += used;
            0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00)
        } else {
            code
        };
        out.push(char::from_u32(c)?);
    }
    Some(out)
}

/// One code unit (or a full 4-byte scalar) and the bytes it took.
fn decode_one(bytes: &[u8]) -> Option<(u32, usize)> {
    let lead = *bytes.first()?;
    let len = match lead {
        0x00..=0x7F => return Some((u32::from(lead), 1)),
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return None,
    };
    let tail = bytes.get(1..len)?;
    if tail.iter().any(|b| b & 0xC0 != 0x80) {
        return None;
    }

    let lead_bits = u32::from(lead) & (0x7F >> len);
    let code = tail
        .iter()
        .fold(lead_bits, |acc, b| (acc << 6) | u32::from(b & 0x3F));
    Some((code, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_big_endian_prefix() {
        let mut buf = BytesMut::new();
        FrameCodec.encode("hi".to_string(), &mut buf).unwrap();

        assert_eq!(&buf[..], &[0x00, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_decode_complete_frame() {
        let mut buf = BytesMut::new();
        FrameCodec
            .encode("/w bob привет".to_string(), &mut buf)
            .unwrap();

        let line = FrameCodec.decode(&mut buf).unwrap();

        assert_eq!(line.as_deref(), Some("/w bob привет"));
        assert!(buf.is_empty(), "frame should be fully consumed");
    }

    #[test]
    fn test_decode_partial_frame_waits_for_more() {
        let mut full = BytesMut::new();
        FrameCodec.encode("/list".to_string(), &mut full).unwrap();

        // Only the prefix and one payload byte have arrived.
        let mut partial = full.split_to(3);
        assert!(FrameCodec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 3, "partial frame must not be consumed");

        // The rest arrives.
        partial.extend_from_slice(&full);
        assert_eq!(
            FrameCodec.decode(&mut partial).unwrap().as_deref(),
            Some("/list")
        );
    }

    #[test]
    fn test_decode_lone_prefix_byte_waits() {
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(FrameCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_two_frames_back_to_back() {
        let mut buf = BytesMut::new();
        FrameCodec.encode("one".to_string(), &mut buf).unwrap();
        FrameCodec.encode("two".to_string(), &mut buf).unwrap();

        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("one"));
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("two"));
        assert!(FrameCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_empty_frame_yields_empty_line() {
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_decode_invalid_utf8_returns_error() {
        let mut buf = BytesMut::from(&[0x00, 0x02, 0xff, 0xfe][..]);

        let result = FrameCodec.decode(&mut buf);

        assert!(matches!(result, Err(FrameError::InvalidUtf8(_))));
    }

    #[test]
    fn test_encode_nul_and_emoji_use_modified_form() {
        let mut buf = BytesMut::new();
        FrameCodec.encode("a\0😀".to_string(), &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x00, 0x09, b'a', 0xC0, 0x80, 0xED, 0xA0, 0xBD, 0xED, 0xB8,
                0x80
            ]
        );
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("a\0😀"));
    }

    #[test]
    fn test_decode_accepts_standard_four_byte_utf8() {
        let mut buf = BytesMut::from(&[0x00, 0x04, 0xF0, 0x9F, 0x98, 0x80][..]);

        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("😀"));
    }

    #[test]
    fn test_decode_unpaired_surrogate_returns_error() {
        let mut buf = BytesMut::from(&[0x00, 0x04, 0xED, 0xA0, 0xBD, b'x'][..]);

        let result = FrameCodec.decode(&mut buf);

        assert!(matches!(result, Err(FrameError::InvalidUtf8(_))));
    }

    #[test]
    fn test_encoded_len_counts_modified_forms() {
        assert_eq!(encoded_len("hi"), 2);
        assert_eq!(encoded_len("привет"), 12);
        assert_eq!(encoded_len("\0"), 2);
        assert_eq!(encoded_len("😀"), 6);
    }

    #[test]
    fn test_encode_oversized_line_returns_error() {
        let line = "x".repeat(MAX_FRAME_LEN + 1);
        let mut buf = BytesMut::new();

        let result = FrameCodec.encode(line, &mut buf);

        assert!(matches!(
            result,
            Err(FrameError::TooLarge { size, max })
                if size == MAX_FRAME_LEN + 1 && max == MAX_FRAME_LEN
        ));
        assert!(buf.is_empty(), "nothing should be written on error");
    }
}
