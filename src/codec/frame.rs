//! # Frame Layer
//!
//! Splits a raw byte stream into discrete varint-length-prefixed frames and back.
//!
//! The decoder buffers partial frames across I/O callbacks and tolerates
//! arbitrary split points; it never blocks waiting for bytes. Length validation
//! happens before any payload allocation: a frame longer than the configured
//! ceiling is `FrameTooLarge` and connection-fatal.

use crate::config::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The frame ceiling fits in a 3-byte varint; a longer prefix is itself a fault.
const MAX_LENGTH_PREFIX_BYTES: usize = 3;

/// Length-prefixed frame splitter/joiner.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Peek the length prefix without consuming.
    ///
    /// Returns `(payload_len, prefix_len)`, or `None` when the prefix itself is
    /// still incomplete.
    fn peek_length(&self, src: &BytesMut) -> Result<Option<(usize, usize)>> {
        let mut value: u32 = 0;
        for (i, &byte) in src.iter().take(MAX_LENGTH_PREFIX_BYTES).enumerate() {
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(Some((value as usize, i + 1)));
            }
        }
        if src.len() >= MAX_LENGTH_PREFIX_BYTES {
            // Three continuation bytes: the declared length cannot fit the ceiling.
            return Err(ProtocolError::FrameTooLarge {
                len: value as usize,
                max: self.max_frame_size,
            });
        }
        Ok(None)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        let Some((len, prefix_len)) = self.peek_length(src)? else {
            return Ok(None);
        };
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        if src.len() < prefix_len + len {
            src.reserve(prefix_len + len - src.len());
            return Ok(None);
        }
        let _ = src.split_to(prefix_len);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                len: item.len(),
                max: self.max_frame_size,
            });
        }
        dst.reserve(item.len() + MAX_LENGTH_PREFIX_BYTES);
        let mut value = item.len() as u32;
        loop {
            if value & !0x7F == 0 {
                dst.put_u8(value as u8);
                break;
            }
            dst.put_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_frame() {
        let mut codec = FrameCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"hello"), &mut wire).unwrap();

        let frame = codec.decode(&mut wire).unwrap().expect("one frame");
        assert_eq!(&frame[..], b"hello");
        assert!(wire.is_empty());
    }

    #[test]
    fn partial_prefix_and_payload_yield_none() {
        let mut codec = FrameCodec::default();
        let mut wire = BytesMut::new();
        codec
            .encode(Bytes::from(vec![7u8; 300]), &mut wire)
            .unwrap();

        // Feed one byte at a time; only the final byte completes the frame.
        let full = wire.clone();
        let mut partial = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            partial.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut partial).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none(), "premature frame at byte {i}");
            } else {
                assert_eq!(decoded.expect("final frame").len(), 300);
            }
        }
    }

    #[test]
    fn back_to_back_frames() {
        let mut codec = FrameCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"one"), &mut wire).unwrap();
        codec.encode(Bytes::from_static(b"two"), &mut wire).unwrap();

        assert_eq!(&codec.decode(&mut wire).unwrap().unwrap()[..], b"one");
        assert_eq!(&codec.decode(&mut wire).unwrap().unwrap()[..], b"two");
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn oversized_declared_length_is_fatal() {
        let mut codec = FrameCodec::new(16);
        let mut wire = BytesMut::from(&[200u8, 1][..]); // declares 200 bytes
        assert!(matches!(
            codec.decode(&mut wire),
            Err(ProtocolError::FrameTooLarge { len: 200, max: 16 })
        ));
    }

    #[test]
    fn runaway_length_prefix_is_fatal() {
        let mut codec = FrameCodec::default();
        let mut wire = BytesMut::from(&[0xFF, 0xFF, 0xFF][..]);
        assert!(matches!(
            codec.decode(&mut wire),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn oversized_outbound_frame_rejected() {
        let mut codec = FrameCodec::new(8);
        let mut wire = BytesMut::new();
        assert!(matches!(
            codec.encode(Bytes::from(vec![0u8; 9]), &mut wire),
            Err(ProtocolError::FrameTooLarge { len: 9, max: 8 })
        ));
    }

    #[test]
    fn empty_frame_roundtrips() {
        let mut codec = FrameCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::new(), &mut wire).unwrap();
        assert_eq!(wire.len(), 1);
        let frame = codec.decode(&mut wire).unwrap().unwrap();
        assert!(frame.is_empty());
    }
}
