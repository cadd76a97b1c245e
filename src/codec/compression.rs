//! # Compression Stage
//!
//! Optional transform wrapping frame payloads above a size threshold.
//!
//! Sub-frame wire format: `varint(uncompressed_length)` followed by either the
//! raw payload (length 0, the explicit "uncompressed" marker) or a compressed
//! stream. Decoding enforces a decompression-bomb ceiling before allocating and
//! optionally validates that the decompressed size matches the declared one.
//!
//! Threshold and validation can be updated on a live stage; the connection
//! removes the stage entirely to disable compression.

use crate::config::MAX_DECOMPRESSED_SIZE;
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Compression algorithm applied above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    Lz4,
    Zstd,
}

/// Threshold-gated compression transform for frame payloads.
#[derive(Debug, Clone)]
pub struct CompressionStage {
    threshold: usize,
    validate: bool,
    kind: CompressionKind,
    max_decompressed: usize,
}

impl CompressionStage {
    pub fn new(threshold: usize, validate: bool, kind: CompressionKind) -> Self {
        Self {
            threshold,
            validate,
            kind,
            max_decompressed: MAX_DECOMPRESSED_SIZE,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Update the threshold in place; no state needs rebuilding.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Toggle declared-size validation in place.
    pub fn set_validation(&mut self, validate: bool) {
        self.validate = validate;
    }

    /// Wrap a packet payload into a compression sub-frame.
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(payload.len() + 5);
        if payload.len() < self.threshold {
            out.put_u8(0); // varint(0): explicit uncompressed marker
            out.extend_from_slice(payload);
            return Ok(out.freeze());
        }

        write_varint(&mut out, payload.len() as i32);
        match self.kind {
            CompressionKind::Lz4 => {
                out.extend_from_slice(&lz4_flex::block::compress(payload));
            }
            CompressionKind::Zstd => {
                let mut compressed = Vec::new();
                zstd::stream::copy_encode(payload, &mut compressed, 1)
                    .map_err(|_| ProtocolError::CompressionFailure)?;
                out.extend_from_slice(&compressed);
            }
        }
        Ok(out.freeze())
    }

    /// Unwrap a compression sub-frame back into the packet payload.
    pub fn decode(&self, frame: &[u8]) -> Result<Bytes> {
        let (declared, prefix_len) = read_varint(frame)?;
        if declared < 0 {
            return Err(ProtocolError::NegativeLength(declared));
        }
        let body = &frame[prefix_len..];
        if declared == 0 {
            return Ok(Bytes::copy_from_slice(body));
        }

        let declared = declared as usize;
        // Reject the claimed size before any allocation happens.
        if declared > self.max_decompressed {
            return Err(ProtocolError::PacketTooBig {
                len: declared,
                max: self.max_decompressed,
            });
        }

        let decompressed = match self.kind {
            CompressionKind::Lz4 => lz4_flex::block::decompress(body, declared)
                .map_err(|_| ProtocolError::DecompressionFailure)?,
            CompressionKind::Zstd => decompress_zstd(body, self.max_decompressed)?,
        };

        if self.validate && decompressed.len() != declared {
            return Err(ProtocolError::DecompressionSizeMismatch {
                declared,
                actual: decompressed.len(),
            });
        }
        Ok(Bytes::from(decompressed))
    }
}

/// Chunked zstd decode so the size limit is enforced while reading.
fn decompress_zstd(data: &[u8], max: usize) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::new();
    let mut reader =
        zstd::stream::Decoder::new(data).map_err(|_| ProtocolError::DecompressionFailure)?;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&chunk[..n]);
                if out.len() > max {
                    return Err(ProtocolError::PacketTooBig {
                        len: out.len(),
                        max,
                    });
                }
            }
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }
    Ok(out)
}

fn write_varint(out: &mut BytesMut, v: i32) {
    let mut value = v as u32;
    loop {
        if value & !0x7F == 0 {
            out.put_u8(value as u8);
            return;
        }
        out.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
}

fn read_varint(data: &[u8]) -> Result<(i32, usize)> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = *data.get(i).ok_or(ProtocolError::BufferUnderflow {
            needed: i + 1,
            remaining: data.len(),
        })?;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as i32, i + 1));
        }
    }
    Err(ProtocolError::MalformedVarInt)
}
