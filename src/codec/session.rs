//! # Session Pipeline
//!
//! The composed byte pipeline a connection speaks through.
//!
//! Inbound: `decrypt? → frame split → decompress?`. Outbound is the mirror,
//! composed at send time: `compress? → frame join → encrypt?`. Both stages are
//! optional slots evaluated on every call; installing or removing a stage is a
//! field assignment, not a pipeline-graph mutation.
//!
//! The decoder tracks how far the inbound buffer has already been decrypted so
//! repeated polls over the same partial frame never double-apply the keystream.

use crate::codec::cipher::CipherStage;
use crate::codec::compression::CompressionStage;
use crate::codec::frame::FrameCodec;
use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frame/cipher/compression pipeline as a tokio-util codec.
///
/// Yields and accepts whole packet payloads (`varint(packet_id)` + body).
#[derive(Debug, Default)]
pub struct SessionCodec {
    frame: FrameCodec,
    decrypt: Option<CipherStage>,
    encrypt: Option<CipherStage>,
    compression: Option<CompressionStage>,
    /// Bytes at the front of the inbound buffer already run through the cipher.
    decrypted: usize,
}

impl SessionCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            frame: FrameCodec::new(max_frame_size),
            ..Self::default()
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.decrypt.is_some()
    }

    pub fn compression(&self) -> Option<&CompressionStage> {
        self.compression.as_ref()
    }

    pub fn compression_mut(&mut self) -> Option<&mut CompressionStage> {
        self.compression.as_mut()
    }

    /// Install the cipher stages. Fails if a key was already installed.
    pub fn install_cipher(&mut self, decrypt: CipherStage, encrypt: CipherStage) -> Result<()> {
        if self.decrypt.is_some() || self.encrypt.is_some() {
            return Err(ProtocolError::EncryptionAlreadyEnabled);
        }
        self.decrypt = Some(decrypt);
        self.encrypt = Some(encrypt);
        Ok(())
    }

    /// Install or replace the compression stage.
    pub fn install_compression(&mut self, stage: CompressionStage) {
        self.compression = Some(stage);
    }

    /// Remove the compression stage entirely.
    pub fn remove_compression(&mut self) {
        self.compression = None;
    }
}

impl Decoder for SessionCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(cipher) = &mut self.decrypt {
            if src.len() > self.decrypted {
                cipher.apply(&mut src[self.decrypted..]);
                self.decrypted = src.len();
            }
        }

        let before = src.len();
        let frame = self.frame.decode(src)?;
        if self.decrypt.is_some() {
            self.decrypted -= before - src.len();
        }

        let Some(frame) = frame else {
            return Ok(None);
        };
        match &self.compression {
            Some(stage) => Ok(Some(stage.decode(&frame)?)),
            None => Ok(Some(frame.freeze())),
        }
    }
}

impl Encoder<Bytes> for SessionCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        let payload = match &self.compression {
            Some(stage) => stage.encode(&item)?,
            None => item,
        };
        let start = dst.len();
        self.frame.encode(payload, dst)?;
        if let Some(cipher) = &mut self.encrypt {
            cipher.apply(&mut dst[start..]);
        }
        Ok(())
    }
}
