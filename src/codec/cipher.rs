//! # Cipher Stage
//!
//! Symmetric stream transform over raw bytes, installed once a session key exists.
//!
//! The stage keeps a continuous ChaCha20 keystream, so bytes can be transformed
//! at whatever split points the transport delivers them. Encryption and
//! decryption are independent stage instances; installation happens exactly once
//! per connection and there is no re-keying.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// One direction of a session's stream cipher.
pub struct CipherStage {
    cipher: ChaCha20,
}

impl CipherStage {
    pub fn new(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        Self {
            cipher: ChaCha20::new(Key::from_slice(key), Nonce::from_slice(nonce)),
        }
    }

    /// Transform bytes in place, advancing the keystream.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
    }
}

impl std::fmt::Debug for CipherStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherStage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_whole_buffer() {
        let key = [0x42u8; KEY_LEN];
        let nonce = [0x07u8; NONCE_LEN];
        let mut enc = CipherStage::new(&key, &nonce);
        let mut dec = CipherStage::new(&key, &nonce);

        let plain = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut wire = plain.clone();
        enc.apply(&mut wire);
        assert_ne!(wire, plain);
        dec.apply(&mut wire);
        assert_eq!(wire, plain);
    }

    #[test]
    fn keystream_survives_arbitrary_split_points() {
        let key = [0x11u8; KEY_LEN];
        let nonce = [0x99u8; NONCE_LEN];
        let mut enc = CipherStage::new(&key, &nonce);
        let mut dec = CipherStage::new(&key, &nonce);

        let plain: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut wire = plain.clone();
        // Encrypt in one shot, decrypt in ragged chunks.
        enc.apply(&mut wire);
        let mut offset = 0;
        for chunk in [1usize, 7, 64, 128, 300, 500] {
            let end = (offset + chunk).min(wire.len());
            dec.apply(&mut wire[offset..end]);
            offset = end;
        }
        dec.apply(&mut wire[offset..]);
        assert_eq!(wire, plain);
    }

    #[test]
    fn different_keys_disagree() {
        let nonce = [0u8; NONCE_LEN];
        let mut a = CipherStage::new(&[1u8; KEY_LEN], &nonce);
        let mut b = CipherStage::new(&[2u8; KEY_LEN], &nonce);

        let mut wire = vec![0u8; 64];
        a.apply(&mut wire);
        b.apply(&mut wire);
        assert_ne!(wire, vec![0u8; 64]);
    }
}
