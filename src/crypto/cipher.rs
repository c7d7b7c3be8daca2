//! XChaCha20-Poly1305 content encryption with detached tags.
//!
//! Ciphertext has the same length as the plaintext so encrypted files keep
//! their cluster footprint; the 16-byte tag lives in the directory entry.
//!
//! Every file is sealed under the same fixed nonce. This is only sound while
//! no two files share a password, since equal passwords give equal keys. The
//! scheme is kept as-is because changing it would break existing containers.

use crate::config::crypto_params::{FIXED_NONCE, TAG_SIZE};
use crate::error::{Error, Result};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};

/// XChaCha20-Poly1305 cipher wrapper.
pub struct Cipher {
    cipher: XChaCha20Poly1305,
}

impl Cipher {
    /// Create a new cipher from a derived key.
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
        Self { cipher }
    }

    /// Encrypt `buffer` in place and return the authentication tag.
    pub fn seal(&self, buffer: &mut [u8]) -> Result<[u8; TAG_SIZE]> {
        let tag = self
            .cipher
            .encrypt_in_place_detached(XNonce::from_slice(&FIXED_NONCE), b"", buffer)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut mac = [0u8; TAG_SIZE];
        mac.copy_from_slice(&tag);
        Ok(mac)
    }

    /// Decrypt `buffer` in place, checking it against `mac`.
    pub fn open(&self, buffer: &mut [u8], mac: &[u8; TAG_SIZE]) -> Result<()> {
        self.cipher
            .decrypt_in_place_detached(
                XNonce::from_slice(&FIXED_NONCE),
                b"",
                buffer,
                Tag::from_slice(mac),
            )
            .map_err(|_| Error::IntegrityFailure)
    }
}

/// Encrypt content with a pre-derived key.
pub fn seal_with_key(buffer: &mut [u8], key: &[u8; 32]) -> Result<[u8; TAG_SIZE]> {
    Cipher::new(key).seal(buffer)
}

/// Decrypt content with a pre-derived key.
pub fn open_with_key(buffer: &mut [u8], key: &[u8; 32], mac: &[u8; TAG_SIZE]) -> Result<()> {
    Cipher::new(key).open(buffer, mac)
}
