//! Argon2id key derivation for container and file passwords.

use crate::config::{argon2_params, crypto_params, MAX_PASSWORD_LEN};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};

/// Key derivation using Argon2id with a fixed salt.
///
/// The salt is part of the on-disk format: a verifier written by one build
/// must be reproducible by the next, so no per-container randomness is used.
#[derive(Debug, Clone, Copy)]
pub struct KeyDerivation {
    salt: &'static [u8; 16],
}

impl KeyDerivation {
    /// KDF for the container password verifier.
    pub fn container() -> Self {
        Self {
            salt: crypto_params::CONTAINER_SALT,
        }
    }

    /// KDF for file keys and file verifiers.
    pub fn file() -> Self {
        Self {
            salt: crypto_params::FILE_SALT,
        }
    }

    /// Derive a 256-bit value from arbitrary input bytes.
    pub fn derive(&self, input: &[u8]) -> Result<[u8; 32]> {
        let params = Params::new(
            argon2_params::MEMORY_COST,
            argon2_params::TIME_COST,
            argon2_params::PARALLELISM,
            Some(argon2_params::OUTPUT_LENGTH),
        )
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = [0u8; 32];
        argon2
            .hash_password_into(input, self.salt, &mut out)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        Ok(out)
    }

    /// Derive a 256-bit key from a password.
    pub fn derive_key(&self, password: &str) -> Result<[u8; 32]> {
        validate_password(password)?;
        self.derive(password.as_bytes())
    }
}

/// Check a password fits the fixed password buffer.
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::InvalidPassword("password is empty".to_string()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(Error::InvalidPassword(format!(
            "password longer than {} bytes",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Key and verifier derived from a file password.
///
/// The key encrypts content and is never persisted; only `verifier`
/// (the key hashed once more) is written to the entry.
#[derive(Clone)]
pub struct FileKey {
    pub key: [u8; 32],
    pub verifier: [u8; 32],
}

impl FileKey {
    /// Derive the key and its verifier from a password.
    pub fn derive(password: &str) -> Result<Self> {
        let kdf = KeyDerivation::file();
        let key = kdf.derive_key(password)?;
        let verifier = kdf.derive(&key)?;
        Ok(Self { key, verifier })
    }

    /// Check the derived verifier against a stored one.
    pub fn matches(&self, stored: &[u8; 32]) -> bool {
        constant_time_eq(&self.verifier, stored)
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey").finish_non_exhaustive()
    }
}

/// Derive the verifier stored in the boot sector for a container password.
pub fn container_verifier(password: &str) -> Result<[u8; 32]> {
    KeyDerivation::container().derive_key(password)
}

/// Compare two digests without early exit.
pub fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
