//! Cryptographic operations for fat-vault.
//!
//! This module provides:
//! - Argon2id password-based key derivation with fixed salts
//! - XChaCha20-Poly1305 in-place encryption with detached tags

mod cipher;
mod kdf;

pub use cipher::{open_with_key, seal_with_key, Cipher};
pub use kdf::{container_verifier, constant_time_eq, validate_password, FileKey, KeyDerivation};
