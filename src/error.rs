//! Error types for fat-vault.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in container operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on the container or a host file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not enough free clusters for the request.
    #[error("Not enough space: need {needed} clusters, have {available}")]
    NotEnoughSpace { needed: usize, available: usize },

    /// No free directory slot and no cluster to grow the directory into.
    #[error("Directory is full")]
    DirectoryFull,

    /// Every disambiguator for this name is taken.
    #[error("No free disambiguator left for name: {0}")]
    DuplicateNameExhausted(String),

    /// Container or file password did not match.
    #[error("Wrong password")]
    WrongPassword,

    /// File exceeds what the volume can address.
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// Host-side import source missing.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A chain walk left the valid cluster range or looped.
    #[error("Corrupt cluster chain starting at cluster {0}")]
    CorruptChain(u32),

    /// Boot sector describes an impossible layout.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// File name or extension cannot be stored.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Password is empty or exceeds the password buffer.
    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    /// Container file already exists.
    #[error("Container already exists: {0}")]
    AlreadyInitialized(PathBuf),

    /// No entry of the expected kind at this location.
    #[error("No entry found: {0}")]
    EntryNotFound(String),

    /// Authentication tag mismatch on encrypted content.
    #[error("Integrity check failed: encrypted content is corrupted")]
    IntegrityFailure,

    /// Key derivation error.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
