//! FAT-style Virtual File System
//!
//! A single host file holds a self-contained volume: a boot sector, a
//! cluster allocation table and a data region whose first cluster chain is
//! the root directory.
//!
//! # Features
//!
//! - **Soft delete**: Deleted entries keep their chain and can be restored
//! - **Short names**: Every name carries a `~N` disambiguator
//! - **Per-file encryption**: XChaCha20-Poly1305 with Argon2id-derived keys
//! - **Container password**: Advisory gate checked by the caller
//! - **Consistency check**: Detect broken, cross-linked and orphaned chains
//!
//! # Layout
//!
//! ```text
//! [boot sector][reserved][allocation table][cluster 2 = root][cluster 3..]
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use fat_vault::{FormatConfig, Volume};
//! use std::path::Path;
//!
//! let mut vol = Volume::format(Path::new("vault.dat"), &FormatConfig::default()).unwrap();
//!
//! let entry = vol.import_bytes("secret", "txt", b"Hidden data", Some("pw")).unwrap();
//! assert_eq!(entry.display_name, "secret~1.txt");
//!
//! let data = vol.export(entry.offset, Some("pw")).unwrap();
//! assert_eq!(data, b"Hidden data");
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod vfs;

pub use config::FormatConfig;
pub use error::{Error, Result};
pub use vfs::Volume;
