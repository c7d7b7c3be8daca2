//! Host file access: the source of imports and the target of exports.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// A host file read into memory for import.
#[derive(Debug, Clone)]
pub struct HostFile {
    /// File name without extension.
    pub name: String,
    /// Extension without the dot (may be empty).
    pub extension: String,
    /// File content.
    pub data: Vec<u8>,
}

impl HostFile {
    /// Read a host file.
    pub fn read(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName(path.display().to_string()))?;
        let (name, extension) = split_file_name(file_name);

        let data = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::PathNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        Ok(Self {
            name: name.to_string(),
            extension: extension.to_string(),
            data,
        })
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Split `report.txt` into (`report`, `txt`).
///
/// The last dot separates the extension; a leading dot (`.profile`) is part
/// of the name.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos + 1..]),
        _ => (file_name, ""),
    }
}

/// Write exported content to a host path.
pub fn write_host_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data)?;
    Ok(())
}
