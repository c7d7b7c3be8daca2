//! Directory entry record: a fixed 128-byte little-endian layout.

use crate::config::entry_layout::*;
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// State of a directory slot, read from the first name byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never written; no later slot is in use either.
    Unused,
    /// Soft-deleted.
    Deleted,
    /// Live entry.
    Live,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Rendered `base~N`, space padded. A leading 0xE5 is stored as 0x05.
    pub name: [u8; NAME_SIZE],
    /// Extension, zero filled.
    pub extension: [u8; EXT_SIZE],
    /// `reserved[0]` holds the true first name byte while soft-deleted.
    pub reserved: [u8; RESERVED_SIZE],
    /// Length of the base name before `~N`.
    pub name_len: u32,
    pub starting_cluster: u32,
    pub file_size: u32,
    pub has_password: bool,
    /// KDF(KDF(password)) for protected files.
    pub hashed_password: [u8; HASH_SIZE],
    /// AEAD tag of the encrypted content.
    pub mac: [u8; MAC_SIZE],
}

impl DirEntry {
    /// Build a live entry from a rendered name.
    pub fn new(
        name: [u8; NAME_SIZE],
        name_len: u32,
        extension: [u8; EXT_SIZE],
        starting_cluster: u32,
        file_size: u32,
    ) -> Self {
        let mut entry = Self {
            name,
            extension,
            reserved: [0u8; RESERVED_SIZE],
            name_len,
            starting_cluster,
            file_size,
            has_password: false,
            hashed_password: [0u8; HASH_SIZE],
            mac: [0u8; MAC_SIZE],
        };
        if entry.name[0] == SLOT_DELETED {
            entry.name[0] = E5_ESCAPE;
        }
        entry
    }

    /// Parse a record.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENTRY_SIZE {
            return Err(Error::Serialization(format!(
                "directory entry truncated to {} bytes",
                buf.len()
            )));
        }

        let mut name = [0u8; NAME_SIZE];
        name.copy_from_slice(&buf[NAME_OFFSET..NAME_OFFSET + NAME_SIZE]);
        let mut extension = [0u8; EXT_SIZE];
        extension.copy_from_slice(&buf[EXT_OFFSET..EXT_OFFSET + EXT_SIZE]);
        let mut reserved = [0u8; RESERVED_SIZE];
        reserved.copy_from_slice(&buf[RESERVED_OFFSET..RESERVED_OFFSET + RESERVED_SIZE]);
        let mut hashed_password = [0u8; HASH_SIZE];
        hashed_password
            .copy_from_slice(&buf[HASHED_PASSWORD_OFFSET..HASHED_PASSWORD_OFFSET + HASH_SIZE]);
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&buf[MAC_OFFSET..MAC_OFFSET + MAC_SIZE]);

        Ok(Self {
            name,
            extension,
            reserved,
            name_len: LittleEndian::read_u32(&buf[NAME_LEN_OFFSET..]),
            starting_cluster: LittleEndian::read_u32(&buf[STARTING_CLUSTER_OFFSET..]),
            file_size: LittleEndian::read_u32(&buf[FILE_SIZE_OFFSET..]),
            has_password: buf[HAS_PASSWORD_OFFSET] != 0,
            hashed_password,
            mac,
        })
    }

    /// Serialize to the on-disk layout. Padding is written as zeros.
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[NAME_OFFSET..NAME_OFFSET + NAME_SIZE].copy_from_slice(&self.name);
        buf[EXT_OFFSET..EXT_OFFSET + EXT_SIZE].copy_from_slice(&self.extension);
        buf[RESERVED_OFFSET..RESERVED_OFFSET + RESERVED_SIZE].copy_from_slice(&self.reserved);
        LittleEndian::write_u32(&mut buf[NAME_LEN_OFFSET..], self.name_len);
        LittleEndian::write_u32(&mut buf[STARTING_CLUSTER_OFFSET..], self.starting_cluster);
        LittleEndian::write_u32(&mut buf[FILE_SIZE_OFFSET..], self.file_size);
        buf[HAS_PASSWORD_OFFSET] = self.has_password as u8;
        buf[HASHED_PASSWORD_OFFSET..HASHED_PASSWORD_OFFSET + HASH_SIZE]
            .copy_from_slice(&self.hashed_password);
        buf[MAC_OFFSET..MAC_OFFSET + MAC_SIZE].copy_from_slice(&self.mac);
        buf
    }

    pub fn state(&self) -> SlotState {
        match self.name[0] {
            SLOT_UNUSED => SlotState::Unused,
            SLOT_DELETED => SlotState::Deleted,
            _ => SlotState::Live,
        }
    }

    /// A deleted entry that still remembers its first byte.
    pub fn is_restorable(&self) -> bool {
        self.state() == SlotState::Deleted && self.reserved[0] != 0
    }

    /// A slot that may be overwritten by a new entry.
    pub fn is_reusable(&self) -> bool {
        match self.state() {
            SlotState::Unused => true,
            SlotState::Deleted => self.reserved[0] == 0,
            SlotState::Live => false,
        }
    }

    /// Stored name bytes with the real first byte, as if the entry were live.
    fn true_name(&self) -> [u8; NAME_SIZE] {
        let mut name = self.name;
        if self.state() == SlotState::Deleted {
            name[0] = self.reserved[0];
        }
        if name[0] == E5_ESCAPE {
            name[0] = SLOT_DELETED;
        }
        name
    }

    /// Rendered name without padding, e.g. `report~1`.
    pub fn rendered_name(&self) -> Vec<u8> {
        let name = self.true_name();
        let end = name
            .iter()
            .rposition(|&b| b != b' ')
            .map(|p| p + 1)
            .unwrap_or(0);
        name[..end].to_vec()
    }

    /// The base name before the disambiguator.
    pub fn base_name(&self) -> Vec<u8> {
        let name = self.true_name();
        let len = (self.name_len as usize).min(NAME_SIZE);
        name[..len].to_vec()
    }

    /// Extension without zero fill.
    pub fn extension_str(&self) -> String {
        let end = self
            .extension
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(EXT_SIZE);
        String::from_utf8_lossy(&self.extension[..end]).into_owned()
    }

    /// `name~N.ext` as shown to users.
    pub fn display_name(&self) -> String {
        let name = String::from_utf8_lossy(&self.rendered_name()).into_owned();
        let ext = self.extension_str();
        if ext.is_empty() {
            name
        } else {
            format!("{}.{}", name, ext)
        }
    }

    /// Replace the rendered name, keeping the leading-0xE5 escape.
    pub fn set_name(&mut self, name: [u8; NAME_SIZE], name_len: u32) {
        self.name = name;
        self.name_len = name_len;
        if self.name[0] == SLOT_DELETED {
            self.name[0] = E5_ESCAPE;
        }
    }

    /// Mark deleted. A restorable delete remembers the first byte.
    pub fn mark_deleted(&mut self, restorable: bool) {
        self.reserved[0] = if restorable { self.name[0] } else { 0 };
        self.name[0] = SLOT_DELETED;
    }

    /// Undo a restorable delete.
    pub fn mark_live(&mut self) {
        self.name[0] = self.reserved[0];
        self.reserved[0] = 0;
    }

    /// Set or clear the password fields.
    pub fn set_protection(&mut self, protection: Option<([u8; HASH_SIZE], [u8; MAC_SIZE])>) {
        match protection {
            Some((verifier, mac)) => {
                self.has_password = true;
                self.hashed_password = verifier;
                self.mac = mac;
            }
            None => {
                self.has_password = false;
                self.hashed_password = [0u8; HASH_SIZE];
                self.mac = [0u8; MAC_SIZE];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(s: &str) -> [u8; NAME_SIZE] {
        let mut name = [b' '; NAME_SIZE];
        name[..s.len()].copy_from_slice(s.as_bytes());
        name
    }

    fn sample() -> DirEntry {
        DirEntry::new(padded("report~1"), 6, *b"txt\0", 3, 5000)
    }

    #[test]
    fn test_layout_offsets() {
        let mut entry = sample();
        entry.set_protection(Some(([0x11; 32], [0x22; 16])));
        let bytes = entry.to_bytes();

        assert_eq!(&bytes[0..8], b"report~1");
        assert_eq!(bytes[8], b' ');
        assert_eq!(&bytes[48..52], b"txt\0");
        assert_eq!(&bytes[56..60], &6u32.to_le_bytes());
        assert_eq!(&bytes[60..64], &3u32.to_le_bytes());
        assert_eq!(&bytes[64..68], &5000u32.to_le_bytes());
        assert_eq!(bytes[68], 1);
        assert_eq!(&bytes[69..80], &[0u8; 11]);
        assert_eq!(&bytes[80..112], &[0x11; 32]);
        assert_eq!(&bytes[112..128], &[0x22; 16]);

        assert_eq!(DirEntry::from_bytes(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_display_name() {
        let entry = sample();
        assert_eq!(entry.state(), SlotState::Live);
        assert_eq!(entry.display_name(), "report~1.txt");
        assert_eq!(entry.base_name(), b"report");

        let bare = DirEntry::new(padded("Makefile~2"), 8, [0u8; 4], 3, 0);
        assert_eq!(bare.display_name(), "Makefile~2");
    }

    #[test]
    fn test_delete_and_restore_state() {
        let mut entry = sample();
        entry.mark_deleted(true);
        assert_eq!(entry.name[0], SLOT_DELETED);
        assert_eq!(entry.reserved[0], b'r');
        assert!(entry.is_restorable());
        assert!(!entry.is_reusable());
        assert_eq!(entry.display_name(), "report~1.txt");

        entry.mark_live();
        assert_eq!(entry, sample());
    }

    #[test]
    fn test_unrestorable_delete_is_reusable() {
        let mut entry = sample();
        entry.mark_deleted(false);
        assert!(!entry.is_restorable());
        assert!(entry.is_reusable());
    }

    #[test]
    fn test_leading_e5_is_escaped() {
        // "大" is E5 A4 A7 in UTF-8.
        let entry = DirEntry::new(padded("大~1"), 3, *b"txt\0", 3, 1);
        assert_eq!(entry.name[0], E5_ESCAPE);
        assert_eq!(entry.state(), SlotState::Live);
        assert_eq!(entry.display_name(), "大~1.txt");
        assert_eq!(entry.base_name(), "大".as_bytes());
    }
}
