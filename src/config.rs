//! Format constants and configuration types for fat-vault.

use serde::{Deserialize, Serialize};

/// Default sector size in bytes.
pub const DEFAULT_BYTES_PER_SECTOR: u16 = 512;

/// Default sectors per cluster (2 KiB clusters).
pub const DEFAULT_SECTORS_PER_CLUSTER: u8 = 4;

/// Default number of sectors between the boot sector and the table.
pub const DEFAULT_SECTORS_BEFORE_TABLE: u8 = 1;

/// Default allocation table size in sectors.
pub const DEFAULT_TABLE_SECTORS: u16 = 4081;

/// Default volume size in sectors (1 GiB with 512-byte sectors).
pub const DEFAULT_VOLUME_SECTORS: u32 = 2_097_152;

/// First cluster number; also the first root directory cluster.
pub const STARTING_CLUSTER: u32 = 2;

/// Allocation table value for a free cluster.
pub const FREE_CLUSTER: u32 = 0;

/// Allocation table value terminating a chain.
pub const EOF_MARK: u32 = 268_435_455;

/// Size of one allocation table entry in bytes.
pub const FAT_ENTRY_SIZE: usize = 4;

/// Bytes of the boot sector that carry fields.
pub const BOOT_SECTOR_SIZE: usize = 64;

/// Maximum password length in bytes.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Attempts allowed by the container password gate.
pub const UNLOCK_ATTEMPTS: u32 = 3;

/// Largest numeric disambiguator the naming engine will try.
pub const MAX_DISAMBIGUATOR: u32 = 999_999;

/// Directory entry layout.
pub mod entry_layout {
    /// Total record size.
    pub const ENTRY_SIZE: usize = 128;

    pub const NAME_OFFSET: usize = 0;
    pub const NAME_SIZE: usize = 48;
    pub const EXT_OFFSET: usize = 48;
    pub const EXT_SIZE: usize = 4;
    pub const RESERVED_OFFSET: usize = 52;
    pub const RESERVED_SIZE: usize = 4;
    pub const NAME_LEN_OFFSET: usize = 56;
    pub const STARTING_CLUSTER_OFFSET: usize = 60;
    pub const FILE_SIZE_OFFSET: usize = 64;
    pub const HAS_PASSWORD_OFFSET: usize = 68;
    pub const HASHED_PASSWORD_OFFSET: usize = 80;
    pub const HASH_SIZE: usize = 32;
    pub const MAC_OFFSET: usize = 112;
    pub const MAC_SIZE: usize = 16;

    /// First name byte of a slot that was never used.
    pub const SLOT_UNUSED: u8 = 0x00;

    /// First name byte of a soft-deleted entry.
    pub const SLOT_DELETED: u8 = 0xE5;

    /// Stand-in for a real leading 0xE5 byte.
    pub const E5_ESCAPE: u8 = 0x05;

    /// Disambiguator marker.
    pub const SUFFIX_MARKER: u8 = b'~';
}

/// Boot sector layout.
pub mod boot_layout {
    pub const BYTES_PER_SECTOR_OFFSET: usize = 0;
    pub const SECTORS_PER_CLUSTER_OFFSET: usize = 2;
    pub const SECTORS_BEFORE_TABLE_OFFSET: usize = 3;
    pub const TABLE_SECTORS_OFFSET: usize = 4;
    pub const VOLUME_SECTORS_OFFSET: usize = 6;
    pub const HAS_PASSWORD_OFFSET: usize = 10;
    pub const VERIFIER_OFFSET: usize = 32;
    pub const VERIFIER_SIZE: usize = 32;
}

/// Argon2id parameters for key derivation.
pub mod argon2_params {
    /// Memory cost in KiB (19 MiB).
    pub const MEMORY_COST: u32 = 19_456;

    /// Time cost (iterations).
    pub const TIME_COST: u32 = 2;

    /// Parallelism factor.
    pub const PARALLELISM: u32 = 1;

    /// Output length in bytes (256 bits).
    pub const OUTPUT_LENGTH: usize = 32;
}

/// Fixed crypto inputs. Changing any of these breaks existing containers.
pub mod crypto_params {
    /// Salt for the container password verifier.
    pub const CONTAINER_SALT: &[u8; 16] = b"fat-vault:volume";

    /// Salt for file keys and file verifiers.
    pub const FILE_SALT: &[u8; 16] = b"fat-vault:entry!";

    /// Nonce shared by every encrypted file.
    pub const FIXED_NONCE: [u8; 24] = [0u8; 24];

    /// XChaCha20-Poly1305 nonce size.
    pub const NONCE_SIZE: usize = 24;

    /// Poly1305 tag size.
    pub const TAG_SIZE: usize = 16;
}

/// Geometry chosen when formatting a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Sector size in bytes.
    pub bytes_per_sector: u16,

    /// Sectors per allocation cluster.
    pub sectors_per_cluster: u8,

    /// Sectors reserved before the allocation table (boot sector included).
    pub sectors_before_table: u8,

    /// Allocation table size in sectors.
    pub table_sectors: u16,

    /// Total container size in sectors.
    pub volume_sectors: u32,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            bytes_per_sector: DEFAULT_BYTES_PER_SECTOR,
            sectors_per_cluster: DEFAULT_SECTORS_PER_CLUSTER,
            sectors_before_table: DEFAULT_SECTORS_BEFORE_TABLE,
            table_sectors: DEFAULT_TABLE_SECTORS,
            volume_sectors: DEFAULT_VOLUME_SECTORS,
        }
    }
}

impl FormatConfig {
    /// Create a configuration with custom geometry.
    pub fn new(
        bytes_per_sector: u16,
        sectors_per_cluster: u8,
        sectors_before_table: u8,
        table_sectors: u16,
        volume_sectors: u32,
    ) -> Self {
        Self {
            bytes_per_sector,
            sectors_per_cluster,
            sectors_before_table,
            table_sectors,
            volume_sectors,
        }
    }

    /// Smallest configuration holding `data_clusters` clusters of
    /// `sectors_per_cluster` 512-byte sectors, with a one-sector table.
    pub fn compact(sectors_per_cluster: u8, data_clusters: u32) -> Self {
        Self {
            bytes_per_sector: DEFAULT_BYTES_PER_SECTOR,
            sectors_per_cluster,
            sectors_before_table: DEFAULT_SECTORS_BEFORE_TABLE,
            table_sectors: 1,
            volume_sectors: 2 + data_clusters * sectors_per_cluster as u32,
        }
    }

    /// Size of a cluster in bytes.
    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.bytes_per_sector < BOOT_SECTOR_SIZE as u16 || !self.bytes_per_sector.is_power_of_two()
        {
            return Err(format!(
                "Bytes per sector must be a power of 2 and at least {}",
                BOOT_SECTOR_SIZE
            ));
        }
        if self.sectors_per_cluster == 0 {
            return Err("Sectors per cluster must be greater than 0".to_string());
        }
        if self.sectors_before_table == 0 {
            return Err("At least one sector must precede the table".to_string());
        }
        if self.table_sectors == 0 {
            return Err("Table size must be greater than 0".to_string());
        }
        if self.cluster_size() % entry_layout::ENTRY_SIZE as u64 != 0 {
            return Err(format!(
                "Cluster size must be a multiple of {} bytes",
                entry_layout::ENTRY_SIZE
            ));
        }
        let data_start = self.sectors_before_table as u64 + self.table_sectors as u64;
        if (self.volume_sectors as u64) < data_start + self.sectors_per_cluster as u64 {
            return Err("Volume too small to hold the table and one cluster".to_string());
        }
        let table_entries =
            self.table_sectors as u64 * self.bytes_per_sector as u64 / FAT_ENTRY_SIZE as u64;
        if table_entries <= STARTING_CLUSTER as u64 {
            return Err("Table too small to address any cluster".to_string());
        }
        Ok(())
    }
}
