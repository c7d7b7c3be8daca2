//! Boot sector and the volume geometry derived from it.

use crate::config::{
    boot_layout, entry_layout::ENTRY_SIZE, FormatConfig, BOOT_SECTOR_SIZE, FAT_ENTRY_SIZE,
    STARTING_CLUSTER,
};
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Physical layout of a container. Written once at format time.
///
/// Every offset is computed from these five fields; nothing else on disk
/// stores a derived position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub sectors_before_table: u8,
    pub table_sectors: u16,
    pub volume_sectors: u32,
}

impl Geometry {
    /// Cluster size in bytes.
    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Byte offset of the allocation table.
    pub fn table_offset(&self) -> u64 {
        self.sectors_before_table as u64 * self.bytes_per_sector as u64
    }

    /// Allocation table size in bytes.
    pub fn table_bytes(&self) -> u64 {
        self.table_sectors as u64 * self.bytes_per_sector as u64
    }

    /// First sector of the data region (cluster 2).
    pub fn data_sector(&self) -> u64 {
        self.sectors_before_table as u64 + self.table_sectors as u64
    }

    /// Byte offset of a cluster.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        let sector = self.data_sector()
            + (cluster - STARTING_CLUSTER) as u64 * self.sectors_per_cluster as u64;
        sector * self.bytes_per_sector as u64
    }

    /// Total container size in bytes.
    pub fn volume_bytes(&self) -> u64 {
        self.volume_sectors as u64 * self.bytes_per_sector as u64
    }

    /// One past the last addressable cluster number.
    ///
    /// Bounded both by the data region and by the number of table entries.
    pub fn cluster_end(&self) -> u32 {
        let data_sectors = (self.volume_sectors as u64).saturating_sub(self.data_sector());
        let data_clusters = data_sectors / self.sectors_per_cluster as u64;
        let table_entries = self.table_bytes() / FAT_ENTRY_SIZE as u64;
        (STARTING_CLUSTER as u64 + data_clusters).min(table_entries) as u32
    }

    /// Number of addressable clusters, the root directory's included.
    pub fn cluster_count(&self) -> u32 {
        self.cluster_end().saturating_sub(STARTING_CLUSTER)
    }

    /// Directory entries that fit in one cluster.
    pub fn entries_per_cluster(&self) -> u64 {
        self.cluster_size() / ENTRY_SIZE as u64
    }

    /// Clusters needed to hold `size` bytes; an empty file still takes one.
    pub fn clusters_for(&self, size: u64) -> usize {
        (size.div_ceil(self.cluster_size())).max(1) as usize
    }

    /// Check the layout is usable.
    pub fn validate(&self) -> Result<()> {
        FormatConfig::from(*self)
            .validate()
            .map_err(Error::InvalidGeometry)
    }
}

impl From<&FormatConfig> for Geometry {
    fn from(config: &FormatConfig) -> Self {
        Self {
            bytes_per_sector: config.bytes_per_sector,
            sectors_per_cluster: config.sectors_per_cluster,
            sectors_before_table: config.sectors_before_table,
            table_sectors: config.table_sectors,
            volume_sectors: config.volume_sectors,
        }
    }
}

impl From<Geometry> for FormatConfig {
    fn from(geometry: Geometry) -> Self {
        FormatConfig::new(
            geometry.bytes_per_sector,
            geometry.sectors_per_cluster,
            geometry.sectors_before_table,
            geometry.table_sectors,
            geometry.volume_sectors,
        )
    }
}

/// The boot sector: geometry plus the container password state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub geometry: Geometry,
    pub has_password: bool,
    pub password_verifier: [u8; boot_layout::VERIFIER_SIZE],
}

impl BootSector {
    /// Fresh boot sector without a password.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            has_password: false,
            password_verifier: [0u8; boot_layout::VERIFIER_SIZE],
        }
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> [u8; BOOT_SECTOR_SIZE] {
        use boot_layout::*;

        let g = &self.geometry;
        let mut buf = [0u8; BOOT_SECTOR_SIZE];
        LittleEndian::write_u16(&mut buf[BYTES_PER_SECTOR_OFFSET..], g.bytes_per_sector);
        buf[SECTORS_PER_CLUSTER_OFFSET] = g.sectors_per_cluster;
        buf[SECTORS_BEFORE_TABLE_OFFSET] = g.sectors_before_table;
        LittleEndian::write_u16(&mut buf[TABLE_SECTORS_OFFSET..], g.table_sectors);
        LittleEndian::write_u32(&mut buf[VOLUME_SECTORS_OFFSET..], g.volume_sectors);
        buf[HAS_PASSWORD_OFFSET] = self.has_password as u8;
        buf[VERIFIER_OFFSET..VERIFIER_OFFSET + VERIFIER_SIZE]
            .copy_from_slice(&self.password_verifier);
        buf
    }

    /// Parse from the on-disk layout.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        use boot_layout::*;

        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(Error::InvalidGeometry(format!(
                "boot sector truncated to {} bytes",
                buf.len()
            )));
        }

        let geometry = Geometry {
            bytes_per_sector: LittleEndian::read_u16(&buf[BYTES_PER_SECTOR_OFFSET..]),
            sectors_per_cluster: buf[SECTORS_PER_CLUSTER_OFFSET],
            sectors_before_table: buf[SECTORS_BEFORE_TABLE_OFFSET],
            table_sectors: LittleEndian::read_u16(&buf[TABLE_SECTORS_OFFSET..]),
            volume_sectors: LittleEndian::read_u32(&buf[VOLUME_SECTORS_OFFSET..]),
        };
        geometry.validate()?;

        let mut password_verifier = [0u8; VERIFIER_SIZE];
        password_verifier.copy_from_slice(&buf[VERIFIER_OFFSET..VERIFIER_OFFSET + VERIFIER_SIZE]);

        Ok(Self {
            geometry,
            has_password: buf[HAS_PASSWORD_OFFSET] != 0,
            password_verifier,
        })
    }
}
