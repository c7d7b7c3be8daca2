//! VFS types: listing rows, volume summaries and health reports.

use crate::vfs::entry::DirEntry;
use serde::Serialize;
use std::path::PathBuf;

/// A directory entry for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Rendered name, e.g. `report~1.txt`.
    pub display_name: String,
    /// Byte offset of the entry in the container; identifies the entry.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
    /// First cluster of the content chain.
    pub starting_cluster: u32,
    /// Whether the content is password protected.
    pub has_password: bool,
}

impl EntryInfo {
    /// Create from a decoded entry.
    pub fn from_entry(offset: u64, entry: &DirEntry) -> Self {
        Self {
            display_name: entry.display_name(),
            offset,
            size: entry.file_size as u64,
            starting_cluster: entry.starting_cluster,
            has_password: entry.has_password,
        }
    }
}

/// Volume information summary.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeInfo {
    pub path: PathBuf,
    pub bytes_per_sector: u16,
    pub cluster_size: u64,
    pub volume_size: u64,
    pub total_clusters: u32,
    pub free_clusters: usize,
    pub directory_clusters: usize,
    pub file_count: usize,
    pub deleted_count: usize,
    pub total_file_size: u64,
    pub has_password: bool,
}

/// Result of a consistency scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    /// Live entries checked.
    pub live_files: usize,
    /// Restorable deleted entries checked.
    pub restorable_files: usize,
    /// Entries whose chain is broken, looping, or too short for the size.
    pub corrupt_entries: Vec<String>,
    /// Clusters reachable from more than one chain.
    pub cross_linked_clusters: Vec<u32>,
    /// Allocated clusters no chain reaches.
    pub orphaned_clusters: Vec<u32>,
    /// Free data clusters.
    pub free_clusters: usize,
}

impl HealthReport {
    /// No corruption, cross links or leaks.
    pub fn is_healthy(&self) -> bool {
        self.corrupt_entries.is_empty()
            && self.cross_linked_clusters.is_empty()
            && self.orphaned_clusters.is_empty()
    }
}
