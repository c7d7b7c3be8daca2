//! The root directory table: fixed-size entries stored in a cluster chain
//! rooted at `STARTING_CLUSTER`.
//!
//! Entries are always placed at the lowest reusable slot, so the first
//! never-used slot ends the table.

use crate::config::entry_layout::{ENTRY_SIZE, EXT_SIZE, NAME_SIZE};
use crate::config::{EOF_MARK, STARTING_CLUSTER};
use crate::error::{Error, Result};
use crate::storage::Container;
use crate::vfs::entry::{DirEntry, SlotState};
use crate::vfs::naming;
use crate::vfs::types::EntryInfo;
use log::{debug, info};
use std::collections::HashSet;

/// Name and extension fields of a live entry.
pub type NameKey = ([u8; NAME_SIZE], [u8; EXT_SIZE]);

/// Result of walking the table up to its end marker.
#[derive(Debug, Default)]
struct Scan {
    /// Used slots (live or deleted) in table order.
    slots: Vec<(u64, DirEntry)>,
    /// Offset of the first never-used slot, if the chain has one.
    first_unused: Option<u64>,
}

/// Operations on the root directory table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootDirectory;

impl RootDirectory {
    /// Clusters of the root chain.
    ///
    /// The root is allocated at format time, so an empty chain means the
    /// table was damaged.
    pub fn clusters(&self, dev: &mut Container) -> Result<Vec<u32>> {
        let chain = dev.fat().chain_of(dev, STARTING_CLUSTER)?;
        if chain.is_empty() {
            return Err(Error::CorruptChain(STARTING_CLUSTER));
        }
        Ok(chain)
    }

    fn scan(&self, dev: &mut Container) -> Result<Scan> {
        let mut scan = Scan::default();
        for cluster in self.clusters(dev)? {
            let base = dev.geometry().cluster_offset(cluster);
            let raw = dev.read_cluster(cluster)?;
            for (i, record) in raw.chunks_exact(ENTRY_SIZE).enumerate() {
                let offset = base + (i * ENTRY_SIZE) as u64;
                let entry = DirEntry::from_bytes(record)?;
                if entry.state() == SlotState::Unused {
                    scan.first_unused = Some(offset);
                    return Ok(scan);
                }
                scan.slots.push((offset, entry));
            }
        }
        Ok(scan)
    }

    /// Every used slot (live and deleted) with its offset.
    pub fn entries(&self, dev: &mut Container) -> Result<Vec<(u64, DirEntry)>> {
        Ok(self.scan(dev)?.slots)
    }

    /// List live entries, or restorable deleted entries.
    pub fn list(&self, dev: &mut Container, include_deleted: bool) -> Result<Vec<EntryInfo>> {
        Ok(self
            .entries(dev)?
            .into_iter()
            .filter(|(_, entry)| {
                if include_deleted {
                    entry.is_restorable()
                } else {
                    entry.state() == SlotState::Live
                }
            })
            .map(|(offset, entry)| EntryInfo::from_entry(offset, &entry))
            .collect())
    }

    /// Read the entry at `offset`, which must be a slot of the root chain.
    pub fn entry_at(&self, dev: &mut Container, offset: u64) -> Result<DirEntry> {
        let cluster_size = dev.geometry().cluster_size();
        let inside = self.clusters(dev)?.into_iter().any(|cluster| {
            let start = dev.geometry().cluster_offset(cluster);
            offset >= start
                && offset < start + cluster_size
                && (offset - start) % ENTRY_SIZE as u64 == 0
        });
        if !inside {
            return Err(Error::EntryNotFound(format!("no directory slot at offset {}", offset)));
        }

        let raw = dev.read_range(offset, ENTRY_SIZE)?;
        DirEntry::from_bytes(&raw)
    }

    /// Write an entry record to `offset`.
    pub fn insert(&self, dev: &mut Container, offset: u64, entry: &DirEntry) -> Result<()> {
        dev.write_range(offset, &entry.to_bytes())
    }

    /// Lowest reusable slot in the existing chain.
    pub fn find_free_slot(&self, dev: &mut Container) -> Result<Option<u64>> {
        let scan = self.scan(dev)?;
        let reusable = scan
            .slots
            .iter()
            .find(|(_, entry)| entry.is_reusable())
            .map(|(offset, _)| *offset);
        Ok(reusable.or(scan.first_unused))
    }

    /// Lowest reusable slot, growing the chain by one cluster if needed.
    pub fn find_free_slot_or_grow(&self, dev: &mut Container) -> Result<u64> {
        if let Some(offset) = self.find_free_slot(dev)? {
            return Ok(offset);
        }

        let fat = dev.fat();
        let chain = self.clusters(dev)?;
        let tail = *chain
            .last()
            .ok_or(Error::CorruptChain(STARTING_CLUSTER))?;
        let free = fat.free_clusters(dev, 1).map_err(|e| match e {
            Error::NotEnoughSpace { .. } => Error::DirectoryFull,
            other => other,
        })?;
        let cluster = free[0];

        dev.zero_cluster(cluster)?;
        fat.set(dev, cluster, EOF_MARK)?;
        fat.set(dev, tail, cluster)?;

        debug!("root directory grew into cluster {}", cluster);
        Ok(dev.geometry().cluster_offset(cluster))
    }

    /// Name keys of all live entries.
    pub fn live_names(&self, dev: &mut Container) -> Result<HashSet<NameKey>> {
        Ok(self
            .entries(dev)?
            .into_iter()
            .filter(|(_, entry)| entry.state() == SlotState::Live)
            .map(|(_, entry)| (entry.name, entry.extension))
            .collect())
    }

    /// Whether a live entry already uses this name and extension.
    pub fn duplicate_name_exists(
        &self,
        dev: &mut Container,
        name: &[u8; NAME_SIZE],
        extension: &[u8; EXT_SIZE],
    ) -> Result<bool> {
        Ok(self
            .entries(dev)?
            .iter()
            .any(|(_, e)| e.state() == SlotState::Live && e.name == *name && e.extension == *extension))
    }

    /// Soft-delete the live entry at `offset`.
    ///
    /// Password checks are the caller's job. An unrestorable delete also
    /// zeroes the content and returns its clusters to the free pool.
    pub fn soft_delete(&self, dev: &mut Container, offset: u64, restorable: bool) -> Result<DirEntry> {
        let mut entry = self.entry_at(dev, offset)?;
        if entry.state() != SlotState::Live {
            return Err(Error::EntryNotFound(format!("no live entry at offset {}", offset)));
        }

        let chain = if restorable {
            Vec::new()
        } else {
            dev.fat().chain_of(dev, entry.starting_cluster)?
        };

        entry.mark_deleted(restorable);
        self.insert(dev, offset, &entry)?;

        if !restorable {
            for &cluster in &chain {
                dev.zero_cluster(cluster)?;
            }
            dev.fat().release_chain(dev, &chain)?;
        }

        info!(
            "deleted entry at offset {} ({})",
            offset,
            if restorable { "restorable" } else { "permanent" }
        );
        Ok(entry)
    }

    /// Bring a restorable entry back, renaming it if its name was reused.
    pub fn restore(&self, dev: &mut Container, offset: u64) -> Result<DirEntry> {
        let mut entry = self.entry_at(dev, offset)?;
        if !entry.is_restorable() {
            return Err(Error::EntryNotFound(format!(
                "no restorable entry at offset {}",
                offset
            )));
        }
        if dev.fat().chain_of(dev, entry.starting_cluster)?.is_empty() {
            return Err(Error::CorruptChain(entry.starting_cluster));
        }

        entry.mark_live();

        let taken = self.live_names(dev)?;
        if taken.contains(&(entry.name, entry.extension)) {
            let short = naming::reassign(
                &entry.base_name(),
                &entry.name,
                entry.extension,
                |name, ext| Ok(taken.contains(&(*name, *ext))),
            )?;
            debug!("restored name collides, renumbered to ~{}", short.index);
            entry.set_name(short.name, short.name_len);
        }

        self.insert(dev, offset, &entry)?;
        info!("restored {} at offset {}", entry.display_name(), offset);
        Ok(entry)
    }
}
