//! Volume operations - the main interface.
//!
//! Each operation consults the directory for placement and lookup, the
//! naming engine for collision-free names, the allocation table for chains,
//! the container for bytes, and the crypto layer for protected entries.
//! Mutations flush at the end; multi-step mutations are not atomic.

use crate::config::{FormatConfig, EOF_MARK, FREE_CLUSTER, STARTING_CLUSTER, UNLOCK_ATTEMPTS};
use crate::crypto::{constant_time_eq, container_verifier, open_with_key, seal_with_key, FileKey};
use crate::error::{Error, Result};
use crate::storage::{write_host_file, Container, HostFile};
use crate::vfs::directory::RootDirectory;
use crate::vfs::entry::{DirEntry, SlotState};
use crate::vfs::naming;
use crate::vfs::types::{EntryInfo, HealthReport, VolumeInfo};
use log::{debug, info, warn};
use std::path::Path;

/// Label of the root chain in a health report.
pub const ROOT_DIRECTORY: &str = "<root directory>";

/// An open container volume.
pub struct Volume {
    /// The storage session; every operation borrows it.
    container: Container,
    /// Root directory table.
    directory: RootDirectory,
}

impl Volume {
    /// Create and format a new container file.
    pub fn format(path: &Path, config: &FormatConfig) -> Result<Self> {
        let container = Container::create(path, config)?;
        info!("created container {}", path.display());
        Ok(Self {
            container,
            directory: RootDirectory,
        })
    }

    /// Open an existing container.
    ///
    /// Opening does not check the container password; call [`Volume::unlock`]
    /// or [`Volume::unlock_with`] before acting on a protected volume.
    pub fn mount(path: &Path) -> Result<Self> {
        let container = Container::open(path)?;
        debug!(
            "mounted {} ({} clusters of {} bytes)",
            path.display(),
            container.geometry().cluster_count(),
            container.geometry().cluster_size()
        );
        Ok(Self {
            container,
            directory: RootDirectory,
        })
    }

    /// The underlying storage session.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Whether the container carries an access password.
    pub fn has_container_password(&self) -> bool {
        self.container.boot_sector().has_password
    }

    /// Check a container password. Always true when none is set.
    pub fn check_container_password(&self, password: &str) -> Result<bool> {
        let boot = self.container.boot_sector();
        if !boot.has_password {
            return Ok(true);
        }
        let verifier = match container_verifier(password) {
            Ok(verifier) => verifier,
            Err(Error::InvalidPassword(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(constant_time_eq(&verifier, &boot.password_verifier))
    }

    /// Check the container password once.
    pub fn unlock(&self, password: &str) -> Result<()> {
        if self.check_container_password(password)? {
            Ok(())
        } else {
            Err(Error::WrongPassword)
        }
    }

    /// Password gate: ask `prompt` for up to three attempts.
    ///
    /// `prompt` receives the 1-based attempt number. Containers without a
    /// password are unlocked without prompting.
    pub fn unlock_with<F>(&self, mut prompt: F) -> Result<()>
    where
        F: FnMut(u32) -> Result<String>,
    {
        if !self.has_container_password() {
            return Ok(());
        }
        for attempt in 1..=UNLOCK_ATTEMPTS {
            let password = prompt(attempt)?;
            if matches!(self.check_container_password(&password), Ok(true)) {
                debug!("container unlocked on attempt {}", attempt);
                return Ok(());
            }
            warn!(
                "wrong container password (attempt {}/{})",
                attempt, UNLOCK_ATTEMPTS
            );
        }
        Err(Error::WrongPassword)
    }

    /// Set, change or remove the container password.
    ///
    /// `old` must match when a password is already set; `new = None`
    /// removes the password.
    pub fn set_container_password(&mut self, old: Option<&str>, new: Option<&str>) -> Result<()> {
        if self.has_container_password() {
            let old = old.ok_or(Error::WrongPassword)?;
            self.unlock(old)?;
        }

        let verifier = new.map(container_verifier).transpose()?;
        let enabled = verifier.is_some();
        self.container.set_password_state(verifier)?;
        self.container.flush()?;

        info!(
            "container password {}",
            if enabled { "set" } else { "removed" }
        );
        Ok(())
    }

    /// Live entries in directory order.
    pub fn list(&mut self) -> Result<Vec<EntryInfo>> {
        self.directory.list(&mut self.container, false)
    }

    /// Restorable deleted entries, with their original names.
    pub fn list_deleted(&mut self) -> Result<Vec<EntryInfo>> {
        self.directory.list(&mut self.container, true)
    }

    /// Find a live entry by its display name.
    pub fn find(&mut self, display_name: &str) -> Result<EntryInfo> {
        self.list()?
            .into_iter()
            .find(|e| e.display_name == display_name)
            .ok_or_else(|| Error::EntryNotFound(display_name.to_string()))
    }

    /// Find a restorable deleted entry by its display name.
    pub fn find_deleted(&mut self, display_name: &str) -> Result<EntryInfo> {
        self.list_deleted()?
            .into_iter()
            .find(|e| e.display_name == display_name)
            .ok_or_else(|| Error::EntryNotFound(display_name.to_string()))
    }

    /// Read the live entry at `offset`.
    pub fn entry(&mut self, offset: u64) -> Result<DirEntry> {
        let entry = self.directory.entry_at(&mut self.container, offset)?;
        if entry.state() != SlotState::Live {
            return Err(Error::EntryNotFound(format!("no live entry at offset {}", offset)));
        }
        Ok(entry)
    }

    /// Import a host file, optionally encrypting it under `password`.
    pub fn import_file(&mut self, path: &Path, password: Option<&str>) -> Result<EntryInfo> {
        let host = HostFile::read(path)?;
        debug!("importing {} ({} bytes)", path.display(), host.size());
        self.import_bytes(&host.name, &host.extension, &host.data, password)
    }

    /// Import raw content under `name.extension`.
    ///
    /// Name, size, space and directory checks all happen before the first
    /// write, so a rejected import leaves the container untouched.
    pub fn import_bytes(
        &mut self,
        name: &str,
        extension: &str,
        data: &[u8],
        password: Option<&str>,
    ) -> Result<EntryInfo> {
        naming::validate_base(name)?;
        let extension = naming::encode_extension(extension)?;

        let geometry = *self.container.geometry();
        let limit = (geometry.cluster_count() as u64 - 1) * geometry.cluster_size();
        let limit = limit.min(u32::MAX as u64);
        if data.len() as u64 > limit {
            return Err(Error::FileTooLarge {
                size: data.len() as u64,
                limit,
            });
        }

        let file_key = password.map(FileKey::derive).transpose()?;

        let taken = self.directory.live_names(&mut self.container)?;
        let short = naming::assign(name.as_bytes(), extension, 1, |n, e| {
            Ok(taken.contains(&(*n, *e)))
        })?;

        let fat = self.container.fat();
        let needed = geometry.clusters_for(data.len() as u64);
        let available = fat.count_free(&mut self.container)?;
        if available < needed {
            return Err(Error::NotEnoughSpace { needed, available });
        }
        let slot = match self.directory.find_free_slot(&mut self.container)? {
            Some(offset) => offset,
            None if available > needed => {
                self.directory.find_free_slot_or_grow(&mut self.container)?
            }
            None => return Err(Error::DirectoryFull),
        };
        let clusters = fat.free_clusters(&mut self.container, needed)?;

        let mut content = data.to_vec();
        let mut entry = DirEntry::new(
            short.name,
            short.name_len,
            short.extension,
            clusters[0],
            data.len() as u32,
        );
        if let Some(key) = &file_key {
            let mac = seal_with_key(&mut content, &key.key)?;
            entry.set_protection(Some((key.verifier, mac)));
        }

        if let Err(e) = self.store(slot, &entry, &content, &clusters) {
            warn!(
                "import of {} failed after allocating clusters {:?}; chain left orphaned: {}",
                entry.display_name(),
                clusters,
                e
            );
            return Err(e);
        }

        info!(
            "imported {} ({} bytes, {} clusters from {})",
            entry.display_name(),
            data.len(),
            clusters.len(),
            clusters[0]
        );
        Ok(EntryInfo::from_entry(slot, &entry))
    }

    /// Link, fill and reference a new chain. The entry goes last so an
    /// interruption leaves at worst an unreferenced chain.
    fn store(&mut self, slot: u64, entry: &DirEntry, content: &[u8], clusters: &[u32]) -> Result<()> {
        let fat = self.container.fat();
        fat.link_chain(&mut self.container, clusters)?;
        self.container.write_file(content, clusters)?;
        self.directory.insert(&mut self.container, slot, entry)?;
        self.container.flush()
    }

    /// Derive the file key for a protected entry, checking the verifier.
    fn authorize(entry: &DirEntry, password: Option<&str>) -> Result<Option<FileKey>> {
        if !entry.has_password {
            return Ok(None);
        }
        let password = password.ok_or(Error::WrongPassword)?;
        let key = FileKey::derive(password).map_err(|e| match e {
            Error::InvalidPassword(_) => Error::WrongPassword,
            other => other,
        })?;
        if !key.matches(&entry.hashed_password) {
            return Err(Error::WrongPassword);
        }
        Ok(Some(key))
    }

    /// Chain of an entry, checked against its size.
    fn content_chain(&mut self, entry: &DirEntry) -> Result<Vec<u32>> {
        let chain = self
            .container
            .fat()
            .chain_of(&mut self.container, entry.starting_cluster)?;
        let needed = self.container.geometry().clusters_for(entry.file_size as u64);
        if chain.len() < needed {
            return Err(Error::CorruptChain(entry.starting_cluster));
        }
        Ok(chain)
    }

    /// Check a file password without reading content.
    pub fn check_file_password(&mut self, offset: u64, password: &str) -> Result<bool> {
        let entry = self.entry(offset)?;
        match Self::authorize(&entry, Some(password)) {
            Ok(_) => Ok(true),
            Err(Error::WrongPassword) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read the content of the live entry at `offset`.
    pub fn export(&mut self, offset: u64, password: Option<&str>) -> Result<Vec<u8>> {
        let entry = self.entry(offset)?;
        let key = Self::authorize(&entry, password)?;

        let chain = self.content_chain(&entry)?;
        let mut data = self.container.read_file(entry.file_size as u64, &chain)?;
        if let Some(key) = key {
            open_with_key(&mut data, &key.key, &entry.mac)?;
        }

        debug!("exported {} ({} bytes)", entry.display_name(), data.len());
        Ok(data)
    }

    /// Export to a host path. Nothing is written unless the export succeeds.
    pub fn export_to(&mut self, offset: u64, dest: &Path, password: Option<&str>) -> Result<u64> {
        let data = self.export(offset, password)?;
        write_host_file(dest, &data)?;
        info!("exported {} bytes to {}", data.len(), dest.display());
        Ok(data.len() as u64)
    }

    /// Soft-delete the live entry at `offset`.
    ///
    /// Protected entries need their password. With `restorable = false` the
    /// content is wiped and its clusters freed.
    pub fn delete(&mut self, offset: u64, restorable: bool, password: Option<&str>) -> Result<()> {
        let entry = self.entry(offset)?;
        Self::authorize(&entry, password)?;

        self.directory
            .soft_delete(&mut self.container, offset, restorable)?;
        self.container.flush()
    }

    /// Restore a soft-deleted entry, renumbering its name on collision.
    pub fn restore(&mut self, offset: u64) -> Result<EntryInfo> {
        let entry = self.directory.restore(&mut self.container, offset)?;
        self.container.flush()?;
        Ok(EntryInfo::from_entry(offset, &entry))
    }

    /// Add, change or remove the password of the entry at `offset`.
    ///
    /// `old` must match when the entry is protected. Content is decrypted
    /// with the old key and re-sealed under `new`, or left in plaintext when
    /// `new` is `None`.
    pub fn set_file_password(
        &mut self,
        offset: u64,
        old: Option<&str>,
        new: Option<&str>,
    ) -> Result<()> {
        let mut entry = self.entry(offset)?;
        let old_key = Self::authorize(&entry, old)?;
        let new_key = new.map(FileKey::derive).transpose()?;

        let chain = self.content_chain(&entry)?;
        let mut data = self.container.read_file(entry.file_size as u64, &chain)?;
        if let Some(key) = &old_key {
            open_with_key(&mut data, &key.key, &entry.mac)?;
        }

        match &new_key {
            Some(key) => {
                let mac = seal_with_key(&mut data, &key.key)?;
                entry.set_protection(Some((key.verifier, mac)));
            }
            None => entry.set_protection(None),
        }

        self.container.write_file(&data, &chain)?;
        self.directory.insert(&mut self.container, offset, &entry)?;
        self.container.flush()?;

        info!(
            "password {} for {}",
            if new_key.is_some() { "set" } else { "removed" },
            entry.display_name()
        );
        Ok(())
    }

    /// Volume summary.
    pub fn info(&mut self) -> Result<VolumeInfo> {
        let geometry = *self.container.geometry();
        let live = self.list()?;
        let deleted = self.list_deleted()?;
        let directory_clusters = self.directory.clusters(&mut self.container)?.len();
        let free_clusters = self.container.fat().count_free(&mut self.container)?;

        Ok(VolumeInfo {
            path: self.container.path().to_path_buf(),
            bytes_per_sector: geometry.bytes_per_sector,
            cluster_size: geometry.cluster_size(),
            volume_size: geometry.volume_bytes(),
            total_clusters: geometry.cluster_count(),
            free_clusters,
            directory_clusters,
            file_count: live.len(),
            deleted_count: deleted.len(),
            total_file_size: live.iter().map(|e| e.size).sum(),
            has_password: self.has_container_password(),
        })
    }

    /// Walk every chain the directory references and cross-check the table.
    ///
    /// Live and restorable entries own their chains; every other allocated
    /// cluster is an orphan, typically left by an interrupted import.
    pub fn health_check(&mut self) -> Result<HealthReport> {
        let fat = self.container.fat();
        let table = fat.snapshot(&mut self.container)?;
        let end = fat.end();
        let mut owners = vec![0u32; end as usize];
        let mut report = HealthReport::default();

        let (root, root_ok) = walk_chain(&table, STARTING_CLUSTER, end);
        if !root_ok {
            // Entries cannot be located without the root chain.
            warn!("root directory chain is broken");
            report.corrupt_entries.push(ROOT_DIRECTORY.to_string());
            report.free_clusters = table[fat.first_data_cluster() as usize..]
                .iter()
                .filter(|&&value| value == FREE_CLUSTER)
                .count();
            return Ok(report);
        }
        for &cluster in &root {
            owners[cluster as usize] += 1;
        }

        let geometry = *self.container.geometry();
        for (offset, entry) in self.directory.entries(&mut self.container)? {
            match entry.state() {
                SlotState::Live => report.live_files += 1,
                SlotState::Deleted if entry.is_restorable() => report.restorable_files += 1,
                _ => continue,
            }

            let (chain, terminated) = walk_chain(&table, entry.starting_cluster, end);
            if !terminated || chain.len() < geometry.clusters_for(entry.file_size as u64) {
                warn!(
                    "entry {} at offset {} has a broken chain",
                    entry.display_name(),
                    offset
                );
                report.corrupt_entries.push(entry.display_name());
            }
            for &cluster in &chain {
                owners[cluster as usize] += 1;
            }
        }

        for cluster in fat.first_data_cluster()..end {
            let value = table[cluster as usize];
            let owned = owners[cluster as usize];
            if owned > 1 {
                report.cross_linked_clusters.push(cluster);
            }
            if value == FREE_CLUSTER {
                report.free_clusters += 1;
            } else if owned == 0 {
                report.orphaned_clusters.push(cluster);
            }
        }

        if !report.is_healthy() {
            warn!(
                "health check: {} corrupt entries, {} cross-linked, {} orphaned clusters",
                report.corrupt_entries.len(),
                report.cross_linked_clusters.len(),
                report.orphaned_clusters.len()
            );
        }
        Ok(report)
    }

    /// Free orphaned clusters. Returns how many were reclaimed.
    ///
    /// Refuses to touch the table while any chain is corrupt, since the tail
    /// of a broken chain looks orphaned too.
    pub fn reclaim_orphans(&mut self) -> Result<usize> {
        let report = self.health_check()?;
        if !report.corrupt_entries.is_empty() {
            warn!(
                "not reclaiming: corrupt entries {:?}",
                report.corrupt_entries
            );
            return Ok(0);
        }

        let fat = self.container.fat();
        fat.release_chain(&mut self.container, &report.orphaned_clusters)?;
        self.container.flush()?;

        info!("reclaimed {} orphaned clusters", report.orphaned_clusters.len());
        Ok(report.orphaned_clusters.len())
    }

    /// Flush pending writes.
    pub fn sync(&mut self) -> Result<()> {
        self.container.flush()
    }
}

/// Follow a chain through a table snapshot. Returns the clusters visited and
/// whether the walk ended cleanly at `EOF_MARK`.
fn walk_chain(table: &[u32], start: u32, end: u32) -> (Vec<u32>, bool) {
    let mut chain = Vec::new();
    let mut seen = vec![false; end as usize];
    let mut current = start;

    loop {
        if !(STARTING_CLUSTER..end).contains(&current) || seen[current as usize] {
            return (chain, false);
        }
        let next = table[current as usize];
        if next == FREE_CLUSTER {
            return (chain, false);
        }
        seen[current as usize] = true;
        chain.push(current);
        if next == EOF_MARK {
            return (chain, true);
        }
        current = next;
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        // Try to sync on drop
        let _ = self.container.flush();
    }
}
