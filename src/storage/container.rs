//! The storage session: one open container file and its boot sector.
//!
//! All byte-level I/O goes through here. Cluster content is addressed via
//! the geometry; file content is copied cluster by cluster.

use crate::config::{BOOT_SECTOR_SIZE, EOF_MARK, FormatConfig, STARTING_CLUSTER};
use crate::error::{Error, Result};
use crate::storage::boot_sector::{BootSector, Geometry};
use crate::storage::fat::AllocationTable;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Open container file.
#[derive(Debug)]
pub struct Container {
    file: File,
    path: PathBuf,
    boot: BootSector,
}

impl Container {
    /// Create and format a new container file.
    ///
    /// The file is sized to the full volume (sparse where the host allows),
    /// the boot sector is written, and cluster 2 becomes a one-cluster root
    /// directory chain.
    pub fn create(path: &Path, config: &FormatConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidGeometry)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::AlreadyInitialized(path.to_path_buf()),
                _ => Error::Io(e),
            })?;

        let geometry = Geometry::from(config);
        file.set_len(geometry.volume_bytes())?;

        let mut container = Self {
            file,
            path: path.to_path_buf(),
            boot: BootSector::new(geometry),
        };
        container.write_boot_sector()?;
        container.zero_cluster(STARTING_CLUSTER)?;
        AllocationTable::new(&geometry).set(&mut container, STARTING_CLUSTER, EOF_MARK)?;
        container.flush()?;

        debug!(
            "formatted {}: {} clusters of {} bytes",
            path.display(),
            geometry.cluster_count(),
            geometry.cluster_size()
        );
        Ok(container)
    }

    /// Open an existing container and read its boot sector.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::PathNotFound(path.to_path_buf()),
                _ => Error::Io(e),
            })?;

        let mut buf = [0u8; BOOT_SECTOR_SIZE];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                Error::InvalidGeometry("container shorter than a boot sector".to_string())
            }
            _ => Error::Io(e),
        })?;
        let boot = BootSector::from_bytes(&buf)?;

        let actual = file.metadata()?.len();
        let expected = boot.geometry.volume_bytes();
        if actual < expected {
            return Err(Error::InvalidGeometry(format!(
                "container is {} bytes, geometry needs {}",
                actual, expected
            )));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            boot,
        })
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Volume geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.boot.geometry
    }

    /// Boot sector.
    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    /// Allocation table view for this container.
    pub fn fat(&self) -> AllocationTable {
        AllocationTable::new(&self.boot.geometry)
    }

    /// Update the container password state and persist the boot sector.
    pub fn set_password_state(&mut self, verifier: Option<[u8; 32]>) -> Result<()> {
        match verifier {
            Some(v) => {
                self.boot.has_password = true;
                self.boot.password_verifier = v;
            }
            None => {
                self.boot.has_password = false;
                self.boot.password_verifier = [0u8; 32];
            }
        }
        self.write_boot_sector()
    }

    fn write_boot_sector(&mut self) -> Result<()> {
        let bytes = self.boot.to_bytes();
        self.write_range(0, &bytes)
    }

    /// Read `len` bytes at a linear offset.
    pub fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Write bytes at a linear offset.
    pub fn write_range(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Read a whole cluster.
    pub fn read_cluster(&mut self, cluster: u32) -> Result<Vec<u8>> {
        let offset = self.geometry().cluster_offset(cluster);
        let len = self.geometry().cluster_size() as usize;
        self.read_range(offset, len)
    }

    /// Overwrite a cluster with zeros.
    pub fn zero_cluster(&mut self, cluster: u32) -> Result<()> {
        let offset = self.geometry().cluster_offset(cluster);
        let zeros = vec![0u8; self.geometry().cluster_size() as usize];
        self.write_range(offset, &zeros)
    }

    /// Read `size` bytes of file content spread over `clusters`.
    pub fn read_file(&mut self, size: u64, clusters: &[u32]) -> Result<Vec<u8>> {
        let cluster_size = self.geometry().cluster_size();
        let mut data = Vec::with_capacity(size as usize);
        let mut remaining = size;

        for &cluster in clusters {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(cluster_size);
            let offset = self.geometry().cluster_offset(cluster);
            data.extend_from_slice(&self.read_range(offset, take as usize)?);
            remaining -= take;
        }

        if remaining > 0 {
            return Err(Error::CorruptChain(
                clusters.first().copied().unwrap_or(STARTING_CLUSTER),
            ));
        }
        Ok(data)
    }

    /// Write file content over `clusters`. The chain must have room for it.
    pub fn write_file(&mut self, data: &[u8], clusters: &[u32]) -> Result<()> {
        let cluster_size = self.geometry().cluster_size() as usize;
        let capacity = clusters.len() * cluster_size;
        if data.len() > capacity {
            return Err(Error::NotEnoughSpace {
                needed: self.geometry().clusters_for(data.len() as u64),
                available: clusters.len(),
            });
        }

        for (chunk, &cluster) in data.chunks(cluster_size).zip(clusters) {
            let offset = self.geometry().cluster_offset(cluster);
            self.write_range(offset, chunk)?;
        }
        Ok(())
    }

    /// Flush buffered writes to the backing store.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_container(dir: &TempDir) -> Container {
        Container::create(&dir.path().join("vol.dat"), &FormatConfig::compact(4, 16)).unwrap()
    }

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.dat");
        let geometry = {
            let c = Container::create(&path, &FormatConfig::compact(4, 16)).unwrap();
            *c.geometry()
        };

        let reopened = Container::open(&path).unwrap();
        assert_eq!(*reopened.geometry(), geometry);
        assert!(!reopened.boot_sector().has_password);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            geometry.volume_bytes()
        );
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.dat");
        std::fs::write(&path, b"occupied").unwrap();

        let result = Container::create(&path, &FormatConfig::compact(4, 16));
        assert!(matches!(result, Err(Error::AlreadyInitialized(_))));
    }

    #[test]
    fn test_open_missing_and_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.dat");
        assert!(matches!(
            Container::open(&path),
            Err(Error::PathNotFound(_))
        ));

        {
            small_container(&dir);
        }
        let path = dir.path().join("vol.dat");
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(2048).unwrap();
        assert!(matches!(
            Container::open(&path),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_file_content_spans_clusters() {
        let dir = TempDir::new().unwrap();
        let mut c = small_container(&dir);

        let data: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
        let clusters = [5, 3, 9];
        c.write_file(&data, &clusters).unwrap();

        assert_eq!(c.read_file(5000, &clusters).unwrap(), data);
        // The tail of cluster 3 holds bytes 2048..4096.
        assert_eq!(c.read_cluster(3).unwrap()[..], data[2048..4096]);
    }

    #[test]
    fn test_write_file_checks_capacity() {
        let dir = TempDir::new().unwrap();
        let mut c = small_container(&dir);

        let result = c.write_file(&[1u8; 3000], &[3]);
        assert!(matches!(result, Err(Error::NotEnoughSpace { .. })));
    }
}
