//! The allocation table: cluster links, chain walks and free-space search.

use crate::config::{EOF_MARK, FAT_ENTRY_SIZE, FREE_CLUSTER, STARTING_CLUSTER};
use crate::error::{Error, Result};
use crate::storage::boot_sector::Geometry;
use crate::storage::container::Container;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

/// View over the allocation table of a container.
///
/// Holds only offsets derived from the geometry; every access goes through
/// the `Container` passed in.
#[derive(Debug, Clone, Copy)]
pub struct AllocationTable {
    offset: u64,
    end: u32,
}

impl AllocationTable {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            offset: geometry.table_offset(),
            end: geometry.cluster_end(),
        }
    }

    /// First cluster available for file data.
    pub fn first_data_cluster(&self) -> u32 {
        STARTING_CLUSTER + 1
    }

    /// One past the last addressable cluster.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Whether `cluster` lies in the addressable range.
    pub fn contains(&self, cluster: u32) -> bool {
        (STARTING_CLUSTER..self.end).contains(&cluster)
    }

    fn entry_offset(&self, cluster: u32) -> u64 {
        self.offset + cluster as u64 * FAT_ENTRY_SIZE as u64
    }

    /// Read the table entry for `cluster`.
    pub fn get(&self, dev: &mut Container, cluster: u32) -> Result<u32> {
        let buf = dev.read_range(self.entry_offset(cluster), FAT_ENTRY_SIZE)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Write the table entry for `cluster`.
    pub fn set(&self, dev: &mut Container, cluster: u32, value: u32) -> Result<()> {
        let mut buf = [0u8; FAT_ENTRY_SIZE];
        LittleEndian::write_u32(&mut buf, value);
        dev.write_range(self.entry_offset(cluster), &buf)
    }

    /// Read every entry of the addressable range at once, indexed by cluster.
    pub fn snapshot(&self, dev: &mut Container) -> Result<Vec<u32>> {
        let len = self.end as usize * FAT_ENTRY_SIZE;
        let raw = dev.read_range(self.offset, len)?;
        Ok(raw
            .chunks_exact(FAT_ENTRY_SIZE)
            .map(LittleEndian::read_u32)
            .collect())
    }

    /// Follow the chain starting at `start`.
    ///
    /// Returns an empty chain when `start` was never allocated. The walk is
    /// bounded by the cluster count so a looping table cannot hang it.
    pub fn chain_of(&self, dev: &mut Container, start: u32) -> Result<Vec<u32>> {
        if !self.contains(start) {
            return Ok(Vec::new());
        }

        let mut chain = Vec::new();
        let mut current = start;
        let limit = (self.end - STARTING_CLUSTER) as usize;

        loop {
            let next = self.get(dev, current)?;
            if next == FREE_CLUSTER {
                if chain.is_empty() {
                    return Ok(chain);
                }
                return Err(Error::CorruptChain(start));
            }

            chain.push(current);
            if chain.len() > limit {
                return Err(Error::CorruptChain(start));
            }

            if next == EOF_MARK {
                return Ok(chain);
            }
            if !self.contains(next) {
                return Err(Error::CorruptChain(start));
            }
            current = next;
        }
    }

    /// Find the `n` lowest free data clusters without modifying the table.
    pub fn free_clusters(&self, dev: &mut Container, n: usize) -> Result<Vec<u32>> {
        let table = self.snapshot(dev)?;
        let first = self.first_data_cluster() as usize;

        let found: Vec<u32> = table
            .iter()
            .enumerate()
            .skip(first)
            .filter(|(_, value)| **value == FREE_CLUSTER)
            .map(|(cluster, _)| cluster as u32)
            .take(n)
            .collect();

        if found.len() < n {
            return Err(Error::NotEnoughSpace {
                needed: n,
                available: found.len(),
            });
        }

        debug!("found {} free clusters: {:?}", n, found);
        Ok(found)
    }

    /// Count free data clusters.
    pub fn count_free(&self, dev: &mut Container) -> Result<usize> {
        let table = self.snapshot(dev)?;
        Ok(table
            .iter()
            .skip(self.first_data_cluster() as usize)
            .filter(|&&value| value == FREE_CLUSTER)
            .count())
    }

    /// Link `clusters` into a chain ending in `EOF_MARK`.
    ///
    /// Not atomic: an interrupted call leaves a partial chain.
    pub fn link_chain(&self, dev: &mut Container, clusters: &[u32]) -> Result<()> {
        for pair in clusters.windows(2) {
            self.set(dev, pair[0], pair[1])?;
        }
        if let Some(&last) = clusters.last() {
            self.set(dev, last, EOF_MARK)?;
        }
        Ok(())
    }

    /// Mark every cluster of a chain free.
    pub fn release_chain(&self, dev: &mut Container, clusters: &[u32]) -> Result<()> {
        for &cluster in clusters {
            self.set(dev, cluster, FREE_CLUSTER)?;
        }
        debug!("released {} clusters", clusters.len());
        Ok(())
    }
}
