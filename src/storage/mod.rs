//! Storage layer for the container file.
//!
//! This module handles:
//! - The boot sector and geometry
//! - Cluster-addressed reads and writes on the open container
//! - The allocation table
//! - Host file import/export

mod boot_sector;
mod container;
mod fat;
mod host;

pub use boot_sector::{BootSector, Geometry};
pub use container::Container;
pub use fat::AllocationTable;
pub use host::{split_file_name, write_host_file, HostFile};
