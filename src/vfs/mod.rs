//! Virtual file system over a container.
//!
//! The root directory, the naming engine and the orchestrating [`Volume`].

mod directory;
mod entry;
mod naming;
mod operations;
mod types;

pub use directory::{NameKey, RootDirectory};
pub use entry::{DirEntry, SlotState};
pub use naming::{extract_index, reassign, render, ShortName};
pub use operations::{Volume, ROOT_DIRECTORY};
pub use types::{EntryInfo, HealthReport, VolumeInfo};
