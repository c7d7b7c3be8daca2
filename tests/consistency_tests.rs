//! Consistency tests: damaged allocation tables, orphaned chains and repair.

use fat_vault::config::{FormatConfig, EOF_MARK, FREE_CLUSTER};
use fat_vault::vfs::{Volume, ROOT_DIRECTORY};
use fat_vault::Error;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sector size and table position of `FormatConfig::compact`.
const SECTOR: u64 = 512;
const TABLE_OFFSET: u64 = SECTOR;

fn setup_volume() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("vault.dat");
    Volume::format(&path, &FormatConfig::compact(4, 16)).expect("Failed to format container");
    (temp_dir, path)
}

/// Overwrite one allocation table entry behind the volume's back.
fn poke_table(path: &Path, cluster: u32, value: u32) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(TABLE_OFFSET + cluster as u64 * 4))
        .unwrap();
    file.write_all(&value.to_le_bytes()).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_fresh_volume_is_healthy() {
    let (_temp_dir, path) = setup_volume();
    let mut vol = Volume::mount(&path).unwrap();

    vol.import_bytes("a", "txt", &[1u8; 3000], None).unwrap();
    let deleted = vol.import_bytes("b", "txt", &[2u8; 100], None).unwrap();
    vol.delete(deleted.offset, true, None).unwrap();

    let report = vol.health_check().unwrap();
    assert!(report.is_healthy());
    assert_eq!(report.live_files, 1);
    assert_eq!(report.restorable_files, 1);
    // 15 data clusters, 2 for a~1 and 1 for the restorable b~1
    assert_eq!(report.free_clusters, 12);
}

#[test]
fn test_orphaned_chain_is_reclaimed() {
    let (_temp_dir, path) = setup_volume();
    {
        let mut vol = Volume::mount(&path).unwrap();
        vol.import_bytes("keep", "bin", &[7u8; 2500], None).unwrap();
    }

    // Chain 9 -> 10 with no entry, as left by an interrupted import
    poke_table(&path, 9, 10);
    poke_table(&path, 10, EOF_MARK);

    let mut vol = Volume::mount(&path).unwrap();
    let report = vol.health_check().unwrap();
    assert_eq!(report.orphaned_clusters, vec![9, 10]);
    assert!(report.corrupt_entries.is_empty());

    assert_eq!(vol.reclaim_orphans().unwrap(), 2);
    assert!(vol.health_check().unwrap().is_healthy());

    let keep = vol.find("keep~1.bin").unwrap();
    assert_eq!(vol.export(keep.offset, None).unwrap(), vec![7u8; 2500]);
}

#[test]
fn test_cross_linked_chains_are_reported() {
    let (_temp_dir, path) = setup_volume();
    let (first, second) = {
        let mut vol = Volume::mount(&path).unwrap();
        let first = vol.import_bytes("one", "", &[1u8; 100], None).unwrap();
        let second = vol.import_bytes("two", "", &[2u8; 100], None).unwrap();
        (first, second)
    };

    // one~1 now runs into two~1's cluster
    poke_table(&path, first.starting_cluster, second.starting_cluster);

    let mut vol = Volume::mount(&path).unwrap();
    let report = vol.health_check().unwrap();
    assert_eq!(report.cross_linked_clusters, vec![second.starting_cluster]);
    assert!(!report.is_healthy());
}

#[test]
fn test_broken_chain_blocks_export_and_repair() {
    let (_temp_dir, path) = setup_volume();
    let entry = {
        let mut vol = Volume::mount(&path).unwrap();
        vol.import_bytes("data", "bin", &[3u8; 5000], None).unwrap()
    };

    // Cut the chain after its first cluster; the tail looks orphaned
    poke_table(&path, entry.starting_cluster + 1, FREE_CLUSTER);

    let mut vol = Volume::mount(&path).unwrap();
    assert!(matches!(
        vol.export(entry.offset, None),
        Err(Error::CorruptChain(_))
    ));

    let report = vol.health_check().unwrap();
    assert_eq!(report.corrupt_entries, vec!["data~1.bin".to_string()]);
    assert_eq!(report.orphaned_clusters, vec![entry.starting_cluster + 2]);

    // Nothing is freed while a chain is broken
    assert_eq!(vol.reclaim_orphans().unwrap(), 0);
    assert_eq!(
        vol.health_check().unwrap().orphaned_clusters,
        vec![entry.starting_cluster + 2]
    );
}

#[test]
fn test_looping_chain_is_detected() {
    let (_temp_dir, path) = setup_volume();
    let entry = {
        let mut vol = Volume::mount(&path).unwrap();
        vol.import_bytes("loop", "bin", &[4u8; 4000], None).unwrap()
    };

    poke_table(&path, entry.starting_cluster + 1, entry.starting_cluster);

    let mut vol = Volume::mount(&path).unwrap();
    assert!(matches!(
        vol.export(entry.offset, None),
        Err(Error::CorruptChain(_))
    ));
    assert_eq!(
        vol.health_check().unwrap().corrupt_entries,
        vec!["loop~1.bin".to_string()]
    );
}

#[test]
fn test_unlinked_root_is_never_reinitialized() {
    let (_temp_dir, path) = setup_volume();
    {
        let mut vol = Volume::mount(&path).unwrap();
        vol.import_bytes("a", "txt", b"first", None).unwrap();
        vol.import_bytes("b", "txt", b"second", None).unwrap();
    }

    poke_table(&path, 2, FREE_CLUSTER);

    {
        let mut vol = Volume::mount(&path).unwrap();
        assert!(matches!(vol.list(), Err(Error::CorruptChain(2))));
        assert!(matches!(
            vol.import_bytes("c", "txt", b"third", None),
            Err(Error::CorruptChain(2))
        ));
    }

    // Relinking the root brings back the untouched directory
    poke_table(&path, 2, EOF_MARK);
    let mut vol = Volume::mount(&path).unwrap();
    let names: Vec<String> = vol
        .list()
        .unwrap()
        .into_iter()
        .map(|e| e.display_name)
        .collect();
    assert_eq!(names, vec!["a~1.txt", "b~1.txt"]);
}

#[test]
fn test_looping_root_is_reported() {
    let (_temp_dir, path) = setup_volume();
    {
        let mut vol = Volume::mount(&path).unwrap();
        vol.import_bytes("a", "txt", b"data", None).unwrap();
    }

    poke_table(&path, 2, 2);

    let mut vol = Volume::mount(&path).unwrap();
    let report = vol.health_check().unwrap();
    assert_eq!(report.corrupt_entries, vec![ROOT_DIRECTORY.to_string()]);
    assert!(!report.is_healthy());
    // 15 data clusters, one used by a~1.txt
    assert_eq!(report.free_clusters, 14);

    assert_eq!(vol.reclaim_orphans().unwrap(), 0);
    assert!(matches!(vol.list(), Err(Error::CorruptChain(2))));
}

#[test]
fn test_tampered_ciphertext_fails_integrity() {
    let (_temp_dir, path) = setup_volume();
    let entry = {
        let mut vol = Volume::mount(&path).unwrap();
        vol.import_bytes("vault", "key", &[9u8; 600], Some("pw")).unwrap()
    };

    // Data starts two sectors in; cluster 3 follows the 2048-byte root cluster
    let cluster_offset = 2 * SECTOR + (entry.starting_cluster as u64 - 2) * 2048;
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(cluster_offset + 10)).unwrap();
    file.write_all(&[0xFF]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let mut vol = Volume::mount(&path).unwrap();
    assert!(matches!(
        vol.export(entry.offset, Some("pw")),
        Err(Error::IntegrityFailure)
    ));
}

#[test]
fn test_truncated_container_is_rejected() {
    let (_temp_dir, path) = setup_volume();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(4 * SECTOR).unwrap();
    drop(file);

    assert!(matches!(
        Volume::mount(&path),
        Err(Error::InvalidGeometry(_))
    ));
}
