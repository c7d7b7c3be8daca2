//! fat-vault - a FAT-style virtual file system in a single host file.
//!
//! Files are imported into and exported out of the container; deleted
//! entries can be restored and individual files can carry a password.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fat_vault::vfs::EntryInfo;
use fat_vault::{Error, FormatConfig, Volume};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fat-vault")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "FAT-style virtual file system in a single container file",
    long_about = "Stores files in a FAT-style container with soft delete, restore and per-file XChaCha20-Poly1305 encryption."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and format a new container
    Format {
        /// Container file to create
        container: PathBuf,

        /// Geometry as a JSON file (default: 1 GiB, 2 KiB clusters)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Protect the container with a password
        #[arg(long)]
        password: bool,
    },

    /// List container contents
    Ls {
        /// Container file
        container: PathBuf,

        /// List restorable deleted entries instead
        #[arg(long)]
        deleted: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a host file
    Import {
        /// Container file
        container: PathBuf,

        /// Host file to import
        input: PathBuf,

        /// Encrypt the file under a password
        #[arg(long)]
        encrypt: bool,
    },

    /// Export a file to the host
    Export {
        /// Container file
        container: PathBuf,

        /// Entry name as listed, e.g. report~1.txt
        name: String,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete a file
    Rm {
        /// Container file
        container: PathBuf,

        /// Entry name as listed
        name: String,

        /// Free the clusters; the file cannot be restored
        #[arg(long)]
        permanent: bool,
    },

    /// Restore a deleted file
    Restore {
        /// Container file
        container: PathBuf,

        /// Entry name as listed by `ls --deleted`
        name: String,
    },

    /// Set, change or remove the container password
    Passwd {
        /// Container file
        container: PathBuf,

        /// Remove the password
        #[arg(long)]
        remove: bool,
    },

    /// Set, change or remove a file password
    FilePasswd {
        /// Container file
        container: PathBuf,

        /// Entry name as listed
        name: String,

        /// Remove the password and store the file in plaintext
        #[arg(long)]
        remove: bool,
    },

    /// Show container geometry and usage
    Info {
        /// Container file
        container: PathBuf,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check allocation table consistency
    Check {
        /// Container file
        container: PathBuf,

        /// Free orphaned clusters
        #[arg(long)]
        repair: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Format {
            container,
            config,
            password,
        } => cmd_format(&container, config, password),

        Commands::Ls {
            container,
            deleted,
            json,
        } => cmd_ls(&container, deleted, json),

        Commands::Import {
            container,
            input,
            encrypt,
        } => cmd_import(&container, &input, encrypt),

        Commands::Export {
            container,
            name,
            output,
        } => cmd_export(&container, &name, output),

        Commands::Rm {
            container,
            name,
            permanent,
        } => cmd_rm(&container, &name, permanent),

        Commands::Restore { container, name } => cmd_restore(&container, &name),

        Commands::Passwd { container, remove } => cmd_passwd(&container, remove),

        Commands::FilePasswd {
            container,
            name,
            remove,
        } => cmd_file_passwd(&container, &name, remove),

        Commands::Info { container, json } => cmd_info(&container, json),

        Commands::Check { container, repair } => cmd_check(&container, repair),
    }
}

fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    rpassword::prompt_password(prompt).context("failed to read password")
}

fn prompt_new_password(what: &str) -> anyhow::Result<String> {
    let password = prompt_password(&format!("New {} password: ", what))?;
    let confirm = prompt_password(&format!("Confirm {} password: ", what))?;
    if password != confirm {
        bail!("passwords do not match");
    }
    Ok(password)
}

/// Mount and pass the container password gate.
fn open_volume(path: &Path) -> anyhow::Result<Volume> {
    let vol = Volume::mount(path).with_context(|| format!("cannot open {}", path.display()))?;
    vol.unlock_with(|attempt| {
        prompt_password(&format!("Container password (attempt {}): ", attempt))
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    })
    .context("access denied")?;
    Ok(vol)
}

/// Ask for the file password only when the entry has one.
fn file_password(entry: &EntryInfo) -> anyhow::Result<Option<String>> {
    if !entry.has_password {
        return Ok(None);
    }
    let password = prompt_password(&format!("Password for {}: ", entry.display_name))?;
    Ok(Some(password))
}

fn cmd_format(path: &Path, config: Option<PathBuf>, password: bool) -> anyhow::Result<()> {
    let config = match config {
        Some(file) => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            serde_json::from_str::<FormatConfig>(&raw)
                .with_context(|| format!("invalid geometry in {}", file.display()))?
        }
        None => FormatConfig::default(),
    };

    let new_password = if password {
        Some(prompt_new_password("container")?)
    } else {
        None
    };

    let mut vol = Volume::format(path, &config)?;
    if let Some(pw) = &new_password {
        vol.set_container_password(None, Some(pw))?;
    }
    let info = vol.info()?;

    println!("Container formatted successfully!");
    println!("  Volume size:    {} bytes", info.volume_size);
    println!("  Cluster size:   {} bytes", info.cluster_size);
    println!("  Clusters:       {}", info.total_clusters);
    println!("  Password:       {}", if info.has_password { "yes" } else { "no" });

    Ok(())
}

fn cmd_ls(path: &Path, deleted: bool, json: bool) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;

    let entries = if deleted {
        vol.list_deleted()?
    } else {
        vol.list()?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("(empty)");
    } else {
        for entry in entries {
            let lock = if entry.has_password { 'p' } else { '-' };
            println!(
                "{} {:>10}  {:>6}  {}",
                lock, entry.size, entry.starting_cluster, entry.display_name
            );
        }
    }

    Ok(())
}

fn cmd_import(path: &Path, input: &Path, encrypt: bool) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;

    let password = if encrypt {
        Some(prompt_new_password("file")?)
    } else {
        None
    };

    let entry = vol
        .import_file(input, password.as_deref())
        .with_context(|| format!("cannot import {}", input.display()))?;
    println!("Imported {} as {} ({} bytes)", input.display(), entry.display_name, entry.size);

    Ok(())
}

fn cmd_export(path: &Path, name: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;
    let entry = vol.find(name)?;
    let password = file_password(&entry)?;

    match output {
        Some(dest) => {
            let written = vol.export_to(entry.offset, &dest, password.as_deref())?;
            println!("Wrote {} bytes to {}", written, dest.display());
        }
        None => {
            let data = vol.export(entry.offset, password.as_deref())?;
            io::stdout().write_all(&data)?;
        }
    }

    Ok(())
}

fn cmd_rm(path: &Path, name: &str, permanent: bool) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;
    let entry = vol.find(name)?;
    let password = file_password(&entry)?;

    vol.delete(entry.offset, !permanent, password.as_deref())?;
    if permanent {
        println!("Permanently deleted {}", name);
    } else {
        println!("Deleted {} (restorable)", name);
    }

    Ok(())
}

fn cmd_restore(path: &Path, name: &str) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;
    let entry = vol.find_deleted(name)?;

    let restored = vol.restore(entry.offset)?;
    println!("Restored {}", restored.display_name);

    Ok(())
}

fn cmd_passwd(path: &Path, remove: bool) -> anyhow::Result<()> {
    let mut vol = Volume::mount(path).with_context(|| format!("cannot open {}", path.display()))?;

    let old = if vol.has_container_password() {
        Some(prompt_password("Current container password: ")?)
    } else {
        None
    };
    let new = if remove {
        None
    } else {
        Some(prompt_new_password("container")?)
    };

    vol.set_container_password(old.as_deref(), new.as_deref())?;
    println!(
        "Container password {}",
        if remove { "removed" } else { "changed" }
    );

    Ok(())
}

fn cmd_file_passwd(path: &Path, name: &str, remove: bool) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;
    let entry = vol.find(name)?;
    let old = file_password(&entry)?;

    if remove && !entry.has_password {
        bail!("{} has no password", name);
    }
    let new = if remove {
        None
    } else {
        Some(prompt_new_password("file")?)
    };

    vol.set_file_password(entry.offset, old.as_deref(), new.as_deref())?;
    println!(
        "Password {} for {}",
        if remove { "removed" } else { "set" },
        name
    );

    Ok(())
}

fn cmd_info(path: &Path, json: bool) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;
    let info = vol.info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Container Information");
    println!("=====================");
    println!("Path:             {}", info.path.display());
    println!("Sector size:      {} bytes", info.bytes_per_sector);
    println!("Cluster size:     {} bytes", info.cluster_size);
    println!("Volume size:      {} bytes", info.volume_size);
    println!("Password:         {}", if info.has_password { "yes" } else { "no" });
    println!();
    println!("Clusters:");
    println!("  Total:          {}", info.total_clusters);
    println!("  Free:           {}", info.free_clusters);
    println!("  Directory:      {}", info.directory_clusters);
    println!();
    println!("Contents:");
    println!("  Files:          {}", info.file_count);
    println!("  Deleted:        {}", info.deleted_count);
    println!("  Total size:     {} bytes", info.total_file_size);

    Ok(())
}

fn cmd_check(path: &Path, repair: bool) -> anyhow::Result<()> {
    let mut vol = open_volume(path)?;
    let report = vol.health_check()?;

    println!("Container Health Report");
    println!("=======================");
    println!("Live files:       {}", report.live_files);
    println!("Restorable files: {}", report.restorable_files);
    println!("Free clusters:    {}", report.free_clusters);

    if !report.corrupt_entries.is_empty() {
        println!();
        println!("Corrupt entries:");
        for name in &report.corrupt_entries {
            println!("  {}", name);
        }
    }
    if !report.cross_linked_clusters.is_empty() {
        println!();
        println!("Cross-linked clusters: {:?}", report.cross_linked_clusters);
    }
    if !report.orphaned_clusters.is_empty() {
        println!();
        println!("Orphaned clusters: {:?}", report.orphaned_clusters);
    }

    if report.is_healthy() {
        println!();
        println!("✓ Allocation table is consistent");
    } else if repair {
        let reclaimed = vol.reclaim_orphans()?;
        println!();
        println!("Reclaimed {} orphaned clusters", reclaimed);
    }

    Ok(())
}
