//! The per-VM directory `{image_dir}/{vm_name}`
//!
//! It holds the VM's disk and an append-only log of everything the
//! external tools printed, plus the cloud-init seed files while the
//! domain is being installed.

use std::fs::{File, OpenOptions};
use std::io::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;

/// Paths inside a VM's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmWorkspace {
    name: String,
    dir: Utf8PathBuf,
}

impl VmWorkspace {
    pub fn new(image_dir: &Utf8Path, vm_name: &str) -> Self {
        Self {
            name: vm_name.to_owned(),
            dir: image_dir.join(vm_name),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn disk_path(&self) -> Utf8PathBuf {
        self.dir.join(format!("{}.qcow2", self.name))
    }

    pub fn log_path(&self) -> Utf8PathBuf {
        self.dir.join(format!("{}.log", self.name))
    }

    pub fn user_data_path(&self) -> Utf8PathBuf {
        self.dir.join("user-data")
    }

    pub fn meta_data_path(&self) -> Utf8PathBuf {
        self.dir.join("meta-data")
    }

    pub fn seed_iso_path(&self) -> Utf8PathBuf {
        self.dir.join(format!("{}-cidata.iso", self.name))
    }

    /// The transient cloud-init artifacts.
    pub fn seed_files(&self) -> [Utf8PathBuf; 3] {
        [
            self.user_data_path(),
            self.meta_data_path(),
            self.seed_iso_path(),
        ]
    }

    /// Start from an empty directory, wiping whatever was there before.
    pub fn create_fresh(&self) -> Result<()> {
        if self.dir.exists() {
            tracing::info!("Removing existing directory {}", self.dir);
            std::fs::remove_dir_all(&self.dir)
                .wrap_err_with(|| format!("Removing {}", self.dir))?;
        }
        std::fs::create_dir_all(&self.dir).wrap_err_with(|| format!("Creating {}", self.dir))?;
        Ok(())
    }

    /// Open the log for appending.
    pub fn open_log(&self) -> Result<File> {
        let p = self.log_path();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&p)
            .wrap_err_with(|| format!("Opening {p}"))
    }

    /// Delete the cloud-init artifacts; missing files are fine.
    pub fn remove_seed_files(&self) -> Result<()> {
        for p in self.seed_files() {
            match std::fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).wrap_err_with(|| format!("Removing {p}")),
            }
        }
        Ok(())
    }
}

/// Append a timestamped phase marker to the VM log.
pub fn log_phase(mut log: &File, msg: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    writeln!(log, "=== {now} {msg}").context("Writing to VM log")?;
    Ok(())
}
