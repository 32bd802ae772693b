//! The create and delete verbs
//!
//! A create run goes: SSH key → base image → existing-domain check →
//! fresh workspace → disk → cloud-init seed → virt-install → eject seed →
//! DHCP lease. A delete run is just the teardown sequence.

use std::fmt;
use std::io::{BufRead, Write};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::instrument;

use crate::cloudinit::{self, SeedConfig};
use crate::config::{CreateConfig, DeleteConfig, Mode, RunConfig};
use crate::disk;
use crate::errors::VmError;
use crate::images::{self, CUSTOM_IMAGE_LOGIN_USER};
use crate::lease::{self, LeaseWait};
use crate::libvirt::install::{self, DomainSpec};
use crate::libvirt::rm::{self, TeardownReport};
use crate::libvirt::{domain_presence, DomainPresence};
use crate::tools::Toolchain;
use crate::workspace::{log_phase, VmWorkspace};

/// How to reach a freshly created VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    pub name: String,
    pub ip: String,
    pub login_user: String,
    pub log_path: Utf8PathBuf,
}

impl fmt::Display for CreateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VM {} is ready", self.name)?;
        writeln!(f, "  IP address: {}", self.ip)?;
        writeln!(f, "  Login user: {}", self.login_user)?;
        if self.login_user != CUSTOM_IMAGE_LOGIN_USER {
            writeln!(f, "  Connect with: ssh {}@{}", self.login_user, self.ip)?;
        }
        writeln!(f, "  Log: {}", self.log_path)
    }
}

/// Result of a whole run.
#[derive(Debug)]
pub enum RunOutcome {
    Created(CreateReport),
    Deleted(TeardownReport),
}

/// Ask whether to overwrite `name`. Only an explicit yes counts.
pub fn confirm_overwrite(
    name: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<bool> {
    write!(out, "Domain {name} already exists. Overwrite? [y/N] ")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("Reading answer")?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Execute one invocation. `input`/`out` carry the overwrite prompt.
pub fn run(
    config: &RunConfig,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<RunOutcome> {
    match &config.mode {
        Mode::Create(c) => {
            let wait = LeaseWait {
                timeout: c.lease_timeout,
                ..Default::default()
            };
            let tools = &config.toolchain;
            create(c, tools, &config.lease_dir, &wait, input, out).map(RunOutcome::Created)
        }
        Mode::Delete(d) => Ok(RunOutcome::Deleted(delete(d, &config.toolchain))),
    }
}

/// Remove a VM. Always succeeds; see [`rm::teardown`].
#[instrument(skip_all, fields(vm = cfg.vm_name))]
pub fn delete(cfg: &DeleteConfig, tools: &Toolchain) -> TeardownReport {
    let ws = VmWorkspace::new(&cfg.image_dir, &cfg.vm_name);
    rm::teardown(tools, &cfg.vm_name, &ws)
}

/// Provision a VM and wait until it has an IP address.
#[instrument(skip_all, fields(vm = cfg.vm_name))]
pub fn create(
    cfg: &CreateConfig,
    tools: &Toolchain,
    lease_dir: &Utf8Path,
    wait: &LeaseWait,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<CreateReport> {
    let name = cfg.vm_name.as_str();
    let pubkey = images::read_pubkey(&cfg.pubkey_path)?;
    let image = images::resolve(cfg.distro, cfg.custom_image.as_deref(), &cfg.image_dir)?;
    let ws = VmWorkspace::new(&cfg.image_dir, name);

    match domain_presence(tools, name) {
        DomainPresence::Absent => {}
        DomainPresence::Exists => {
            if !cfg.autodestroy && !confirm_overwrite(name, input, out)? {
                return Err(VmError::OverwriteDeclined(name.to_owned()).into());
            }
            println!("Removing existing domain {name}");
            let report = rm::teardown(tools, name, &ws);
            tracing::debug!("Teardown of {name}:\n{report}");
        }
        DomainPresence::QueryFailed(reason) => {
            return Err(eyre!("Checking for an existing domain {name}: {reason}"));
        }
    }

    ws.create_fresh()?;
    let log = ws.open_log()?;
    log_phase(&log, &format!("create {name}"))?;
    println!("Log: {}", ws.log_path());

    log_phase(&log, "disk")?;
    let disk_path = ws.disk_path();
    disk::provision(&image.path, &disk_path, cfg.disk, tools, &log)
        .wrap_err_with(|| format!("Preparing disk {disk_path}"))?;

    log_phase(&log, "cloud-init seed")?;
    let seed = SeedConfig {
        vm_name: name,
        pubkey: &pubkey,
        distro: cfg.distro,
    };
    let seed_iso = cloudinit::build(&seed, &ws, tools, &log)?;

    log_phase(&log, "virt-install")?;
    println!("Installing {name}");
    let spec = DomainSpec {
        name,
        vcpus: cfg.vcpus,
        memory_mb: cfg.memory_mb,
        disk: &disk_path,
        seed_iso: &seed_iso,
        bridge: &cfg.bridge,
        os_variant: &image.os_variant,
    };
    install::start(&spec, tools, &log)?;

    log_phase(&log, "eject cloud-init media")?;
    if let Err(e) = install::eject_seed(tools, name, &log) {
        tracing::warn!("Failed to eject cloud-init media from {name}: {e:#}");
    }
    ws.remove_seed_files()?;

    log_phase(&log, "waiting for DHCP lease")?;
    println!("Waiting for {name} to obtain an IP address");
    let ip = lease::wait_for_ip(tools, name, &cfg.bridge, lease_dir, wait)?;
    log_phase(&log, &format!("lease {ip}"))?;

    Ok(CreateReport {
        name: name.to_owned(),
        ip,
        login_user: image.login_user,
        log_path: ws.log_path(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_confirm_overwrite() {
        for (answer, expected) in [
            ("y\n", true),
            ("Y\n", true),
            ("yes\n", true),
            (" YES \n", true),
            ("N\n", false),
            ("n\n", false),
            ("\n", false),
            ("", false),
            ("yep\n", false),
        ] {
            let mut out = Vec::new();
            let r = confirm_overwrite("foo", &mut Cursor::new(answer), &mut out).unwrap();
            assert_eq!(r, expected, "{answer:?}");
            assert_eq!(
                String::from_utf8(out).unwrap(),
                "Domain foo already exists. Overwrite? [y/N] "
            );
        }
    }

    #[test]
    fn test_report_display() {
        let mut r = CreateReport {
            name: "foo".into(),
            ip: "192.168.122.10".into(),
            login_user: "centos".into(),
            log_path: "/home/op/virt/images/foo/foo.log".into(),
        };
        let s = r.to_string();
        assert!(s.contains("IP address: 192.168.122.10"));
        assert!(s.contains("ssh centos@192.168.122.10"));
        r.login_user = CUSTOM_IMAGE_LOGIN_USER.into();
        assert!(!r.to_string().contains("ssh "));
    }
}
