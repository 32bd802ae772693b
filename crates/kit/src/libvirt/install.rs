//! Defining and starting a domain with `virt-install --import`

use std::fs::File;
use std::process::Command;

use camino::Utf8Path;
use color_eyre::Result;
use tracing::instrument;

use crate::cmdext::CommandLogExt;
use crate::tools::Toolchain;

use super::domain::cdrom_target;
use super::dumpxml;

/// CD-ROM device to eject when the domain XML doesn't tell us.
const FALLBACK_CDROM_DEV: &str = "hda";

/// Parameters for importing a prepared disk as a new domain.
#[derive(Debug, Clone)]
pub struct DomainSpec<'a> {
    pub name: &'a str,
    pub vcpus: u32,
    pub memory_mb: u32,
    pub disk: &'a Utf8Path,
    pub seed_iso: &'a Utf8Path,
    pub bridge: &'a str,
    pub os_variant: &'a str,
}

/// Escape a value embedded in a comma-separated virt-install option.
fn escape_suboption(v: &str) -> String {
    v.replace(',', ",,")
}

impl DomainSpec<'_> {
    /// The `virt-install` invocation for this domain.
    pub fn virt_install_command(&self, tools: &Toolchain) -> Command {
        let mut vinstall = tools.virt_install();
        vinstall.args(["--import", "--noautoconsole"]);
        vinstall.arg(format!("--name={}", self.name));
        vinstall.arg(format!("--memory={}", self.memory_mb));
        vinstall.arg(format!("--vcpus={}", self.vcpus));
        vinstall.arg("--cpu=host");
        let disk = escape_suboption(self.disk.as_str());
        vinstall.arg(format!("--disk={disk},format=qcow2,bus=virtio"));
        let seed_iso = escape_suboption(self.seed_iso.as_str());
        vinstall.arg(format!("--disk={seed_iso},device=cdrom"));
        let bridge = escape_suboption(self.bridge);
        vinstall.arg(format!("--network=bridge={bridge},model=virtio"));
        vinstall.arg("--os-type=linux");
        vinstall.arg(format!("--os-variant={}", self.os_variant));
        vinstall
    }
}

/// Run the installer. Its output, then the resulting domain's info and
/// definition, are appended to `log`.
///
/// A failing installer is only logged: whether the domain really came
/// up is discovered later when its network interface is looked up.
#[instrument(skip_all, fields(domain = spec.name))]
pub fn start(spec: &DomainSpec<'_>, tools: &Toolchain, log: &File) -> Result<()> {
    let mut vinstall = spec.virt_install_command(tools);
    if let Err(e) = vinstall.run_logged(log) {
        tracing::warn!("virt-install reported a failure, see the VM log: {e:#}");
    }
    for verb in ["dominfo", "dumpxml"] {
        if let Err(e) = tools.virsh().args([verb, spec.name]).run_logged(log) {
            tracing::warn!("Failed to record {verb} output for {}: {e:#}", spec.name);
        }
    }
    Ok(())
}

/// Detach the cloud-init seed from the domain's persistent definition.
/// The running guest keeps its current media until it is restarted.
#[instrument(skip(tools, log))]
pub fn eject_seed(tools: &Toolchain, name: &str, log: &File) -> Result<()> {
    let dev = dumpxml(tools, name)
        .ok()
        .and_then(|xml| cdrom_target(&xml))
        .unwrap_or_else(|| FALLBACK_CDROM_DEV.to_owned());
    tools
        .virsh()
        .args(["change-media", name, dev.as_str(), "--eject", "--config"])
        .run_logged(log)
}
