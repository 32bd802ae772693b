//! Domain lifecycle through the libvirt command line tools
//!
//! - existence checks and XML dumps (this module)
//! - `install`: define and start a domain with `virt-install`, then
//!   detach the cloud-init media
//! - `rm`: best-effort teardown of a domain and everything it owns
//!
//! In the future we may replace this with https://gitlab.com/libvirt/libvirt-rust

use bootc_utils::CommandRunExt;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::instrument;

use crate::cmdext::CommandLogExt;
use crate::tools::Toolchain;

pub mod domain;
pub mod install;
pub mod rm;

/// Outcome of asking libvirt whether a domain exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPresence {
    Exists,
    Absent,
    /// The query itself failed, e.g. libvirtd is unreachable.
    QueryFailed(String),
}

/// Messages virsh prints when a domain lookup finds nothing.
const NOT_FOUND_MARKERS: &[&str] = &["failed to get domain", "Domain not found"];

/// Classify a finished `virsh dominfo` invocation.
fn classify_dominfo(success: bool, stderr: &str) -> DomainPresence {
    if success {
        DomainPresence::Exists
    } else if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        DomainPresence::Absent
    } else {
        DomainPresence::QueryFailed(stderr.trim().to_owned())
    }
}

/// Query libvirt for a domain by name.
#[instrument(skip(tools))]
pub fn domain_presence(tools: &Toolchain, name: &str) -> DomainPresence {
    let o = match tools.virsh().args(["dominfo", name]).run_capture() {
        Ok(o) => o,
        Err(e) => return DomainPresence::QueryFailed(format!("{e:#}")),
    };
    classify_dominfo(o.status.success(), &String::from_utf8_lossy(&o.stderr))
}

/// The live XML definition of a domain.
pub fn dumpxml(tools: &Toolchain, name: &str) -> Result<String> {
    tools
        .virsh()
        .args(["dumpxml", name])
        .run_get_string()
        .map_err(|e| eyre!("Dumping XML of domain {name}: {e}"))
}
