//! Waiting for a new domain to show up in the bridge's DHCP leases
//!
//! libvirt's dnsmasq keeps a JSON status file per bridge listing the
//! active leases. We look up the domain's MAC address there once a
//! second until an IP appears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Deserialize;
use tracing::instrument;

use crate::errors::VmError;
use crate::libvirt::{domain::primary_mac, dumpxml};
use crate::tools::Toolchain;

/// How long to wait between looks at the lease file.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One entry of dnsmasq's lease status file.
#[derive(Debug, Deserialize)]
struct LeaseEntry {
    #[serde(rename = "ip-address")]
    ip_address: Option<String>,
    #[serde(rename = "mac-address")]
    mac_address: Option<String>,
}

/// Limits on how long to wait for a lease.
#[derive(Debug, Clone)]
pub struct LeaseWait {
    pub interval: Duration,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    /// Setting this to true ends the wait at the next poll.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for LeaseWait {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout: None,
            cancel: None,
        }
    }
}

impl LeaseWait {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

/// Path of the lease status file for `bridge`.
pub fn lease_file(lease_dir: &Utf8Path, bridge: &str) -> Utf8PathBuf {
    lease_dir.join(format!("{bridge}.status"))
}

/// Find the IP leased to `mac` in the contents of a status file.
/// Empty or partially written files yield `None`.
pub fn find_lease(status: &str, mac: &str) -> Option<String> {
    if status.trim().is_empty() {
        return None;
    }
    let entries: Vec<LeaseEntry> = match serde_json::from_str(status) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Ignoring unparsable lease file: {e}");
            return None;
        }
    };
    entries
        .into_iter()
        .filter(|e| {
            e.mac_address
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(mac))
        })
        .filter_map(|e| e.ip_address)
        .find(|ip| !ip.is_empty())
}

fn read_status(path: &Utf8Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(eyre!("Reading {path}: {e}")),
    }
}

/// Poll `lease_path` until `mac` has been given an address.
pub fn wait_for_mac(lease_path: &Utf8Path, mac: &str, wait: &LeaseWait) -> Result<String> {
    let started = Instant::now();
    loop {
        if let Some(ip) = read_status(lease_path)?
            .as_deref()
            .and_then(|s| find_lease(s, mac))
        {
            return Ok(ip);
        }
        if wait.cancelled() {
            return Err(eyre!("Cancelled waiting for a DHCP lease for {mac}"));
        }
        if let Some(timeout) = wait.timeout {
            if started.elapsed() >= timeout {
                return Err(eyre!(
                    "No DHCP lease for {mac} in {lease_path} after {}s",
                    timeout.as_secs()
                ));
            }
        }
        std::thread::sleep(wait.interval);
    }
}

/// Find the IP address of domain `name` once its first NIC has a lease.
#[instrument(skip(tools, wait))]
pub fn wait_for_ip(
    tools: &Toolchain,
    name: &str,
    bridge: &str,
    lease_dir: &Utf8Path,
    wait: &LeaseWait,
) -> Result<String> {
    let xml = dumpxml(tools, name)
        .map_err(|e| VmError::DomainStart(format!("Domain {name} is not defined: {e:#}")))?;
    let mac = primary_mac(&xml)
        .ok_or_else(|| VmError::DomainStart(format!("Domain {name} has no network interface")))?;
    let path = lease_file(lease_dir, bridge);
    tracing::info!("Waiting for a DHCP lease for {mac} in {path}");
    wait_for_mac(&path, &mac, wait)
        .map_err(|e| e.wrap_err(format!("Waiting for the IP address of {name}")))
}
