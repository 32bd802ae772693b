//! Resolution of command line options into an immutable run configuration
//!
//! Defaults that depend on the host (the home directory, tool overrides,
//! the DHCP lease directory) are captured once in a [`HostEnvironment`];
//! nothing downstream of [`RunConfig::resolve`] consults the process
//! environment.

use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::errors::VmError;
use crate::images::Distro;
use crate::tools::Toolchain;
use crate::utils::parse_memory_to_mb;

/// Default number of virtual CPUs.
pub const DEFAULT_VCPUS: u32 = 1;
/// Default guest memory in MB.
pub const DEFAULT_MEMORY_MB: u32 = 1024;
/// Size in GB of the stock cloud images; requests above this trigger a resize.
pub const DEFAULT_DISK_GB: u32 = 10;
/// Default bridge the guest NIC attaches to.
pub const DEFAULT_BRIDGE: &str = "virbr0";
/// Where libvirt's dnsmasq keeps its per-bridge lease status files.
pub const DEFAULT_LEASE_DIR: &str = "/var/lib/libvirt/dnsmasq";

/// Provision (or remove) a cloud-init configured virtual machine on a
/// local libvirt/KVM host.
///
/// Create a VM with `-n NAME`, remove one with `-r NAME`.
#[derive(Debug, Default, Parser)]
#[clap(name = "virt-provision")]
pub struct ProvisionOpts {
    /// Name of the virtual machine to create
    #[clap(short = 'n', long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Remove the named virtual machine and its files
    #[clap(short = 'r', long = "remove", value_name = "NAME")]
    pub remove: Option<String>,

    /// Number of vCPUs [default: 1]
    #[clap(short = 'c', long = "vcpus")]
    pub vcpus: Option<u32>,

    /// Memory in MB, or with a unit suffix such as 2G [default: 1024]
    #[clap(short = 'm', long = "memory")]
    pub memory: Option<String>,

    /// Root disk size in GB; anything above 10 grows the image [default: 10]
    #[clap(short = 'd', long = "disk-size")]
    pub disk_size: Option<u32>,

    /// Distribution: centos7, centos6 or debian8 [default: centos7]
    #[clap(short = 't', long = "distro")]
    pub distro: Option<String>,

    /// Directory holding base images and per-VM directories [default: ~/virt/images]
    #[clap(short = 'l', long = "image-dir")]
    pub image_dir: Option<Utf8PathBuf>,

    /// SSH public key to inject [default: ~/.ssh/id_rsa.pub]
    #[clap(short = 'k', long = "ssh-key")]
    pub ssh_key: Option<Utf8PathBuf>,

    /// Bridge to attach the network interface to [default: virbr0]
    #[clap(short = 'b', long = "bridge")]
    pub bridge: Option<String>,

    /// Use this image instead of downloading a distribution image
    #[clap(short = 'i', long = "image")]
    pub image: Option<Utf8PathBuf>,

    /// Libvirt connection URI (e.g. qemu:///system)
    #[clap(short = 'C', long = "connect")]
    pub connect: Option<String>,

    /// Remove an existing VM of the same name without asking
    #[clap(short = 'D', long = "autodestroy")]
    pub autodestroy: bool,

    /// Give up waiting for a DHCP lease after this many seconds
    #[clap(long = "lease-timeout", value_name = "SECONDS")]
    pub lease_timeout: Option<u64>,
}

/// Host-derived inputs to configuration resolution.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    pub home: Utf8PathBuf,
    pub lease_dir: Utf8PathBuf,
    pub toolchain: Toolchain,
}

impl HostEnvironment {
    /// Capture the environment of the current process.
    pub fn from_process() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| eyre!("Unable to determine home directory"))?;
        let home = Utf8PathBuf::try_from(home)?;
        Ok(Self::from_lookup(home, |k| std::env::var_os(k)))
    }

    /// Build from an explicit home directory and variable lookup.
    pub fn from_lookup(home: Utf8PathBuf, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let lease_dir = lookup("VIRT_PROVISION_LEASE_DIR")
            .filter(|v| !v.is_empty())
            .and_then(|v| v.into_string().ok())
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| DEFAULT_LEASE_DIR.into());
        let toolchain = Toolchain::default().with_overrides(lookup);
        Self {
            home,
            lease_dir,
            toolchain,
        }
    }
}

/// Disk sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskPlan {
    pub size_gb: u32,
    pub resize: bool,
}

impl DiskPlan {
    /// Only requests larger than the stock image size cause a resize;
    /// anything smaller keeps the stock size.
    pub fn from_request(requested_gb: Option<u32>) -> Self {
        match requested_gb {
            Some(gb) if gb > DEFAULT_DISK_GB => Self {
                size_gb: gb,
                resize: true,
            },
            _ => Self {
                size_gb: DEFAULT_DISK_GB,
                resize: false,
            },
        }
    }
}

/// Everything a create run needs.
#[derive(Debug, Clone)]
pub struct CreateConfig {
    pub vm_name: String,
    pub vcpus: u32,
    pub memory_mb: u32,
    pub disk: DiskPlan,
    pub image_dir: Utf8PathBuf,
    pub pubkey_path: Utf8PathBuf,
    pub bridge: String,
    pub distro: Distro,
    pub custom_image: Option<Utf8PathBuf>,
    pub autodestroy: bool,
    pub lease_timeout: Option<Duration>,
}

/// Everything a delete run needs.
#[derive(Debug, Clone)]
pub struct DeleteConfig {
    pub vm_name: String,
    pub image_dir: Utf8PathBuf,
}

/// Exactly one verb is active per run.
#[derive(Debug, Clone)]
pub enum Mode {
    Create(CreateConfig),
    Delete(DeleteConfig),
}

/// The fully resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub toolchain: Toolchain,
    pub lease_dir: Utf8PathBuf,
}

fn validate_vm_name(name: &str) -> Result<(), VmError> {
    if name.is_empty() {
        return Err(VmError::Config("VM name must not be empty".into()));
    }
    // virt-install splits its option values on commas
    if name.contains(['/', ',']) || name == "." || name == ".." {
        return Err(VmError::Config(format!("Invalid VM name: {name}")));
    }
    Ok(())
}

fn expand_home(p: &Utf8Path, home: &Utf8Path) -> Utf8PathBuf {
    match p.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => p.to_owned(),
    }
}

impl RunConfig {
    /// Merge defaults with the user's options. Performs no I/O.
    pub fn resolve(opts: ProvisionOpts, host: &HostEnvironment) -> Result<Self, VmError> {
        let image_dir = opts
            .image_dir
            .as_deref()
            .map(|p| expand_home(p, &host.home))
            .unwrap_or_else(|| host.home.join("virt/images"));

        let mut toolchain = host.toolchain.clone();
        if let Some(uri) = opts.connect.clone() {
            toolchain.connect = Some(uri);
        }

        let mode = match (opts.name, opts.remove) {
            (Some(_), Some(_)) => {
                return Err(VmError::Config("-n and -r are mutually exclusive".into()))
            }
            (None, None) => {
                return Err(VmError::Config(
                    "A VM name is required: use -n NAME to create or -r NAME to remove".into(),
                ))
            }
            (None, Some(vm_name)) => {
                validate_vm_name(&vm_name)?;
                Mode::Delete(DeleteConfig { vm_name, image_dir })
            }
            (Some(vm_name), None) => {
                validate_vm_name(&vm_name)?;
                let distro = match opts.distro.as_deref() {
                    Some(d) => d
                        .parse::<Distro>()
                        .map_err(|_| VmError::UnsupportedDistro(d.to_owned()))?,
                    None => Distro::default(),
                };
                let vcpus = opts.vcpus.unwrap_or(DEFAULT_VCPUS);
                if vcpus == 0 {
                    return Err(VmError::Config("vCPU count must be at least 1".into()));
                }
                let memory_mb = match opts.memory.as_deref() {
                    Some(m) => parse_memory_to_mb(m)
                        .map_err(|e| VmError::Config(format!("Invalid memory '{m}': {e}")))?,
                    None => DEFAULT_MEMORY_MB,
                };
                if memory_mb == 0 {
                    return Err(VmError::Config("Memory must be at least 1 MB".into()));
                }
                let pubkey_path = opts
                    .ssh_key
                    .as_deref()
                    .map(|p| expand_home(p, &host.home))
                    .unwrap_or_else(|| host.home.join(".ssh/id_rsa.pub"));
                let custom_image = opts.image.as_deref().map(|p| expand_home(p, &host.home));
                Mode::Create(CreateConfig {
                    vm_name,
                    vcpus,
                    memory_mb,
                    disk: DiskPlan::from_request(opts.disk_size),
                    image_dir,
                    pubkey_path,
                    bridge: opts.bridge.unwrap_or_else(|| DEFAULT_BRIDGE.to_owned()),
                    distro,
                    custom_image,
                    autodestroy: opts.autodestroy,
                    lease_timeout: opts.lease_timeout.map(Duration::from_secs),
                })
            }
        };

        Ok(Self {
            mode,
            toolchain,
            lease_dir: host.lease_dir.clone(),
        })
    }
}
