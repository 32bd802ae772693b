//! Base cloud images: the per-distribution table, and making sure the
//! chosen image is present in the local image directory.

use std::io::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::instrument;

use crate::errors::VmError;

/// Login user reported for caller-supplied images, whose accounts we can't know.
pub const CUSTOM_IMAGE_LOGIN_USER: &str = "<check the image for its default login user>";

/// Distributions with a known cloud image.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Distro {
    #[default]
    Centos7,
    Centos6,
    Debian8,
}

/// Where a distribution's cloud image comes from and how to treat guests
/// booted from it.
#[derive(Debug, PartialEq, Eq)]
pub struct ImageSpec {
    pub filename: &'static str,
    pub base_url: &'static str,
    pub os_variant: &'static str,
    pub login_user: &'static str,
}

impl ImageSpec {
    /// Full download URL.
    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.filename)
    }
}

const CENTOS7: ImageSpec = ImageSpec {
    filename: "CentOS-7-x86_64-GenericCloud.qcow2",
    base_url: "https://cloud.centos.org/centos/7/images",
    os_variant: "rhel7",
    login_user: "centos",
};

const CENTOS6: ImageSpec = ImageSpec {
    filename: "CentOS-6-x86_64-GenericCloud.qcow2",
    base_url: "https://cloud.centos.org/centos/6/images",
    os_variant: "rhel6",
    login_user: "centos",
};

const DEBIAN8: ImageSpec = ImageSpec {
    filename: "debian-8-openstack-amd64.qcow2",
    base_url: "https://cdimage.debian.org/cdimage/openstack/current-8",
    os_variant: "debian8",
    login_user: "debian",
};

impl Distro {
    pub fn image_spec(&self) -> &'static ImageSpec {
        match self {
            Distro::Centos7 => &CENTOS7,
            Distro::Centos6 => &CENTOS6,
            Distro::Debian8 => &DEBIAN8,
        }
    }

    /// First-boot command removing cloud-init once it has done its job.
    pub fn remove_cloudinit_cmd(&self) -> &'static [&'static str] {
        match self {
            Distro::Centos7 | Distro::Centos6 => &["yum", "-y", "remove", "cloud-init"],
            Distro::Debian8 => &["apt-get", "-y", "remove", "cloud-init"],
        }
    }
}

/// A base image ready to be copied for a new VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub path: Utf8PathBuf,
    pub os_variant: String,
    pub login_user: String,
}

/// Resolve the base image for a run, downloading the distribution image
/// into `image_dir` if it isn't cached there yet.
#[instrument]
pub fn resolve(
    distro: Distro,
    custom_image: Option<&Utf8Path>,
    image_dir: &Utf8Path,
) -> Result<ResolvedImage> {
    if let Some(path) = custom_image {
        if !path.is_file() {
            return Err(VmError::Config(format!("Image not found: {path}")).into());
        }
        return Ok(ResolvedImage {
            path: path.to_owned(),
            os_variant: "auto".into(),
            login_user: CUSTOM_IMAGE_LOGIN_USER.into(),
        });
    }

    let spec = distro.image_spec();
    std::fs::create_dir_all(image_dir)
        .wrap_err_with(|| format!("Creating image directory {image_dir}"))?;
    let path = image_dir.join(spec.filename);
    if path.exists() {
        tracing::info!("Using cached image {path}");
    } else {
        let url = spec.url();
        println!("Downloading {url}");
        fetch(&url, &path)?;
    }
    Ok(ResolvedImage {
        path,
        os_variant: spec.os_variant.into(),
        login_user: spec.login_user.into(),
    })
}

/// Download `url` to `dest`. The body is streamed into a temporary file
/// next to `dest` which only replaces it once complete.
pub fn fetch(url: &str, dest: &Utf8Path) -> Result<()> {
    let download_err = |reason: String| VmError::Download {
        url: url.to_owned(),
        reason,
    };
    let dir = dest.parent().unwrap_or(Utf8Path::new("."));
    let mut tmpf = tempfile::NamedTempFile::new_in(dir)
        .wrap_err_with(|| format!("Creating temporary file in {dir}"))?;

    tracing::debug!("Fetching {url}");
    let r = reqwest::blocking::get(url)
        .and_then(|v| v.error_for_status())
        .map_err(|e| download_err(e.to_string()))?;
    let pb = match r.content_length() {
        Some(size) => {
            tracing::debug!("size={size}");
            let pb = ProgressBar::new(size);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    let mut r = pb.wrap_read(r);
    std::io::copy(&mut r, &mut tmpf).map_err(|e| download_err(e.to_string()))?;
    pb.finish_and_clear();
    tmpf.flush().map_err(|e| download_err(e.to_string()))?;
    tmpf.persist(dest)
        .map_err(|e| download_err(format!("Renaming into {dest}: {}", e.error)))?;
    Ok(())
}

/// Read and validate the SSH public key to inject.
pub fn read_pubkey(path: &Utf8Path) -> Result<String> {
    let mut key = match std::fs::read_to_string(path) {
        Ok(k) => k,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VmError::MissingSshKey(path.to_owned()).into())
        }
        Err(e) => return Err(e).wrap_err_with(|| format!("Reading SSH public key {path}")),
    };
    while key.ends_with('\n') || key.ends_with('\r') {
        key.pop();
    }
    if key.trim().is_empty() {
        return Err(VmError::MissingSshKey(path.to_owned()).into());
    }
    Ok(key)
}
