//! Packaging a cloud-init seed with the real genisoimage

use std::fs::File;

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use xshell::{cmd, Shell};

use virt_provision::cloudinit::{self, SeedConfig, SEED_VOLUME_ID};
use virt_provision::images::Distro;
use virt_provision::tools::Toolchain;
use virt_provision::workspace::VmWorkspace;

pub fn test_seed_iso_volume() -> Result<()> {
    let sh = Shell::new()?;
    let td = tempfile::tempdir()?;
    let root = Utf8PathBuf::try_from(td.path().to_owned())?;

    let ws = VmWorkspace::new(&root, "seedtest");
    ws.create_fresh()?;
    let log = File::create(ws.log_path())?;
    let seed = SeedConfig {
        vm_name: "seedtest",
        pubkey: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIIntegration test@host",
        distro: Distro::Debian8,
    };
    let iso = cloudinit::build(&seed, &ws, &Toolchain::default(), &log)?;

    let info = cmd!(sh, "isoinfo -d -i {iso}").read()?;
    let volid = info
        .lines()
        .find_map(|l| l.strip_prefix("Volume id:"))
        .map(str::trim)
        .ok_or_else(|| eyre!("No volume id in isoinfo output:\n{info}"))?;
    if volid != SEED_VOLUME_ID {
        return Err(eyre!("Unexpected volume id {volid}"));
    }

    let user_data = cmd!(sh, "isoinfo -J -i {iso} -x /user-data").read()?;
    if !user_data.starts_with("#cloud-config") {
        return Err(eyre!("user-data lacks its header:\n{user_data}"));
    }
    if !user_data.contains("IIntegration test@host") {
        return Err(eyre!("user-data lacks the SSH key:\n{user_data}"));
    }
    let meta_data = cmd!(sh, "isoinfo -J -i {iso} -x /meta-data").read()?;
    if !meta_data.contains("local-hostname: seedtest") {
        return Err(eyre!("meta-data lacks the hostname:\n{meta_data}"));
    }
    Ok(())
}
