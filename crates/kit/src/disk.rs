//! Per-VM disk preparation: copy the base image, then optionally grow it
//!
//! Growing is done offline with `virt-resize`, which expands the first
//! partition into a freshly allocated larger image. A failure partway
//! leaves the copy in an unknown state; the base image itself is never
//! touched.

use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::instrument;

use crate::cmdext::CommandLogExt;
use crate::config::DiskPlan;
use crate::errors::VmError;
use crate::tools::Toolchain;

/// Partition of the base image that receives the extra space.
const EXPAND_PARTITION: &str = "/dev/sda1";

fn provision_err(e: color_eyre::Report) -> color_eyre::Report {
    VmError::Provision(format!("{e:#}")).into()
}

/// Copy `source` to `dest` and apply `plan`. Tool output goes to `log`.
#[instrument(skip(tools, log))]
pub fn provision(
    source: &Utf8Path,
    dest: &Utf8Path,
    plan: DiskPlan,
    tools: &Toolchain,
    log: &File,
) -> Result<()> {
    tracing::debug!("Copying {source} to {dest}");
    std::fs::copy(source, dest)
        .map_err(|e| provision_err(eyre!("Copying {source} to {dest}: {e}")))?;

    if plan.resize {
        println!("Resizing disk to {}G", plan.size_gb);
        grow(dest, plan.size_gb, tools, log)?;
    }
    Ok(())
}

/// Replace `disk` with a copy whose first partition spans `size_gb`.
fn grow(disk: &Utf8Path, size_gb: u32, tools: &Toolchain, log: &File) -> Result<()> {
    let expanded = Utf8PathBuf::from(format!("{disk}.new"));
    let size = format!("{size_gb}G");
    tools
        .qemu_img()
        .args(["create", "-f", "qcow2", "-o", "preallocation=metadata"])
        .args([expanded.as_str(), size.as_str()])
        .run_logged(log)
        .map_err(provision_err)?;
    tools
        .virt_resize()
        .args(["--quiet", "--expand", EXPAND_PARTITION])
        .args([disk.as_str(), expanded.as_str()])
        .run_logged(log)
        .map_err(provision_err)?;
    std::fs::rename(&expanded, disk)
        .map_err(|e| provision_err(eyre!("Renaming {expanded} to {disk}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::errors::find_vm_error;
    use crate::testutil::{utf8_tempdir, write_script};

    struct Fixture {
        _td: tempfile::TempDir,
        root: Utf8PathBuf,
        source: Utf8PathBuf,
        dest: Utf8PathBuf,
        log: File,
        tools: Toolchain,
    }

    fn fixture() -> Fixture {
        let (td, root) = utf8_tempdir();
        let source = root.join("base.qcow2");
        std::fs::write(&source, b"base image").unwrap();
        let dest = root.join("foo.qcow2");
        let log = File::create(root.join("foo.log")).unwrap();
        let qemu_img = write_script(
            &root,
            "qemu-img",
            &format!("echo \"$@\" > {root}/qemu-img.args\necho allocated > \"$6\"\n"),
        );
        let virt_resize = write_script(
            &root,
            "virt-resize",
            &format!("echo \"$@\" > {root}/virt-resize.args\necho expanded > \"$5\"\n"),
        );
        let tools = Toolchain {
            qemu_img: qemu_img.into_std_path_buf().into_os_string(),
            virt_resize: virt_resize.into_std_path_buf().into_os_string(),
            ..Default::default()
        };
        Fixture {
            _td: td,
            root,
            source,
            dest,
            log,
            tools,
        }
    }

    #[test]
    fn test_copy_only() {
        let f = fixture();
        let plan = DiskPlan {
            size_gb: 10,
            resize: false,
        };
        provision(&f.source, &f.dest, plan, &f.tools, &f.log).unwrap();
        assert_eq!(std::fs::read(&f.dest).unwrap(), b"base image");
        assert!(!f.root.join("qemu-img.args").exists());
        assert!(!f.root.join("virt-resize.args").exists());
    }

    #[test]
    fn test_resize() {
        let f = fixture();
        let plan = DiskPlan {
            size_gb: 20,
            resize: true,
        };
        provision(&f.source, &f.dest, plan, &f.tools, &f.log).unwrap();
        let qargs = std::fs::read_to_string(f.root.join("qemu-img.args")).unwrap();
        assert_eq!(
            qargs.trim(),
            format!("create -f qcow2 -o preallocation=metadata {}.new 20G", f.dest)
        );
        let rargs = std::fs::read_to_string(f.root.join("virt-resize.args")).unwrap();
        assert_eq!(
            rargs.trim(),
            format!("--quiet --expand /dev/sda1 {} {}.new", f.dest, f.dest)
        );
        assert_eq!(std::fs::read_to_string(&f.dest).unwrap(), "expanded\n");
        assert!(!Utf8PathBuf::from(format!("{}.new", f.dest)).exists());
        // The base image is left alone
        assert_eq!(std::fs::read(&f.source).unwrap(), b"base image");
    }

    #[test]
    fn test_failures() {
        let mut f = fixture();
        let e = provision(
            &f.root.join("missing.qcow2"),
            &f.dest,
            DiskPlan::from_request(None),
            &f.tools,
            &f.log,
        )
        .unwrap_err();
        assert!(matches!(find_vm_error(&e), Some(VmError::Provision(_))));

        f.tools.virt_resize = "false".into();
        let plan = DiskPlan {
            size_gb: 30,
            resize: true,
        };
        let e = provision(&f.source, &f.dest, plan, &f.tools, &f.log).unwrap_err();
        assert!(matches!(find_vm_error(&e), Some(VmError::Provision(_))));
    }
}
