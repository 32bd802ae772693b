use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};

/// Prefix of every domain name created by integration tests
pub(crate) const TEST_VM_PREFIX: &str = "vp-itest-";

mod tests {
    pub mod cli;
    pub mod lifecycle;
    pub mod seed_iso;
}

/// Get the path to the virt-provision binary, checking VIRT_PROVISION_PATH
/// first, then falling back to "virt-provision"
pub(crate) fn get_virt_provision_command() -> Result<String> {
    if let Ok(path) = std::env::var("VIRT_PROVISION_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    for profile in ["debug", "release"] {
        let path = format!("target/{profile}/virt-provision");
        if Path::new(&path).exists() {
            return Err(eyre!(
                "Detected {path} - set VIRT_PROVISION_PATH={path} to run using this binary"
            ));
        }
    }
    Ok("virt-provision".to_owned())
}

/// A domain name that will not collide with anything else on the host.
pub(crate) fn unique_vm_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{TEST_VM_PREFIX}{}", &id[..8])
}

/// Whether `prog` can be found in `PATH`.
pub(crate) fn have_program(prog: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|d| d.join(prog).is_file()))
        .unwrap_or(false)
}

/// Remove domains left behind by failed tests.
pub(crate) fn cleanup_integration_test_domains() {
    let out = std::process::Command::new("virsh")
        .args(["list", "--all", "--name"])
        .output();
    let Ok(out) = out else {
        return;
    };
    if !out.status.success() {
        return;
    }
    let names = String::from_utf8_lossy(&out.stdout);
    for name in names.lines().filter(|l| l.starts_with(TEST_VM_PREFIX)) {
        println!("Removing leftover domain {name}");
        for verb in ["destroy", "undefine"] {
            let _ = std::process::Command::new("virsh")
                .args([verb, name])
                .output();
        }
    }
}

fn main() {
    let args = Arguments::from_args();

    let no_genisoimage = !(have_program("genisoimage") && have_program("isoinfo"));
    // Booting a real guest needs libvirt and an image that requires no download
    let no_guest =
        !have_program("virsh") || std::env::var_os("VIRT_PROVISION_TEST_IMAGE").is_none();

    let tests = vec![
        Trial::test("cli_help_exits_1", || {
            tests::cli::test_help_exits_1()?;
            Ok(())
        }),
        Trial::test("cli_preflight_exit_codes", || {
            tests::cli::test_preflight_exit_codes()?;
            Ok(())
        }),
        Trial::test("cli_delete_missing_is_noop", || {
            tests::cli::test_delete_missing_is_noop()?;
            Ok(())
        }),
        Trial::test("seed_iso_volume", || {
            tests::seed_iso::test_seed_iso_volume()?;
            Ok(())
        })
        .with_ignored_flag(no_genisoimage),
        Trial::test("lifecycle_create_delete", || {
            tests::lifecycle::test_create_delete()?;
            Ok(())
        })
        .with_ignored_flag(no_guest),
    ];

    // Run the tests and capture the exit code
    let exit_code = libtest_mimic::run(&args, tests);

    // Clean up any domains created by integration tests
    cleanup_integration_test_domains();

    // Exit with the test result
    exit_code.exit();
}
