//! Failure taxonomy for provisioning runs
//!
//! Everything flows through `color_eyre::Report`; these variants are the
//! ones the binary needs to recognize in order to pick an exit code.

use camino::Utf8PathBuf;
use color_eyre::Report;

/// Errors with a defined meaning for the operator.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Bad or conflicting command line options.
    #[error("{0}")]
    Config(String),

    /// The requested distribution has no known cloud image.
    #[error("Unsupported distribution: {0}")]
    UnsupportedDistro(String),

    /// The SSH public key to inject is missing or empty.
    #[error("SSH public key not found: {0}")]
    MissingSshKey(Utf8PathBuf),

    /// Fetching the base image failed.
    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// Copying or resizing the VM disk failed.
    #[error("Failed to provision disk: {0}")]
    Provision(String),

    /// Rendering or packaging the cloud-init seed failed.
    #[error("Failed to build cloud-init seed: {0}")]
    SeedBuild(String),

    /// The domain installer reported a failure.
    #[error("Failed to start domain: {0}")]
    DomainStart(String),

    /// The operator declined to overwrite an existing domain.
    #[error("Not overwriting existing domain {0}")]
    OverwriteDeclined(String),
}

impl VmError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            VmError::Config(_) | VmError::UnsupportedDistro(_) => 2,
            VmError::MissingSshKey(_) => 3,
            VmError::OverwriteDeclined(_) => 1,
            VmError::Download { .. }
            | VmError::Provision(_)
            | VmError::SeedBuild(_)
            | VmError::DomainStart(_) => 1,
        }
    }

    /// Whether this error is raised before anything on the host is modified.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            VmError::Config(_)
                | VmError::UnsupportedDistro(_)
                | VmError::MissingSshKey(_)
                | VmError::OverwriteDeclined(_)
        )
    }
}

/// Find a [`VmError`] anywhere in a report's chain.
pub fn find_vm_error(report: &Report) -> Option<&VmError> {
    report
        .chain()
        .find_map(|cause| cause.downcast_ref::<VmError>())
}

#[cfg(test)]
mod tests {
    use color_eyre::eyre::WrapErr;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(VmError::Config("x".into()).exit_code(), 2);
        assert_eq!(VmError::UnsupportedDistro("fedora".into()).exit_code(), 2);
        assert_eq!(VmError::MissingSshKey("/nope".into()).exit_code(), 3);
        assert_eq!(VmError::OverwriteDeclined("foo".into()).exit_code(), 1);
        assert_eq!(VmError::Provision("copy".into()).exit_code(), 1);
    }

    #[test]
    fn test_find_through_context() {
        let r: color_eyre::Result<()> =
            Err(Report::new(VmError::MissingSshKey("/root/.ssh/id_rsa.pub".into())));
        let r = r.wrap_err("Resolving configuration").unwrap_err();
        let found = find_vm_error(&r).unwrap();
        assert_eq!(found.exit_code(), 3);
        assert!(found.is_preflight());
    }
}
