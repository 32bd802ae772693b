//! Locations of the external virtualization tools we drive
//!
//! All commands are built from a [`Toolchain`] resolved once at startup,
//! so tests can substitute stand-in programs.

use std::ffi::OsString;
use std::process::Command;

/// Program names (or paths) for each external collaborator, plus the
/// libvirt connection to target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub virsh: OsString,
    pub virt_install: OsString,
    pub qemu_img: OsString,
    pub virt_resize: OsString,
    pub genisoimage: OsString,
    /// Libvirt connection URI; `None` uses the toolchain default.
    pub connect: Option<String>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            virsh: "virsh".into(),
            virt_install: "virt-install".into(),
            qemu_img: "qemu-img".into(),
            virt_resize: "virt-resize".into(),
            genisoimage: "genisoimage".into(),
            connect: None,
        }
    }
}

impl Toolchain {
    /// Apply `VIRT_PROVISION_<TOOL>` overrides using the provided lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let slots: [(&str, &mut OsString); 5] = [
            ("VIRT_PROVISION_VIRSH", &mut self.virsh),
            ("VIRT_PROVISION_VIRT_INSTALL", &mut self.virt_install),
            ("VIRT_PROVISION_QEMU_IMG", &mut self.qemu_img),
            ("VIRT_PROVISION_VIRT_RESIZE", &mut self.virt_resize),
            ("VIRT_PROVISION_GENISOIMAGE", &mut self.genisoimage),
        ];
        for (key, slot) in slots {
            if let Some(v) = lookup(key).filter(|v| !v.is_empty()) {
                tracing::debug!("{key}={}", v.to_string_lossy());
                *slot = v;
            }
        }
        self
    }

    /// A `virsh` invocation bound to our connection.
    pub fn virsh(&self) -> Command {
        let mut r = Command::new(&self.virsh);
        if let Some(uri) = self.connect.as_deref() {
            r.args(["-c", uri]);
        }
        r
    }

    /// A `virt-install` invocation bound to our connection.
    pub fn virt_install(&self) -> Command {
        let mut r = Command::new(&self.virt_install);
        if let Some(uri) = self.connect.as_deref() {
            r.arg(format!("--connect={uri}"));
        }
        r
    }

    pub fn qemu_img(&self) -> Command {
        Command::new(&self.qemu_img)
    }

    pub fn virt_resize(&self) -> Command {
        Command::new(&self.virt_resize)
    }

    pub fn genisoimage(&self) -> Command {
        Command::new(&self.genisoimage)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("VIRT_PROVISION_VIRSH", "/opt/fake/virsh"),
            ("VIRT_PROVISION_GENISOIMAGE", ""),
        ]
        .into_iter()
        .collect();
        let t = Toolchain::default().with_overrides(|k| env.get(k).map(OsString::from));
        assert_eq!(t.virsh, OsString::from("/opt/fake/virsh"));
        // Empty values are ignored
        assert_eq!(t.genisoimage, OsString::from("genisoimage"));
        assert_eq!(t.qemu_img, OsString::from("qemu-img"));
    }

    #[test]
    fn test_connection_args() {
        let t = Toolchain {
            connect: Some("qemu:///system".into()),
            ..Default::default()
        };
        let mut c = t.virsh();
        c.args(["dominfo", "foo"]);
        assert_eq!(args_of(&c), ["-c", "qemu:///system", "dominfo", "foo"]);
        assert_eq!(args_of(&t.virt_install()), ["--connect=qemu:///system"]);
        assert!(args_of(&Toolchain::default().virsh()).is_empty());
    }

    fn args_of(c: &Command) -> Vec<String> {
        c.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}
