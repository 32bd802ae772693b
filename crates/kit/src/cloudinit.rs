//! Cloud-init NoCloud seed generation
//!
//! The guest finds its seed by volume label, so the ISO must be labelled
//! exactly `cidata`.

use std::fs::File;

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::instrument;
use yaml_rust2::{yaml, Yaml, YamlEmitter};

use crate::cmdext::CommandLogExt;
use crate::errors::VmError;
use crate::images::Distro;
use crate::tools::Toolchain;
use crate::workspace::VmWorkspace;

/// Volume label cloud-init's NoCloud datasource looks for.
pub const SEED_VOLUME_ID: &str = "cidata";
/// Domain appended to the VM name to form its FQDN.
pub const DOMAIN_SUFFIX: &str = "example.local";
/// Where cloud-init's own output goes inside the guest.
pub const GUEST_CLOUDINIT_LOG: &str = "/var/log/cloud-init.log";

/// Inputs to the seed documents.
#[derive(Debug, Clone)]
pub struct SeedConfig<'a> {
    pub vm_name: &'a str,
    pub pubkey: &'a str,
    pub distro: Distro,
}

fn s(v: &str) -> Yaml {
    Yaml::String(v.to_owned())
}

fn emit(doc: yaml::Hash) -> Result<String> {
    let mut out_str = String::new();
    let mut emitter = YamlEmitter::new(&mut out_str);
    emitter.dump(&Yaml::Hash(doc))?;
    out_str.push('\n');
    Ok(out_str)
}

impl SeedConfig<'_> {
    pub fn fqdn(&self) -> String {
        format!("{}.{DOMAIN_SUFFIX}", self.vm_name)
    }

    /// Render the `user-data` document.
    pub fn user_data(&self) -> Result<String> {
        let mut v = yaml::Hash::new();
        v.insert(s("preserve_hostname"), Yaml::Boolean(false));
        v.insert(s("hostname"), s(self.vm_name));
        v.insert(s("fqdn"), s(&self.fqdn()));
        {
            let mut output = yaml::Hash::new();
            output.insert(s("all"), s(&format!(">> {GUEST_CLOUDINIT_LOG}")));
            v.insert(s("output"), Yaml::Hash(output));
        }
        v.insert(s("ssh_deletekeys"), Yaml::Boolean(true));
        v.insert(
            s("ssh_genkeytypes"),
            Yaml::Array(vec![s("ed25519"), s("rsa")]),
        );
        v.insert(s("ssh_authorized_keys"), Yaml::Array(vec![s(self.pubkey)]));
        {
            let cmd = self
                .distro
                .remove_cloudinit_cmd()
                .iter()
                .map(|a| s(a))
                .collect();
            v.insert(s("runcmd"), Yaml::Array(vec![Yaml::Array(cmd)]));
        }

        let mut out_str = emit(v)?;
        // Prefix with the magic comment
        out_str.insert_str(0, "#cloud-config\n");
        Ok(out_str)
    }

    /// Render the `meta-data` document.
    pub fn meta_data(&self) -> Result<String> {
        let mut v = yaml::Hash::new();
        v.insert(s("instance-id"), s(self.vm_name));
        v.insert(s("local-hostname"), s(self.vm_name));
        emit(v)
    }
}

/// Write the seed documents into the workspace and package them as an
/// ISO9660 volume, returning its path.
#[instrument(skip_all, fields(vm = seed.vm_name))]
pub fn build(
    seed: &SeedConfig<'_>,
    ws: &VmWorkspace,
    tools: &Toolchain,
    log: &File,
) -> Result<Utf8PathBuf> {
    let user_data = ws.user_data_path();
    let meta_data = ws.meta_data_path();
    let iso = ws.seed_iso_path();

    let seed_err = |e: color_eyre::Report| VmError::SeedBuild(format!("{e:#}"));
    let (ud, md) = (seed.user_data(), seed.meta_data());
    std::fs::write(&user_data, ud.map_err(seed_err)?)
        .map_err(|e| seed_err(eyre!("Writing {user_data}: {e}")))?;
    std::fs::write(&meta_data, md.map_err(seed_err)?)
        .map_err(|e| seed_err(eyre!("Writing {meta_data}: {e}")))?;

    tracing::debug!("Packaging {iso}");
    tools
        .genisoimage()
        .args(["-output", iso.as_str()])
        .args(["-volid", SEED_VOLUME_ID])
        .args(["-joliet", "-rock"])
        .args([user_data.as_str(), meta_data.as_str()])
        .run_logged(log)
        .map_err(seed_err)?;
    if !iso.exists() {
        return Err(seed_err(eyre!("{iso} was not created")).into());
    }
    Ok(iso)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use yaml_rust2::YamlLoader;

    use super::*;
    use crate::errors::find_vm_error;
    use crate::testutil::{utf8_tempdir, write_script};

    const STUBKEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIHk7 op@workstation";

    fn seed(distro: Distro) -> SeedConfig<'static> {
        SeedConfig {
            vm_name: "foo",
            pubkey: STUBKEY,
            distro,
        }
    }

    #[test]
    fn test_user_data() {
        let rendered = seed(Distro::Centos7).user_data().unwrap();
        assert!(rendered.starts_with("#cloud-config\n"));
        let docs = YamlLoader::load_from_str(&rendered).unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["preserve_hostname"].as_bool(), Some(false));
        assert_eq!(doc["hostname"].as_str(), Some("foo"));
        assert_eq!(doc["fqdn"].as_str(), Some("foo.example.local"));
        assert_eq!(
            doc["output"]["all"].as_str(),
            Some(">> /var/log/cloud-init.log")
        );
        assert_eq!(doc["ssh_deletekeys"].as_bool(), Some(true));
        let keytypes: Vec<_> = doc["ssh_genkeytypes"]
            .as_vec()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(keytypes, ["ed25519", "rsa"]);
        let keys = doc["ssh_authorized_keys"].as_vec().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].as_str(), Some(STUBKEY));
        let runcmd = doc["runcmd"].as_vec().unwrap();
        assert_eq!(runcmd.len(), 1);
        let cmd: Vec<_> = runcmd[0]
            .as_vec()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(cmd, ["yum", "-y", "remove", "cloud-init"]);
    }

    #[test]
    fn test_user_data_debian() {
        let rendered = seed(Distro::Debian8).user_data().unwrap();
        let doc = &YamlLoader::load_from_str(&rendered).unwrap()[0];
        assert_eq!(doc["runcmd"][0][0].as_str(), Some("apt-get"));
    }

    #[test]
    fn test_meta_data() {
        let rendered = seed(Distro::Centos7).meta_data().unwrap();
        let doc = &YamlLoader::load_from_str(&rendered).unwrap()[0];
        assert_eq!(doc["instance-id"].as_str(), Some("foo"));
        assert_eq!(doc["local-hostname"].as_str(), Some("foo"));
        assert_eq!(doc.as_hash().unwrap().len(), 2);
    }

    #[test]
    fn test_awkward_values_survive() {
        // A key comment with YAML-significant characters must round trip
        let key = "ssh-rsa AAAA== op: \"quoted\" # not a comment";
        let sc = SeedConfig {
            vm_name: "123",
            pubkey: key,
            distro: Distro::Centos6,
        };
        let doc = &YamlLoader::load_from_str(&sc.user_data().unwrap()).unwrap()[0];
        assert_eq!(doc["ssh_authorized_keys"][0].as_str(), Some(key));
        assert_eq!(doc["hostname"].as_str(), Some("123"));
    }

    fn workspace() -> (tempfile::TempDir, VmWorkspace, File) {
        let (td, root) = utf8_tempdir();
        let ws = VmWorkspace::new(&root, "foo");
        ws.create_fresh().unwrap();
        let log = ws.open_log().unwrap();
        (td, ws, log)
    }

    #[test]
    fn test_build_invokes_packager() {
        let (_td, ws, log) = workspace();
        // Stand-in packager: record the arguments and create the output file
        let fake = write_script(
            ws.dir(),
            "fake-genisoimage",
            "echo \"$@\" > \"$(dirname \"$2\")/args\"\ntouch \"$2\"\n",
        );
        let tools = Toolchain {
            genisoimage: fake.into_std_path_buf().into_os_string(),
            ..Default::default()
        };

        let iso = build(&seed(Distro::Centos7), &ws, &tools, &log).unwrap();
        assert_eq!(iso, ws.seed_iso_path());
        let args = std::fs::read_to_string(ws.dir().join("args")).unwrap();
        assert_eq!(
            args.trim(),
            format!(
                "-output {} -volid cidata -joliet -rock {} {}",
                ws.seed_iso_path(),
                ws.user_data_path(),
                ws.meta_data_path()
            )
        );
        let ud = std::fs::read_to_string(ws.user_data_path()).unwrap();
        assert!(ud.contains(STUBKEY));
    }

    #[test]
    fn test_build_failure() {
        let (_td, ws, log) = workspace();
        let tools = Toolchain {
            genisoimage: "false".into(),
            ..Default::default()
        };
        let e = build(&seed(Distro::Centos7), &ws, &tools, &log).unwrap_err();
        assert!(matches!(find_vm_error(&e), Some(VmError::SeedBuild(_))));
    }
}
