//! Fixtures shared by unit tests

use std::os::unix::fs::PermissionsExt as _;

use camino::{Utf8Path, Utf8PathBuf};

/// A temporary directory along with its UTF-8 path.
pub(crate) fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let td = tempfile::tempdir().unwrap();
    let p = Utf8PathBuf::from_path_buf(td.path().to_owned()).unwrap();
    (td, p)
}

/// Write an executable `/bin/sh` script standing in for an external tool.
pub(crate) fn write_script(dir: &Utf8Path, name: &str, body: &str) -> Utf8PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&p).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&p, perms).unwrap();
    p
}
