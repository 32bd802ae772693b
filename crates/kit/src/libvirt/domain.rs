//! Extracting what we need from a domain's XML definition
//!
//! We only ever look at two attributes, so plain pattern matching is
//! enough; there is no need for a full XML parser.

use std::sync::OnceLock;

use regex::Regex;

fn mac_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<mac\s+address\s*=\s*['"]([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5})['"]"#)
            .expect("valid regex")
    })
}

fn cdrom_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)<disk\b[^>]*\bdevice\s*=\s*['"]cdrom['"][^>]*>.*?<target\b[^>]*\bdev\s*=\s*['"]([^'"]+)['"]"#,
        )
        .expect("valid regex")
    })
}

/// MAC address of the first network interface, lowercased.
pub fn primary_mac(xml: &str) -> Option<String> {
    mac_re().captures(xml).map(|c| c[1].to_ascii_lowercase())
}

/// Target device name (e.g. `hda`, `sda`) of the first CD-ROM drive.
pub fn cdrom_target(xml: &str) -> Option<String> {
    cdrom_re().captures(xml).map(|c| c[1].to_owned())
}
