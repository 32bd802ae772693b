//! Small parsing helpers

use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;

/// Parse a memory size such as "2G", "1024M" or "512" into megabytes.
/// A bare number is taken as megabytes.
pub(crate) fn parse_memory_to_mb(memory_str: &str) -> Result<u32> {
    let memory_str = memory_str.trim();
    let (number, unit) = match memory_str.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&memory_str[..i], c.to_ascii_uppercase()),
        _ => (memory_str, 'M'),
    };
    if number.is_empty() {
        return Err(eyre!("Memory size '{memory_str}' has no number"));
    }
    let invalid = || format!("Invalid number in memory size '{memory_str}'");
    let mb: u64 = match unit {
        'G' => {
            let gb: f64 = number.parse().with_context(invalid)?;
            if !gb.is_finite() || gb <= 0.0 {
                return Err(eyre!(invalid()));
            }
            let mb = (gb * 1024.0).floor();
            if mb > f64::from(u32::MAX) {
                return Err(eyre!("Memory size '{memory_str}' is too large"));
            }
            mb as u64
        }
        'M' => number.parse().with_context(invalid)?,
        'K' => number.parse::<u64>().with_context(invalid)? / 1024,
        other => {
            return Err(eyre!("Unknown unit '{other}' in memory size '{memory_str}'"));
        }
    };
    u32::try_from(mb).map_err(|_| eyre!("Memory size '{memory_str}' is too large"))
}
