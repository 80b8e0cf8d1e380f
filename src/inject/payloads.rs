//! Payload template file loading
//!
//! One template per line, `#` comments and blank lines skipped, trailing
//! newlines stripped with leading whitespace preserved. Compatible with
//! SecLists/Wfuzz-style wordlists.

use crate::error::Result;
use std::path::Path;

/// Loads payload templates from a file.
pub fn load_payloads(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
