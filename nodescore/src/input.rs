//! Turning a subscription file or stdin into a list of raw share links.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

pub fn read_source(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => Ok(std::fs::read_to_string(p)?),
        _ => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s)?;
            Ok(s)
        }
    }
}

/// Split into candidate links: a whole-body base64 subscription is decoded
/// first, then blank lines, `#` comments and repeats are dropped.
pub fn raw_lines(content: &str) -> Vec<String> {
    let content = decode_subscription(content).unwrap_or_else(|| content.to_string());
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| seen.insert(l.to_string()))
        .map(String::from)
        .collect()
}

/// Returns the decoded text when the whole input is strict, canonical base64.
fn decode_subscription(content: &str) -> Option<String> {
    let compact: String = content.split_whitespace().collect();
    if compact.is_empty() || compact.len() % 4 != 0 || compact.contains("://") {
        return None;
    }
    let bytes = STANDARD.decode(&compact).ok()?;
    if STANDARD.encode(&bytes) != compact {
        return None;
    }
    String::from_utf8(bytes).ok()
}
