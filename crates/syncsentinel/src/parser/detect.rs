//! Format detection by extension, then by content.

use crate::error::{Result, SentinelError};
use crate::types::LogFormat;
use std::path::Path;

/// How many leading bytes the content sniffer looks at.
pub const SNIFF_LEN: usize = 1024;

const HTML_MARKERS: &[&str] = &["<!doctype html", "<html", "<head", "<body", "<table", "<span"];

const PLAIN_MARKERS: &[&str] = &[
    "Info:",
    "Synchronizing folder pair",
    "Items processed:",
    "Total time:",
    "Comparison finished",
];

/// Classify a log from its path and its first bytes.
///
/// `.log` is plain text and `.html`/`.htm` is HTML whatever the content. Other
/// extensions fall back to sniffing `head`.
pub fn detect_format(path: &Path, head: &[u8]) -> Result<LogFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("log") => return Ok(LogFormat::PlainText),
        Some("html" | "htm") => return Ok(LogFormat::Html),
        _ => {}
    }

    let head = &head[..head.len().min(SNIFF_LEN)];
    if head.is_empty() {
        return Err(unsupported(path, "empty file with no recognised extension"));
    }
    if head.contains(&0) {
        return Err(unsupported(path, "binary content"));
    }

    let text = String::from_utf8_lossy(head);
    let lowered = text.trim_start_matches('\u{feff}').to_ascii_lowercase();
    if HTML_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Ok(LogFormat::Html);
    }
    if PLAIN_MARKERS.iter().any(|m| text.contains(m)) {
        return Ok(LogFormat::PlainText);
    }

    Err(unsupported(path, "content matches neither log format"))
}

fn unsupported(path: &Path, reason: &str) -> SentinelError {
    SentinelError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
