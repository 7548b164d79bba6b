//! Regex patterns shared by both tokenizers.

use regex::Regex;
use std::sync::LazyLock;

const TIME: &str = r"\d{1,2}:\d{2}:\d{2}(?:\s*[AaPp][Mm])?";

/// `Test Sync 9/13/2025 [2:30:15 PM]`
pub(crate) static SESSION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<label>.+?)\s+(?P<date>\d{{1,2}}/\d{{1,2}}/\d{{4}})\s+\[(?P<time>{TIME})\]\s*$"
    ))
    .expect("valid session header regex")
});

pub(crate) static BRACKET_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\[({TIME})\]")).expect("valid bracket time regex"));

pub(crate) static BARE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^\s*({TIME})\s*$")).expect("valid time regex"));

pub(crate) static ANY_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b({TIME})")).expect("valid time regex"));

pub(crate) static LEADING_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}/\d{1,2}/\d{4})\b").expect("valid date regex")
});

/// `Creating file "C:\Dest\a.mov"`; the first quoted path is the operation's subject.
pub(crate) static OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<verb>Creating|Copying|Updating|Overwriting|Deleting|Moving|Renaming)\s+(?P<kind>file|folder|symbolic link|link)\s+"(?P<path>[^"]+)""#,
    )
    .expect("valid operation regex")
});

pub(crate) static FOLDER_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Synchronizing folder pair:").expect("valid folder pair regex")
});

pub(crate) static SOURCE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:Source|Left):\s*(?P<path>.+?)\s*$").expect("valid source regex")
});

pub(crate) static DEST_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:Dest|Destination|Target|Right):\s*(?P<path>.+?)\s*$")
        .expect("valid dest regex")
});

pub(crate) static ITEMS_PROCESSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Items processed:\s*(?P<count>[\d,]+)(?:\s*\((?P<size>[^)]+)\))?")
        .expect("valid items regex")
});

pub(crate) static TOTAL_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Total time:\s*(?P<elapsed>\d+:\d{2}:\d{2})").expect("valid total time regex")
});

pub(crate) static COMPARISON_FINISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Comparison finished:\s*(?P<items>[\d,]+)\s+items?\s+found\s*[–—-]\s*Time elapsed:\s*(?P<elapsed>\d+:\d{2}:\d{2})",
    )
    .expect("valid comparison regex")
});

/// Canonical `H:MM:SS AM` spelling: single space, upper-case marker.
pub(crate) fn normalize_time(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let split = compact
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(compact.len());
    let (clock, marker) = compact.split_at(split);
    if marker.is_empty() {
        clock.to_string()
    } else {
        format!("{} {}", clock, marker.to_ascii_uppercase())
    }
}

pub(crate) fn parse_count(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}
