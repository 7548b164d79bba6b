//! Log parsing: format detection, tokenizers and event extraction.
//!
//! Two dialects share one token vocabulary ([`Token`]); each has its own
//! [`Tokenizer`] and both feed the same extractor.

pub mod detect;
pub mod extract;
pub mod html;
pub(crate) mod patterns;
pub mod plain;
pub mod token;

pub use detect::detect_format;
pub use extract::{extract, LogSummary, ParseSession, ParsedLog};
pub use html::HtmlTokenizer;
pub use plain::PlainTextTokenizer;
pub use token::{tokenizer_for, LogStat, Token, TokenResult, TokenizeSkip, Tokenizer, Verb};

use crate::error::{Result, SentinelError};
use crate::types::LogFormat;
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Parse log text of a known format. No fallback date is applied.
pub fn parse_str(input: &str, format: LogFormat) -> ParsedLog {
    let tokenizer = tokenizer_for(format);
    extract(format, tokenizer.tokenize(input), None)
}

/// Read, detect and parse one log file.
///
/// Records in a log without any date marker are dated with the file's
/// modification day.
pub fn parse_file(path: &Path) -> Result<ParsedLog> {
    let bytes = fs::read(path).map_err(|e| SentinelError::io(path, e))?;
    let format = detect_format(path, &bytes)?;

    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start_matches('\u{feff}');

    let fallback_date = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(format_log_date);

    let tokenizer = tokenizer_for(format);
    Ok(extract(format, tokenizer.tokenize(text), fallback_date))
}

/// `M/D/YYYY` in local time, the way the sync tool writes dates.
pub fn format_log_date(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%-m/%-d/%Y").to_string()
}
