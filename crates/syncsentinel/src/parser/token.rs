//! Token vocabulary shared by every log tokenizer.

use crate::types::LogFormat;
use thiserror::Error;

/// One semantic unit recognised in a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Session/title label at the top of the log.
    SessionHeader(String),
    /// A calendar date (`M/D/YYYY`) that applies to the lines that follow.
    DateMarker(String),
    /// A timestamp not attached to an operation.
    TimeMarker(String),
    /// Full destination folder path of the current folder pair.
    DestSection(String),
    /// A file operation with its timestamp and the path it touched.
    OperationLine {
        time: String,
        verb: Verb,
        path: String,
    },
    /// Run statistics from the summary block.
    Stat(LogStat),
}

/// What an operation line did to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    CreateFile,
    CopyFile,
    UpdateFile,
    DeleteFile,
    MoveFile,
    CreateFolder,
    DeleteFolder,
    Other,
}

impl Verb {
    /// Map the verb and object phrase of an operation line (`Creating` + `file`).
    pub fn from_phrase(verb: &str, kind: &str) -> Self {
        match (verb, kind) {
            ("Creating", "file") => Self::CreateFile,
            ("Copying", "file") => Self::CopyFile,
            ("Updating" | "Overwriting", "file") => Self::UpdateFile,
            ("Deleting", "file") => Self::DeleteFile,
            ("Moving" | "Renaming", "file") => Self::MoveFile,
            ("Creating", "folder") => Self::CreateFolder,
            ("Deleting", "folder") => Self::DeleteFolder,
            _ => Self::Other,
        }
    }

    /// Only file creations and copies become output rows.
    pub fn emits_record(&self) -> bool {
        matches!(self, Self::CreateFile | Self::CopyFile)
    }
}

/// Summary statistics a sync run prints about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStat {
    ItemsProcessed { count: u64, size: Option<String> },
    TotalTime(String),
    ComparisonFinished { items: u64, elapsed: String },
}

/// A line or element that matched no pattern. Counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct TokenizeSkip {
    /// 1-based line number where the skipped text starts.
    pub line: usize,
    pub reason: &'static str,
}

pub type TokenResult = Result<Token, TokenizeSkip>;

/// Turns raw log text into an ordered token stream.
///
/// Implementations keep no state between calls: tokenizing the same input twice
/// yields the same sequence.
pub trait Tokenizer: Send + Sync {
    fn format(&self) -> LogFormat;

    fn tokenize<'a>(&self, input: &'a str) -> Box<dyn Iterator<Item = TokenResult> + 'a>;
}

/// The tokenizer for a detected format.
pub fn tokenizer_for(format: LogFormat) -> Box<dyn Tokenizer> {
    match format {
        LogFormat::PlainText => Box::new(super::plain::PlainTextTokenizer),
        LogFormat::Html => Box::new(super::html::HtmlTokenizer),
    }
}

/// Where a `Synchronizing folder pair:` block is in its two trailing path lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum FolderPair {
    #[default]
    Idle,
    ExpectSource,
    ExpectDest,
}

impl FolderPair {
    /// Feed one text line of an open block.
    ///
    /// `None` means the line was not consumed and should be classified as usual;
    /// `Some(None)` means it was taken as the source path; `Some(Some(token))`
    /// carries the destination. A line that is itself log content (an operation,
    /// a time, a header, a statistic, another block) closes the block untouched.
    pub(crate) fn feed(&mut self, text: &str) -> Option<Option<Token>> {
        use super::patterns::{DEST_PREFIX, SOURCE_PREFIX};

        if *self == Self::Idle {
            return None;
        }
        if is_log_content(text) {
            *self = Self::Idle;
            return None;
        }

        match *self {
            Self::Idle => None,
            Self::ExpectSource => {
                if let Some(caps) = DEST_PREFIX.captures(text) {
                    *self = Self::Idle;
                    return Some(Some(Token::DestSection(caps["path"].to_string())));
                }
                *self = Self::ExpectDest;
                Some(None)
            }
            Self::ExpectDest => {
                *self = Self::Idle;
                let path = DEST_PREFIX
                    .captures(text)
                    .map(|caps| caps["path"].to_string())
                    .or_else(|| {
                        // A second Source: line means the block is not what we expected.
                        if SOURCE_PREFIX.is_match(text) {
                            None
                        } else {
                            Some(text.trim().to_string())
                        }
                    });
                Some(path.map(Token::DestSection))
            }
        }
    }
}

/// Lines that carry their own meaning and can never be a folder-pair path.
fn is_log_content(text: &str) -> bool {
    use super::patterns::{
        BARE_TIME, BRACKET_TIME, FOLDER_PAIR, LEADING_DATE, OPERATION, SESSION_HEADER,
    };

    OPERATION.is_match(text)
        || BRACKET_TIME.is_match(text)
        || BARE_TIME.is_match(text)
        || LEADING_DATE.is_match(text)
        || SESSION_HEADER.is_match(text)
        || FOLDER_PAIR.is_match(text)
        || match_stat(text).is_some()
}

/// Recognise summary statistics anywhere in a line of text.
pub(crate) fn match_stat(text: &str) -> Option<LogStat> {
    use super::patterns::{parse_count, COMPARISON_FINISHED, ITEMS_PROCESSED, TOTAL_TIME};

    if let Some(caps) = COMPARISON_FINISHED.captures(text) {
        return Some(LogStat::ComparisonFinished {
            items: parse_count(&caps["items"])?,
            elapsed: caps["elapsed"].to_string(),
        });
    }
    if let Some(caps) = ITEMS_PROCESSED.captures(text) {
        return Some(LogStat::ItemsProcessed {
            count: parse_count(&caps["count"])?,
            size: caps.name("size").map(|m| m.as_str().trim().to_string()),
        });
    }
    TOTAL_TIME
        .captures(text)
        .map(|caps| LogStat::TotalTime(caps["elapsed"].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_policy() {
        assert!(Verb::from_phrase("Creating", "file").emits_record());
        assert!(Verb::from_phrase("Copying", "file").emits_record());
        assert!(!Verb::from_phrase("Deleting", "file").emits_record());
        assert!(!Verb::from_phrase("Updating", "file").emits_record());
        assert!(!Verb::from_phrase("Creating", "folder").emits_record());
        assert_eq!(Verb::from_phrase("Creating", "link"), Verb::Other);
    }

    #[test]
    fn test_folder_pair_with_prefixes() {
        let mut pair = FolderPair::ExpectSource;
        assert_eq!(pair.feed(r"Source: C:\Source"), Some(None));
        assert_eq!(
            pair.feed(r"Dest: C:\Dest\VideoFile\Project"),
            Some(Some(Token::DestSection(r"C:\Dest\VideoFile\Project".into())))
        );
        assert_eq!(pair, FolderPair::Idle);
        assert_eq!(pair.feed("anything"), None);
    }

    #[test]
    fn test_folder_pair_bare_paths() {
        let mut pair = FolderPair::ExpectSource;
        assert_eq!(pair.feed(r"C:\Source"), Some(None));
        assert_eq!(
            pair.feed(r"D:\Backup"),
            Some(Some(Token::DestSection(r"D:\Backup".into())))
        );
    }

    #[test]
    fn test_folder_pair_yields_to_log_content() {
        let mut pair = FolderPair::ExpectSource;
        assert_eq!(
            pair.feed(r#"Info: [2:30:20 PM] Creating file "C:\D\P\a.mov""#),
            None
        );
        assert_eq!(pair, FolderPair::Idle);

        let mut pair = FolderPair::ExpectSource;
        assert_eq!(pair.feed(r"C:\Source"), Some(None));
        assert_eq!(pair.feed("2:30:20 PM"), None);
        assert_eq!(pair, FolderPair::Idle);

        let mut pair = FolderPair::ExpectSource;
        assert_eq!(pair.feed("|    Total time: 0:00:30"), None);
        assert_eq!(pair, FolderPair::Idle);

        let mut pair = FolderPair::ExpectDest;
        assert_eq!(pair.feed("Synchronizing folder pair: Mirror >"), None);
        assert_eq!(pair, FolderPair::Idle);
    }

    #[test]
    fn test_match_stat() {
        assert_eq!(
            match_stat("|    Items processed: 5 (1.2 MB)"),
            Some(LogStat::ItemsProcessed {
                count: 5,
                size: Some("1.2 MB".into())
            })
        );
        assert_eq!(
            match_stat("|    Total time: 0:00:30"),
            Some(LogStat::TotalTime("0:00:30".into()))
        );
        assert_eq!(match_stat("nothing here"), None);
    }
}
