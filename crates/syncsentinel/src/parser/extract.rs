//! Event extraction: token stream -> transfer records.

use super::token::{LogStat, Token, TokenResult, Verb};
use crate::types::{base_name, FileType, LogFormat, TransferRecord};
use serde::Serialize;
use tracing::debug;

/// Run statistics reported by the sync tool itself. Diagnostic only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub items_processed: Option<u64>,
    pub total_size: Option<String>,
    pub total_time: Option<String>,
    pub comparison_items: Option<u64>,
    pub comparison_time: Option<String>,
}

impl LogSummary {
    fn record(&mut self, stat: LogStat) {
        match stat {
            LogStat::ItemsProcessed { count, size } => {
                self.items_processed = Some(count);
                self.total_size = size;
            }
            LogStat::TotalTime(elapsed) => self.total_time = Some(elapsed),
            LogStat::ComparisonFinished { items, elapsed } => {
                self.comparison_items = Some(items);
                self.comparison_time = Some(elapsed);
            }
        }
    }
}

/// Mutable state while walking one log's tokens. Built fresh for every file.
#[derive(Debug, Default)]
pub struct ParseSession {
    pub session_label: Option<String>,
    pub start_time: Option<String>,
    /// Last segment of the most recent destination folder.
    pub current_dest_section: String,
    pub current_date: Option<String>,
    fallback_date: Option<String>,
    pub summary: LogSummary,
}

impl ParseSession {
    pub fn new(fallback_date: Option<String>) -> Self {
        Self {
            fallback_date,
            ..Self::default()
        }
    }

    /// Apply one token; returns a record when the token is a file creation or copy.
    pub fn apply(&mut self, token: Token) -> Option<TransferRecord> {
        match token {
            Token::SessionHeader(label) => {
                self.session_label = Some(label);
                None
            }
            Token::DateMarker(date) => {
                self.current_date = Some(date);
                None
            }
            Token::TimeMarker(time) => {
                if self.start_time.is_none() {
                    self.start_time = Some(time);
                }
                None
            }
            Token::DestSection(path) => {
                self.current_dest_section = base_name(&path).to_string();
                None
            }
            Token::Stat(stat) => {
                self.summary.record(stat);
                None
            }
            Token::OperationLine { time, verb, path } => self.operation(time, verb, &path),
        }
    }

    fn operation(&self, time: String, verb: Verb, path: &str) -> Option<TransferRecord> {
        if !verb.emits_record() {
            return None;
        }
        let file_name = base_name(path);
        if file_name.is_empty() {
            return None;
        }
        let date = self
            .current_date
            .as_deref()
            .or(self.fallback_date.as_deref())
            .unwrap_or_default();
        Some(TransferRecord::new(
            date,
            time,
            FileType::classify(file_name),
            self.current_dest_section.as_str(),
            file_name,
        ))
    }
}

/// Everything learned from one log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedLog {
    pub format: LogFormat,
    pub session_label: Option<String>,
    pub start_time: Option<String>,
    pub summary: LogSummary,
    /// Records in the order their operation lines appear.
    pub records: Vec<TransferRecord>,
    /// Lines or elements that matched no pattern.
    pub skipped: usize,
    /// Operation lines whose verb does not produce a record.
    pub ignored_operations: usize,
}

/// Walk a token stream with a fresh [`ParseSession`].
pub fn extract(
    format: LogFormat,
    tokens: impl Iterator<Item = TokenResult>,
    fallback_date: Option<String>,
) -> ParsedLog {
    let mut session = ParseSession::new(fallback_date);
    let mut records = Vec::new();
    let mut skipped = 0;
    let mut ignored_operations = 0;

    for item in tokens {
        match item {
            Ok(token) => {
                let is_operation = matches!(token, Token::OperationLine { .. });
                match session.apply(token) {
                    Some(record) => records.push(record),
                    None if is_operation => ignored_operations += 1,
                    None => {}
                }
            }
            Err(skip) => {
                debug!(line = skip.line, reason = skip.reason, "Skipped log line");
                skipped += 1;
            }
        }
    }

    ParsedLog {
        format,
        session_label: session.session_label,
        start_time: session.start_time,
        summary: session.summary,
        records,
        skipped,
        ignored_operations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::token::TokenizeSkip;

    fn op(time: &str, verb: Verb, path: &str) -> Token {
        Token::OperationLine {
            time: time.into(),
            verb,
            path: path.into(),
        }
    }

    #[test]
    fn test_records_inherit_date_and_section() {
        let tokens = vec![
            Ok(Token::SessionHeader("Nightly".into())),
            Ok(Token::DateMarker("1/2/2024".into())),
            Ok(Token::TimeMarker("9:00:00 AM".into())),
            Ok(Token::DestSection(r"D:\Backup\Shots\".into())),
            Ok(op("9:00:01 AM", Verb::CreateFile, r"D:\Backup\Shots\a.exr")),
            Ok(Token::DestSection("/mnt/backup/Audio".into())),
            Ok(op("9:00:02 AM", Verb::CopyFile, "/mnt/backup/Audio/b.wav")),
        ];
        let parsed = extract(LogFormat::PlainText, tokens.into_iter(), None);

        assert_eq!(parsed.session_label.as_deref(), Some("Nightly"));
        assert_eq!(parsed.start_time.as_deref(), Some("9:00:00 AM"));
        assert_eq!(
            parsed.records,
            vec![
                TransferRecord::new("1/2/2024", "9:00:01 AM", FileType::Image, "Shots", "a.exr"),
                TransferRecord::new("1/2/2024", "9:00:02 AM", FileType::Audio, "Audio", "b.wav"),
            ]
        );
    }

    #[test]
    fn test_missing_dest_section_gives_empty_section() {
        let tokens = vec![
            Ok(Token::DateMarker("1/2/2024".into())),
            Ok(op("9:00:01 AM", Verb::CreateFile, r"C:\x\clip.mov")),
        ];
        let parsed = extract(LogFormat::PlainText, tokens.into_iter(), None);
        assert_eq!(parsed.records[0].section(), "");
        assert_eq!(parsed.records[0].file_type(), FileType::Video);
    }

    #[test]
    fn test_non_creation_verbs_are_counted_not_emitted() {
        let tokens = vec![
            Ok(op("1:00:00 PM", Verb::DeleteFile, r"C:\x\old.mov")),
            Ok(op("1:00:01 PM", Verb::UpdateFile, r"C:\x\new.mov")),
            Ok(op("1:00:02 PM", Verb::CreateFolder, r"C:\x\dir")),
            Err(TokenizeSkip {
                line: 4,
                reason: "unrecognised line",
            }),
        ];
        let parsed = extract(LogFormat::PlainText, tokens.into_iter(), None);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.ignored_operations, 3);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_fallback_date_only_without_marker() {
        let tokens = vec![Ok(op("1:00:00 PM", Verb::CreateFile, r"C:\x\a.obj"))];
        let parsed = extract(
            LogFormat::Html,
            tokens.clone().into_iter(),
            Some("3/4/2025".into()),
        );
        assert_eq!(parsed.records[0].date(), "3/4/2025");

        let mut with_marker = vec![Ok(Token::DateMarker("5/6/2025".into()))];
        with_marker.extend(tokens);
        let parsed = extract(LogFormat::Html, with_marker.into_iter(), Some("3/4/2025".into()));
        assert_eq!(parsed.records[0].date(), "5/6/2025");
    }

    #[test]
    fn test_summary_collects_stats() {
        let tokens = vec![
            Ok(Token::Stat(LogStat::ItemsProcessed {
                count: 5,
                size: Some("1.2 MB".into()),
            })),
            Ok(Token::Stat(LogStat::TotalTime("0:00:30".into()))),
        ];
        let parsed = extract(LogFormat::PlainText, tokens.into_iter(), None);
        assert_eq!(parsed.summary.items_processed, Some(5));
        assert_eq!(parsed.summary.total_size.as_deref(), Some("1.2 MB"));
        assert_eq!(parsed.summary.total_time.as_deref(), Some("0:00:30"));
        assert_eq!(parsed.summary.comparison_items, None);
    }
}
