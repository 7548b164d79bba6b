//! Line-oriented tokenizer for `.log` files.

use super::patterns::{
    normalize_time, BRACKET_TIME, DEST_PREFIX, FOLDER_PAIR, OPERATION, SESSION_HEADER,
    SOURCE_PREFIX,
};
use super::token::{match_stat, FolderPair, Token, TokenResult, TokenizeSkip, Tokenizer, Verb};
use crate::types::LogFormat;
use std::collections::VecDeque;
use std::iter::Enumerate;
use std::str::Lines;

/// Tokenizer for the plain-text log dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextTokenizer;

impl Tokenizer for PlainTextTokenizer {
    fn format(&self) -> LogFormat {
        LogFormat::PlainText
    }

    fn tokenize<'a>(&self, input: &'a str) -> Box<dyn Iterator<Item = TokenResult> + 'a> {
        Box::new(PlainTokens {
            lines: input.lines().enumerate(),
            pending: VecDeque::new(),
            pair: FolderPair::default(),
        })
    }
}

struct PlainTokens<'a> {
    lines: Enumerate<Lines<'a>>,
    pending: VecDeque<TokenResult>,
    pair: FolderPair,
}

impl Iterator for PlainTokens<'_> {
    type Item = TokenResult;

    fn next(&mut self) -> Option<TokenResult> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let (idx, raw) = self.lines.next()?;
            self.classify_line(idx + 1, raw.trim());
        }
    }
}

impl PlainTokens<'_> {
    fn classify_line(&mut self, line_no: usize, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Some(dest) = self.pair.feed(line) {
            if let Some(token) = dest {
                self.pending.push_back(Ok(token));
            }
            return;
        }

        if let Some(caps) = SESSION_HEADER.captures(line) {
            self.pending.extend([
                Ok(Token::SessionHeader(caps["label"].trim().to_string())),
                Ok(Token::DateMarker(caps["date"].to_string())),
                Ok(Token::TimeMarker(normalize_time(&caps["time"]))),
            ]);
            return;
        }

        if FOLDER_PAIR.is_match(line) {
            self.pair = FolderPair::ExpectSource;
            return;
        }

        if let Some(caps) = DEST_PREFIX.captures(line) {
            self.pending
                .push_back(Ok(Token::DestSection(caps["path"].to_string())));
            return;
        }
        if SOURCE_PREFIX.is_match(line) {
            return;
        }

        if let Some(stat) = match_stat(line) {
            self.pending.push_back(Ok(Token::Stat(stat)));
            return;
        }

        if let Some(caps) = OPERATION.captures(line) {
            let time = BRACKET_TIME.captures(line).map(|t| normalize_time(&t[1]));
            match (line.contains("Info:"), time) {
                (true, Some(time)) => self.pending.push_back(Ok(Token::OperationLine {
                    time,
                    verb: Verb::from_phrase(&caps["verb"], &caps["kind"]),
                    path: caps["path"].to_string(),
                })),
                _ => self.pending.push_back(Err(TokenizeSkip {
                    line: line_no,
                    reason: "operation line without Info: prefix or bracketed time",
                })),
            }
            return;
        }

        if let Some(caps) = BRACKET_TIME.captures(line) {
            self.pending
                .push_back(Ok(Token::TimeMarker(normalize_time(&caps[1]))));
            return;
        }

        self.pending.push_back(Err(TokenizeSkip {
            line: line_no,
            reason: "unrecognised line",
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::token::LogStat;

    const SAMPLE: &str = r#"Test Sync 9/13/2025 [2:30:15 PM]
|    Items processed: 5 (1.2 MB)
|    Total time: 0:00:30
Info: Comparison finished: 5 items found – Time elapsed: 0:00:15
Synchronizing folder pair: Update >
Source: C:\Source
Dest: C:\Dest\VideoFile\Project
Info: [2:30:20 PM] Creating file "C:\Dest\VideoFile\Project\test.mov"
"#;

    fn tokens(input: &str) -> Vec<TokenResult> {
        PlainTextTokenizer.tokenize(input).collect()
    }

    #[test]
    fn test_sample_token_sequence() {
        let got: Vec<Token> = tokens(SAMPLE).into_iter().map(|t| t.unwrap()).collect();
        assert_eq!(
            got,
            vec![
                Token::SessionHeader("Test Sync".into()),
                Token::DateMarker("9/13/2025".into()),
                Token::TimeMarker("2:30:15 PM".into()),
                Token::Stat(LogStat::ItemsProcessed {
                    count: 5,
                    size: Some("1.2 MB".into())
                }),
                Token::Stat(LogStat::TotalTime("0:00:30".into())),
                Token::Stat(LogStat::ComparisonFinished {
                    items: 5,
                    elapsed: "0:00:15".into()
                }),
                Token::DestSection(r"C:\Dest\VideoFile\Project".into()),
                Token::OperationLine {
                    time: "2:30:20 PM".into(),
                    verb: Verb::CreateFile,
                    path: r"C:\Dest\VideoFile\Project\test.mov".into(),
                },
            ]
        );
    }

    #[test]
    fn test_tokenize_is_restartable() {
        let tokenizer = PlainTextTokenizer;
        let first: Vec<_> = tokenizer.tokenize(SAMPLE).collect();
        let second: Vec<_> = tokenizer.tokenize(SAMPLE).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unrecognised_line_reports_line_number() {
        let input = "Test Sync 9/13/2025 [2:30:15 PM]\n\n@@garbage@@\n";
        let skips: Vec<TokenizeSkip> = tokens(input).into_iter().filter_map(|t| t.err()).collect();
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].line, 3);
    }

    #[test]
    fn test_operation_without_time_is_skipped() {
        let input = r#"Info: Creating file "C:\Dest\a.mov""#;
        let items = tokens(input);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn test_time_after_info_prefix() {
        let input = r#"[2:30:20 PM] Info: Copying file "C:\Dest\a.png""#;
        assert_eq!(
            tokens(input),
            vec![Ok(Token::OperationLine {
                time: "2:30:20 PM".into(),
                verb: Verb::CopyFile,
                path: r"C:\Dest\a.png".into(),
            })]
        );
    }

    #[test]
    fn test_bare_folder_pair_paths() {
        let input = "Synchronizing folder pair: Mirror >\n  C:\\Src\n  D:\\Backup\\Shots\n";
        assert_eq!(
            tokens(input),
            vec![Ok(Token::DestSection(r"D:\Backup\Shots".into()))]
        );
    }

    #[test]
    fn test_folder_pair_without_paths_keeps_operations() {
        let input = "Run 9/13/2025 [2:30:15 PM]\n\
                     Synchronizing folder pair: Update >\n\
                     Info: [2:30:20 PM] Creating file \"C:\\D\\P\\a.mov\"\n\
                     Info: [2:30:21 PM] Creating file \"C:\\D\\P\\b.mov\"\n";
        let ops: Vec<Token> = tokens(input)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|t| matches!(t, Token::OperationLine { .. } | Token::DestSection(_)))
            .collect();
        assert_eq!(
            ops,
            vec![
                Token::OperationLine {
                    time: "2:30:20 PM".into(),
                    verb: Verb::CreateFile,
                    path: r"C:\D\P\a.mov".into(),
                },
                Token::OperationLine {
                    time: "2:30:21 PM".into(),
                    verb: Verb::CreateFile,
                    path: r"C:\D\P\b.mov".into(),
                },
            ]
        );
    }
}
