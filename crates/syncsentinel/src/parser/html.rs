//! Markup tokenizer for `.html` logs.
//!
//! The HTML dialect carries the same information as the plain-text one, spread over
//! elements: a bold styled `span` holds the session title, `td` cells hold operation
//! times and loose text segments hold the (entity-escaped) operation lines.

use super::patterns::{
    normalize_time, ANY_TIME, BARE_TIME, BRACKET_TIME, DEST_PREFIX, FOLDER_PAIR, LEADING_DATE,
    OPERATION, SESSION_HEADER, SOURCE_PREFIX,
};
use super::token::{match_stat, FolderPair, Token, TokenResult, TokenizeSkip, Tokenizer, Verb};
use crate::types::LogFormat;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::VecDeque;

/// Tokenizer for the HTML log dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTokenizer;

impl Tokenizer for HtmlTokenizer {
    fn format(&self) -> LogFormat {
        LogFormat::Html
    }

    fn tokenize<'a>(&self, input: &'a str) -> Box<dyn Iterator<Item = TokenResult> + 'a> {
        let mut reader = Reader::from_str(input);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        Box::new(HtmlTokens {
            reader,
            input,
            lines: LineCounter::default(),
            pending: VecDeque::new(),
            hidden_depth: 0,
            in_title_span: false,
            in_cell: false,
            cell_time: None,
            label_cell: None,
            session_seen: false,
            pair: FolderPair::default(),
            done: false,
        })
    }
}

struct HtmlTokens<'a> {
    reader: Reader<&'a [u8]>,
    input: &'a str,
    lines: LineCounter,
    pending: VecDeque<TokenResult>,
    /// Nesting depth inside `style`/`script`/`title`, whose text is never log content.
    hidden_depth: usize,
    in_title_span: bool,
    in_cell: bool,
    /// Time read from the current row's cell, waiting for its operation text.
    cell_time: Option<String>,
    /// A `Label:` cell waiting for the value in the next cell, with its line.
    label_cell: Option<(usize, String)>,
    session_seen: bool,
    pair: FolderPair,
    done: bool,
}

impl Iterator for HtmlTokens<'_> {
    type Item = TokenResult;

    fn next(&mut self) -> Option<TokenResult> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            self.advance();
        }
    }
}

impl HtmlTokens<'_> {
    /// Read one markup event and queue whatever tokens it produces.
    fn advance(&mut self) {
        let start = self.reader.buffer_position() as usize;
        let line = self.lines.line_at(self.input, start);

        match self.reader.read_event() {
            Ok(Event::Start(e)) => self.open(&e),
            Ok(Event::End(e)) => {
                let name = e.local_name().as_ref().to_ascii_lowercase();
                match name.as_slice() {
                    b"style" | b"script" | b"title" => {
                        self.hidden_depth = self.hidden_depth.saturating_sub(1)
                    }
                    b"span" => self.in_title_span = false,
                    b"td" | b"th" => self.in_cell = false,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if self.hidden_depth > 0 {
                    return;
                }
                let raw = String::from_utf8_lossy(&e);
                let text = unescape_with(&raw, resolve_html5_entity)
                    .map(|t| t.into_owned())
                    .unwrap_or_else(|_| unescape_lenient(&raw));
                // Leading whitespace was trimmed, so line numbers count from the first
                // non-blank character of the segment.
                let offset = self.input[start..]
                    .find(|c: char| !c.is_whitespace())
                    .unwrap_or(0);
                let base = self.lines.line_at(self.input, start + offset);
                for (idx, segment) in text.lines().enumerate() {
                    let segment = segment.trim();
                    if !segment.is_empty() {
                        self.segment(base + idx, segment);
                    }
                }
            }
            Ok(Event::Eof) => {
                self.flush_label();
                self.done = true;
            }
            Err(_) => {
                self.pending.push_back(Err(TokenizeSkip {
                    line,
                    reason: "malformed markup, rest of document ignored",
                }));
                self.done = true;
            }
            // Empty elements (<br/>), comments, doctype, processing instructions.
            Ok(_) => {}
        }
    }

    fn open(&mut self, e: &BytesStart<'_>) {
        let name = e.local_name().as_ref().to_ascii_lowercase();
        match name.as_slice() {
            b"style" | b"script" | b"title" => self.hidden_depth += 1,
            b"span" => self.in_title_span = is_title_span(e),
            b"tr" => {
                self.cell_time = None;
                self.flush_label();
            }
            b"td" | b"th" => self.in_cell = true,
            _ => {}
        }
    }

    fn segment(&mut self, line: usize, text: &str) {
        if self.in_title_span {
            if !self.session_seen {
                self.session_seen = true;
                self.pending
                    .push_back(Ok(Token::SessionHeader(text.to_string())));
            }
            return;
        }

        if let Some((label_line, label)) = self.label_cell.take() {
            let joined = format!("{label} {text}");
            if let Some(stat) = match_stat(&joined) {
                self.pending.push_back(Ok(Token::Stat(stat)));
                return;
            }
            if let Some(caps) = DEST_PREFIX.captures(&joined) {
                self.pending
                    .push_back(Ok(Token::DestSection(caps["path"].to_string())));
                return;
            }
            self.skip_label(label_line);
        }

        if let Some(dest) = self.pair.feed(text) {
            if let Some(token) = dest {
                self.pending.push_back(Ok(token));
            }
            return;
        }

        if FOLDER_PAIR.is_match(text) {
            self.pair = FolderPair::ExpectSource;
            return;
        }
        if let Some(caps) = DEST_PREFIX.captures(text) {
            self.pending
                .push_back(Ok(Token::DestSection(caps["path"].to_string())));
            return;
        }
        if SOURCE_PREFIX.is_match(text) {
            return;
        }

        if let Some(stat) = match_stat(text) {
            self.pending.push_back(Ok(Token::Stat(stat)));
            return;
        }

        if let Some(caps) = OPERATION.captures(text) {
            let time = BRACKET_TIME
                .captures(text)
                .map(|t| normalize_time(&t[1]))
                .or_else(|| self.cell_time.take());
            match time {
                Some(time) => self.pending.push_back(Ok(Token::OperationLine {
                    time,
                    verb: Verb::from_phrase(&caps["verb"], &caps["kind"]),
                    path: caps["path"].to_string(),
                })),
                None => self.pending.push_back(Err(TokenizeSkip {
                    line,
                    reason: "operation text without a time cell",
                })),
            }
            return;
        }

        if let Some(caps) = SESSION_HEADER.captures(text) {
            if !self.session_seen {
                self.session_seen = true;
                self.pending
                    .push_back(Ok(Token::SessionHeader(caps["label"].trim().to_string())));
            }
            self.pending.extend([
                Ok(Token::DateMarker(caps["date"].to_string())),
                Ok(Token::TimeMarker(normalize_time(&caps["time"]))),
            ]);
            return;
        }

        if let Some(caps) = LEADING_DATE.captures(text) {
            self.pending
                .push_back(Ok(Token::DateMarker(caps[1].to_string())));
            if let Some(time) = ANY_TIME.captures(&text[caps[0].len()..]) {
                self.pending
                    .push_back(Ok(Token::TimeMarker(normalize_time(&time[1]))));
            }
            return;
        }

        if let Some(caps) = BARE_TIME.captures(text) {
            let time = normalize_time(&caps[1]);
            if self.in_cell {
                self.cell_time = Some(time.clone());
            }
            self.pending.push_back(Ok(Token::TimeMarker(time)));
            return;
        }

        if self.in_cell && text.ends_with(':') {
            self.label_cell = Some((line, text.to_string()));
            return;
        }

        self.pending.push_back(Err(TokenizeSkip {
            line,
            reason: "unrecognised text segment",
        }));
    }

    fn flush_label(&mut self) {
        if let Some((line, _)) = self.label_cell.take() {
            self.skip_label(line);
        }
    }

    fn skip_label(&mut self, line: usize) {
        self.pending.push_back(Err(TokenizeSkip {
            line,
            reason: "label cell without a value",
        }));
    }
}

/// The session title is rendered in a bold `span`.
fn is_title_span(e: &BytesStart<'_>) -> bool {
    e.html_attributes().flatten().any(|attr| {
        attr.key.as_ref().eq_ignore_ascii_case(b"style") && {
            let style: String = String::from_utf8_lossy(&attr.value)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            style.contains("font-weight:600") || style.contains("font-weight:bold")
        }
    })
}

/// Decode entities one at a time, keeping any `&` that does not start a known
/// entity (`C:\a&b\x.png`) as literal text.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_entity(rest) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `&name;`, `&#NN;` or `&#xHH;` at the start of `text`, with its byte length.
fn decode_entity(text: &str) -> Option<(String, usize)> {
    const MAX_ENTITY_LEN: usize = 32;

    let end = text.get(1..)?.find(';')? + 1;
    if end > MAX_ENTITY_LEN {
        return None;
    }
    let name = &text[1..end];
    let decoded = match name.strip_prefix('#') {
        Some(num) => {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)?.to_string()
        }
        None => resolve_html5_entity(name)?.to_string(),
    };
    Some((decoded, end + 1))
}

/// Maps byte offsets to 1-based line numbers, scanning forward only.
#[derive(Debug, Default)]
struct LineCounter {
    offset: usize,
    line: usize,
}

impl LineCounter {
    fn line_at(&mut self, input: &str, offset: usize) -> usize {
        let offset = offset.min(input.len());
        if offset < self.offset {
            return self.line + 1;
        }
        self.line += input.as_bytes()[self.offset..offset]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        self.offset = offset;
        self.line + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::token::LogStat;

    const SAMPLE: &str = r#"<html><head><title>Test Sync</title>
<style>td { color: gray; }</style></head><body>
<span style="font-weight:600; color:gray;">Test Sync</span>
9/13/2025
<span>2:30:15 PM</span>
<div>Synchronizing folder pair: Update &gt;</div>
<div>Source: C:\Source</div>
<div>Dest: C:\Dest\VideoFile\Project</div>
<table>
<tr><td valign="top">2:30:20 PM</td><td>Creating file &quot;C:\Dest\VideoFile\Project\test.mov&quot;</td></tr>
</table>
</body></html>"#;

    fn tokens(input: &str) -> Vec<TokenResult> {
        HtmlTokenizer.tokenize(input).collect()
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
                Token::DestSection(r"C:\Dest\VideoFile\Project".into()),
                Token::TimeMarker("2:30:20 PM".into()),
                Token::OperationLine {
                    time: "2:30:20 PM".into(),
                    verb: Verb::CreateFile,
                    path: r"C:\Dest\VideoFile\Project\test.mov".into(),
                },
            ]
        );
    }

    #[test]
    fn test_entities_are_unescaped() {
        let input = r#"<table><tr><td>1:00:00 AM</td><td>Copying file &quot;C:\a&amp;b\x&#39;s.png&quot;</td></tr></table>"#;
        let ops: Vec<Token> = tokens(input)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|t| matches!(t, Token::OperationLine { .. }))
            .collect();
        assert_eq!(
            ops,
            vec![Token::OperationLine {
                time: "1:00:00 AM".into(),
                verb: Verb::CopyFile,
                path: r"C:\a&b\x's.png".into(),
            }]
        );
    }

    #[test]
    fn test_bare_ampersand_keeps_operation() {
        let input = r#"<table><tr><td>2:30:21 PM</td><td>Creating file &quot;C:\a&b\x.png&quot;</td></tr>
<tr><td>2:30:22 PM</td><td>Creating file &quot;C:\R&amp;D\y &x; z.png&quot;</td></tr></table>"#;
        let items = tokens(input);
        assert!(items.iter().all(Result::is_ok));
        let paths: Vec<String> = items
            .into_iter()
            .filter_map(|t| match t {
                Ok(Token::OperationLine { path, .. }) => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec![r"C:\a&b\x.png", r"C:\R&D\y &x; z.png"]);
    }

    #[test]
    fn test_unescape_lenient() {
        assert_eq!(unescape_lenient("a&b &quot;q&quot;"), "a&b \"q\"");
        assert_eq!(unescape_lenient("&#39;&#x41;&amp;&bogus;&"), "'A&&bogus;&");
    }

    #[test]
    fn test_label_cell_joins_value_cell() {
        let input = r#"<table>
<tr><td>Items processed:</td><td>2 (1.2 MB)</td></tr>
<tr><td>Dest:</td><td>C:\Dest\Shots</td></tr>
<tr><td>Errors:</td></tr>
<tr><td>Total time:</td><td>0:00:30</td></tr>
</table>"#;
        assert_eq!(
            tokens(input),
            vec![
                Ok(Token::Stat(LogStat::ItemsProcessed {
                    count: 2,
                    size: Some("1.2 MB".into()),
                })),
                Ok(Token::DestSection(r"C:\Dest\Shots".into())),
                Err(TokenizeSkip {
                    line: 4,
                    reason: "label cell without a value",
                }),
                Ok(Token::Stat(LogStat::TotalTime("0:00:30".into()))),
            ]
        );
    }

    #[test]
    fn test_cell_time_does_not_leak_across_rows() {
        let input = r#"<table>
<tr><td>1:00:00 AM</td></tr>
<tr><td>Creating file &quot;C:\a.mov&quot;</td></tr>
</table>"#;
        let items = tokens(input);
        assert!(items
            .iter()
            .all(|t| !matches!(t, Ok(Token::OperationLine { .. }))));
        let skip = items.iter().find_map(|t| t.as_ref().err()).unwrap();
        assert_eq!(skip.line, 3);
    }

    #[test]
    fn test_unclosed_void_elements_are_tolerated() {
        let input = "<html><head><meta charset=utf-8></head><body>\n<br>\n<span>3:00:00 PM</span></body></html>";
        assert_eq!(
            tokens(input),
            vec![Ok(Token::TimeMarker("3:00:00 PM".into()))]
        );
    }

    #[test]
    fn test_tokenize_is_restartable() {
        let first: Vec<_> = tokens(SAMPLE);
        let second: Vec<_> = tokens(SAMPLE);
        assert_eq!(first, second);
    }
}
