//! Core record types.
//!
//! A [`TransferRecord`] is one output row: one file created by a synchronization run.

use serde::{Deserialize, Serialize};
use std::fmt;
use syncsentinel_sinks::TabularRecord;

// ============================================================================
// Asset classification
// ============================================================================

/// Asset category derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Video,
    Image,
    Audio,
    #[serde(rename = "3D")]
    ThreeD,
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::Image => "Image",
            Self::Audio => "Audio",
            Self::ThreeD => "3D",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Video" => Some(Self::Video),
            "Image" => Some(Self::Image),
            "Audio" => Some(Self::Audio),
            "3D" => Some(Self::ThreeD),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Classify a file name (or path) by its extension, case-insensitively.
    pub fn classify(file_name: &str) -> Self {
        let base = base_name(file_name);
        let Some((stem, ext)) = base.rsplit_once('.') else {
            return Self::Unknown;
        };
        if stem.is_empty() && ext.is_empty() {
            return Self::Unknown;
        }
        match ext.to_ascii_lowercase().as_str() {
            "mov" => Self::Video,
            "png" | "jpeg" | "jpg" | "bmp" | "tiff" | "tif" | "exr" | "tga" | "dpx" => Self::Image,
            "mp3" | "wav" | "aiff" => Self::Audio,
            "abc" | "fbx" | "obj" => Self::ThreeD,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final segment of a path written with either `\` or `/` separators.
///
/// Sync logs carry paths from the machine that ran the sync, so separators
/// of both platforms are accepted regardless of where we run.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(is_separator);
    trimmed.rsplit(is_separator).next().unwrap_or(trimmed)
}

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

// ============================================================================
// Transfer records
// ============================================================================

/// One file-transfer event, as written to the CSV output.
///
/// Immutable once built; equality (and dedup) compares all five fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    date: String,
    time: String,
    file_type: FileType,
    section: String,
    file_name: String,
}

impl TransferRecord {
    pub fn new(
        date: impl Into<String>,
        time: impl Into<String>,
        file_type: FileType,
        section: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
            file_type,
            section: section.into(),
            file_name: file_name.into(),
        }
    }

    /// Date as written in the log, `M/D/YYYY`.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Wall-clock time with AM/PM marker, e.g. `2:30:20 PM`.
    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl TabularRecord for TransferRecord {
    const HEADER: &'static [&'static str] = &["Date", "Time", "Type", "Section", "File Name"];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.time.clone(),
            self.file_type.as_str().to_string(),
            self.section.clone(),
            self.file_name.clone(),
        ]
    }

    fn from_row(row: &csv::StringRecord) -> Option<Self> {
        if row.len() != Self::HEADER.len() {
            return None;
        }
        let file_name = row.get(4)?;
        if file_name.is_empty() {
            return None;
        }
        let file_type = FileType::parse(row.get(2)?)?;
        Some(Self::new(
            row.get(0)?,
            row.get(1)?,
            file_type,
            row.get(3)?,
            file_name,
        ))
    }
}

// ============================================================================
// Log formats
// ============================================================================

/// Textual dialect of a sync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    PlainText,
    Html,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainText => f.write_str("plain-text"),
            Self::Html => f.write_str("html"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_table() {
        assert_eq!(FileType::classify("clip.mov"), FileType::Video);
        assert_eq!(FileType::classify("CLIP.MOV"), FileType::Video);
        for name in [
            "a.png", "a.jpeg", "a.jpg", "a.bmp", "a.tiff", "a.tif", "a.exr", "a.tga", "a.dpx",
        ] {
            assert_eq!(FileType::classify(name), FileType::Image, "{name}");
        }
        for name in ["a.mp3", "a.wav", "a.AIFF"] {
            assert_eq!(FileType::classify(name), FileType::Audio, "{name}");
        }
        for name in ["a.abc", "a.fbx", "a.obj"] {
            assert_eq!(FileType::classify(name), FileType::ThreeD, "{name}");
        }
        assert_eq!(FileType::classify("a.xyz"), FileType::Unknown);
        assert_eq!(FileType::classify("README"), FileType::Unknown);
        assert_eq!(FileType::classify("archive.mov.zip"), FileType::Unknown);
    }

    #[test]
    fn test_classify_uses_base_name() {
        assert_eq!(
            FileType::classify(r"C:\Dest\shots.mov\notes"),
            FileType::Unknown
        );
        assert_eq!(FileType::classify(r"C:\Dest\VideoFile\a.png"), FileType::Image);
    }

    #[test]
    fn test_base_name_mixed_separators() {
        assert_eq!(base_name(r"C:\Dest\VideoFile\Project\test.mov"), "test.mov");
        assert_eq!(base_name("/mnt/dest/Project/"), "Project");
        assert_eq!(base_name(r"C:\Dest\Project\"), "Project");
        assert_eq!(base_name("plain.txt"), "plain.txt");
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn test_record_row_round_trip() {
        let record = TransferRecord::new("9/13/2025", "2:30:20 PM", FileType::ThreeD, "Project", "rig.fbx");
        let row = csv::StringRecord::from(record.to_row());
        assert_eq!(&row[2], "3D");
        assert_eq!(TransferRecord::from_row(&row), Some(record));
    }

    #[test]
    fn test_break_row_is_not_a_record() {
        let row = csv::StringRecord::from(vec!["--- New Log Entry ---", "", "", "", ""]);
        assert_eq!(TransferRecord::from_row(&row), None);
    }
}
