//! Deduplicating CSV record store.
//!
//! The store owns one CSV target and the in-memory set of rows already present in it.
//! It handles:
//! - Writing the header exactly once, when the target is new or empty
//! - Skipping rows that are already present (full-row equality)
//! - Appending (or prepending) new rows as one buffered write
//! - Reloading the dedup set when the target is modified by someone else

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

/// First cell of the separator row written between batches when entry breaks are enabled.
pub const ENTRY_BREAK_MARKER: &str = "--- New Log Entry ---";

/// A record that maps onto one CSV row with a fixed header.
pub trait TabularRecord: Clone + Eq + Hash {
    /// Column names, in output order.
    const HEADER: &'static [&'static str];

    /// Cells for this record, one per header column.
    fn to_row(&self) -> Vec<String>;

    /// Rebuild a record from a stored row. Rows that do not describe a record
    /// (separator rows, foreign rows) return `None` and are ignored for dedup.
    fn from_row(row: &csv::StringRecord) -> Option<Self>;
}

/// Errors returned by the record store.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Cannot open CSV target {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write CSV target {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read CSV target {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to rename {from} -> {to}: {source}")]
    Commit {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Where new rows land relative to the rows already in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// New rows go after existing rows.
    #[default]
    Append,
    /// New rows go directly under the header; the target is rewritten through a temp file.
    Prepend,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvOptions {
    pub mode: SinkMode,
    /// Write a separator row after every batch that added rows.
    pub entry_breaks: bool,
}

/// Result of one `append` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> io::Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(Self {
                len: meta.len(),
                modified: meta.modified().ok(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// CSV target plus the set of records already written to it.
pub struct CsvRecordStore<R: TabularRecord> {
    path: PathBuf,
    options: CsvOptions,
    seen: HashSet<R>,
    /// Records in file order; this is the snapshot handed to mirrors.
    rows: Vec<R>,
    fingerprint: Option<Fingerprint>,
}

impl<R: TabularRecord> CsvRecordStore<R> {
    /// Open a store on `path`, loading any rows already present.
    pub fn open(path: impl Into<PathBuf>, options: CsvOptions) -> SinkResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let mut store = Self {
            path,
            options,
            seen: HashSet::new(),
            rows: Vec::new(),
            fingerprint: None,
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> CsvOptions {
        self.options
    }

    /// Every record currently in the target, in file order.
    pub fn records(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, record: &R) -> bool {
        self.seen.contains(record)
    }

    /// Write the records not already present, preserving their order.
    ///
    /// Duplicates (against the target and within `records`) are skipped silently.
    /// The new rows are written with a single buffered write, so a failure never
    /// leaves a partial row behind.
    pub fn append(&mut self, records: &[R]) -> SinkResult<AppendOutcome> {
        self.refresh_if_changed()?;

        let mut batch_seen = HashSet::new();
        let fresh: Vec<&R> = records
            .iter()
            .filter(|r| !self.seen.contains(*r) && batch_seen.insert(*r))
            .collect();
        let duplicates = records.len() - fresh.len();

        if fresh.is_empty() {
            debug!(path = %self.path.display(), duplicates, "No new rows to write");
            return Ok(AppendOutcome {
                appended: 0,
                duplicates,
            });
        }

        match self.options.mode {
            SinkMode::Append => self.write_append(&fresh)?,
            SinkMode::Prepend => self.write_prepend(&fresh)?,
        }

        let fresh: Vec<R> = fresh.into_iter().cloned().collect();
        self.seen.extend(fresh.iter().cloned());
        match self.options.mode {
            SinkMode::Append => self.rows.extend(fresh.iter().cloned()),
            SinkMode::Prepend => {
                let older = std::mem::take(&mut self.rows);
                self.rows = fresh.clone();
                self.rows.extend(older);
            }
        }
        self.fingerprint = Fingerprint::of(&self.path).map_err(|source| SinkError::Read {
            path: self.path.clone(),
            source,
        })?;

        info!(
            path = %self.path.display(),
            appended = fresh.len(),
            duplicates,
            "Wrote rows to CSV"
        );

        Ok(AppendOutcome {
            appended: fresh.len(),
            duplicates,
        })
    }

    /// Reload the dedup set if the target changed since we last read or wrote it.
    fn refresh_if_changed(&mut self) -> SinkResult<()> {
        let current = Fingerprint::of(&self.path).map_err(|source| SinkError::Read {
            path: self.path.clone(),
            source,
        })?;
        if current != self.fingerprint {
            debug!(path = %self.path.display(), "CSV target changed externally, reloading");
            self.reload()?;
        }
        Ok(())
    }

    fn reload(&mut self) -> SinkResult<()> {
        self.seen.clear();
        self.rows.clear();
        self.fingerprint = Fingerprint::of(&self.path).map_err(|source| SinkError::Read {
            path: self.path.clone(),
            source,
        })?;
        if self.fingerprint.is_none() {
            return Ok(());
        }

        let mut ignored = 0usize;
        for row in self.read_raw_rows()? {
            match R::from_row(&row) {
                Some(record) => {
                    if self.seen.insert(record.clone()) {
                        self.rows.push(record);
                    }
                }
                None => ignored += 1,
            }
        }

        debug!(
            path = %self.path.display(),
            rows = self.rows.len(),
            ignored,
            "Loaded existing CSV rows"
        );
        Ok(())
    }

    /// All rows below the header, kept verbatim.
    fn read_raw_rows(&self) -> SinkResult<Vec<csv::StringRecord>> {
        let file = File::open(&self.path).map_err(|source| SinkError::Read {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            let row = row?;
            if idx == 0 && is_header::<R>(&row) {
                continue;
            }
            if idx == 0 {
                warn!(path = %self.path.display(), "CSV target has no recognised header row");
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_append(&self, fresh: &[&R]) -> SinkResult<()> {
        let (needs_header, needs_newline) = self.tail_state()?;

        let mut buf = Vec::new();
        if needs_newline {
            buf.extend_from_slice(b"\r\n");
        }
        {
            let mut writer = row_writer(&mut buf);
            if needs_header {
                writer.write_record(R::HEADER)?;
            }
            for record in fresh {
                writer.write_record(record.to_row())?;
            }
            if self.options.entry_breaks {
                writer.write_record(break_row::<R>())?;
            }
            writer.flush().map_err(|source| self.write_error(source))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Open {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(&buf).map_err(|source| self.write_error(source))?;
        file.sync_data().map_err(|source| self.write_error(source))?;
        Ok(())
    }

    fn write_prepend(&self, fresh: &[&R]) -> SinkResult<()> {
        let existing = if self.fingerprint.is_some() {
            self.read_raw_rows()?
        } else {
            Vec::new()
        };

        let temp_path = self.temp_path();
        let result = self.write_staged(&temp_path, fresh, &existing).and_then(|()| {
            fs::rename(&temp_path, &self.path).map_err(|source| SinkError::Commit {
                from: temp_path.clone(),
                to: self.path.clone(),
                source,
            })
        });

        if result.is_err() && temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
            warn!(path = %temp_path.display(), "Cleaned up staged CSV after failed prepend");
        }
        result
    }

    fn write_staged(
        &self,
        temp_path: &Path,
        fresh: &[&R],
        existing: &[csv::StringRecord],
    ) -> SinkResult<()> {
        let file = File::create(temp_path).map_err(|source| SinkError::Open {
            path: temp_path.to_path_buf(),
            source,
        })?;
        let mut writer = row_writer(file);
        writer.write_record(R::HEADER)?;
        for record in fresh {
            writer.write_record(record.to_row())?;
        }
        if self.options.entry_breaks {
            writer.write_record(break_row::<R>())?;
        }
        for row in existing {
            writer.write_record(row)?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| self.write_error(e.into_error()))?;
        file.sync_data().map_err(|source| self.write_error(source))?;
        Ok(())
    }

    /// Whether the target still needs a header, and whether its last byte is not a newline.
    fn tail_state(&self) -> SinkResult<(bool, bool)> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((true, false)),
            Err(source) => {
                return Err(SinkError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let len = file
            .metadata()
            .map_err(|source| self.read_error(source))?
            .len();
        if len == 0 {
            return Ok((true, false));
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|source| self.read_error(source))?;
        Ok((false, last[0] != b'\n'))
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "records.csv".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    fn write_error(&self, source: io::Error) -> SinkError {
        SinkError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn read_error(&self, source: io::Error) -> SinkError {
        SinkError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

/// Write a full snapshot (header + rows) to `path`, replacing it atomically.
pub fn write_snapshot<R: TabularRecord>(path: &Path, records: &[R]) -> SinkResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot.csv".to_string());
    let temp_path = path.with_file_name(format!(".{}.tmp", name));

    let staged = (|| {
        let file = File::create(&temp_path).map_err(|source| SinkError::Open {
            path: temp_path.clone(),
            source,
        })?;
        let mut writer = row_writer(file);
        writer.write_record(R::HEADER)?;
        for record in records {
            writer.write_record(record.to_row())?;
        }
        writer.into_inner().map_err(|e| SinkError::Write {
            path: temp_path.clone(),
            source: e.into_error(),
        })?;
        fs::rename(&temp_path, path).map_err(|source| SinkError::Commit {
            from: temp_path.clone(),
            to: path.to_path_buf(),
            source,
        })
    })();

    if staged.is_err() && temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    staged
}

fn row_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .from_writer(inner)
}

fn is_header<R: TabularRecord>(row: &csv::StringRecord) -> bool {
    row.len() == R::HEADER.len()
        && row
            .iter()
            .zip(R::HEADER.iter())
            .all(|(cell, name)| cell.trim() == *name)
}

fn break_row<R: TabularRecord>() -> Vec<&'static str> {
    let mut row = vec![""; R::HEADER.len().max(1)];
    row[0] = ENTRY_BREAK_MARKER;
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Pair {
        key: String,
        value: String,
    }

    impl Pair {
        fn new(key: &str, value: &str) -> Self {
            Self {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
    }

    impl TabularRecord for Pair {
        const HEADER: &'static [&'static str] = &["Key", "Value"];

        fn to_row(&self) -> Vec<String> {
            vec![self.key.clone(), self.value.clone()]
        }

        fn from_row(row: &csv::StringRecord) -> Option<Self> {
            if row.len() != 2 || row[0] == *ENTRY_BREAK_MARKER || row[0].is_empty() {
                return None;
            }
            Some(Self::new(&row[0], &row[1]))
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = CsvRecordStore::<Pair>::open(&path, CsvOptions::default()).unwrap();

        store.append(&[Pair::new("a", "1")]).unwrap();
        store.append(&[Pair::new("b", "2")]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Key,Value\r\na,1\r\nb,2\r\n");
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "").unwrap();

        let mut store = CsvRecordStore::<Pair>::open(&path, CsvOptions::default()).unwrap();
        store.append(&[Pair::new("a", "1")]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "Key,Value\r\na,1\r\n");
    }

    #[test]
    fn test_quotes_special_characters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = CsvRecordStore::<Pair>::open(&path, CsvOptions::default()).unwrap();

        store
            .append(&[Pair::new("a,b", "say \"hi\"")])
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"a,b\",\"say \"\"hi\"\"\""));

        let reopened = CsvRecordStore::<Pair>::open(&path, CsvOptions::default()).unwrap();
        assert!(reopened.contains(&Pair::new("a,b", "say \"hi\"")));
    }

    #[test]
    fn test_missing_trailing_newline_is_repaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "Key,Value\r\na,1").unwrap();

        let mut store = CsvRecordStore::<Pair>::open(&path, CsvOptions::default()).unwrap();
        store.append(&[Pair::new("b", "2")]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Key,Value\r\na,1\r\nb,2\r\n"
        );
    }

    #[test]
    fn test_prepend_puts_new_rows_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let options = CsvOptions {
            mode: SinkMode::Prepend,
            entry_breaks: true,
        };
        let mut store = CsvRecordStore::<Pair>::open(&path, options).unwrap();

        store.append(&[Pair::new("old", "1")]).unwrap();
        store.append(&[Pair::new("new", "2")]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Key,Value\r\nnew,2\r\n--- New Log Entry ---,\r\nold,1\r\n--- New Log Entry ---,\r\n"
        );
        assert_eq!(
            store.records(),
            &[Pair::new("new", "2"), Pair::new("old", "1")]
        );
        assert!(!dir.path().join(".out.csv.tmp").exists());
    }

    #[test]
    fn test_break_rows_ignored_on_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let options = CsvOptions {
            mode: SinkMode::Append,
            entry_breaks: true,
        };
        let mut store = CsvRecordStore::<Pair>::open(&path, options).unwrap();
        store.append(&[Pair::new("a", "1")]).unwrap();
        drop(store);

        let reopened = CsvRecordStore::<Pair>::open(&path, options).unwrap();
        assert_eq!(reopened.records(), &[Pair::new("a", "1")]);
    }

    #[test]
    fn test_no_break_row_when_nothing_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let options = CsvOptions {
            mode: SinkMode::Append,
            entry_breaks: true,
        };
        let mut store = CsvRecordStore::<Pair>::open(&path, options).unwrap();
        store.append(&[Pair::new("a", "1")]).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let outcome = store.append(&[Pair::new("a", "1")]).unwrap();
        assert_eq!(outcome.appended, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_write_snapshot_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.csv");
        fs::write(&path, "stale\r\n").unwrap();

        write_snapshot(&path, &[Pair::new("a", "1"), Pair::new("b", "2")]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Key,Value\r\na,1\r\nb,2\r\n"
        );
        assert!(!dir.path().join(".mirror.csv.tmp").exists());
    }

    #[test]
    fn test_open_directory_target_fails() {
        let dir = tempdir().unwrap();
        let mut store = match CsvRecordStore::<Pair>::open(dir.path(), CsvOptions::default()) {
            Ok(store) => store,
            // Some platforms refuse to read a directory as CSV at open time.
            Err(_) => return,
        };
        let err = store.append(&[Pair::new("a", "1")]).unwrap_err();
        assert!(matches!(
            err,
            SinkError::Open { .. } | SinkError::Read { .. } | SinkError::Write { .. }
        ));
    }
}
