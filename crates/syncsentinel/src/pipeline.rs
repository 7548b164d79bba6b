//! File-to-CSV pipeline: parse one log, append its records, update the mirror.
//!
//! The pipeline is the only writer of the CSV target. Both the watch coordinator
//! and bulk rescans go through [`Pipeline::process_file`].

use crate::config::SentinelConfig;
use crate::error::{Result, SentinelError};
use crate::mirror::{FileMirror, MirrorDispatcher};
use crate::parser::{parse_file, LogSummary};
use crate::types::{LogFormat, TransferRecord};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use syncsentinel_sinks::CsvRecordStore;
use tracing::{debug, info, warn};

/// Read handle on the records of the most recent successful scan.
#[derive(Debug, Clone, Default)]
pub struct LastParsed {
    inner: Arc<RwLock<Vec<TransferRecord>>>,
}

impl LastParsed {
    /// Records of the last scanned file, in log order.
    pub fn get(&self) -> Vec<TransferRecord> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, records: Vec<TransferRecord>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = records,
            Err(poisoned) => *poisoned.into_inner() = records,
        }
    }
}

/// What processing one log file did.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub format: LogFormat,
    pub session_label: Option<String>,
    pub summary: LogSummary,
    /// Records extracted from the log.
    pub records: usize,
    /// Rows actually written to the CSV target.
    pub appended: usize,
    pub duplicates: usize,
    /// Lines the tokenizer could not classify.
    pub skipped: usize,
}

/// Totals for one bulk rescan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RescanSummary {
    pub files_seen: usize,
    /// Files processed successfully, in processing order.
    pub processed: Vec<PathBuf>,
    pub records: usize,
    pub appended: usize,
    pub duplicates: usize,
    /// Files that could not be processed, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

pub struct Pipeline {
    store: CsvRecordStore<TransferRecord>,
    mirror: Option<MirrorDispatcher>,
    last_parsed: LastParsed,
    extensions: Vec<String>,
}

impl Pipeline {
    pub fn new(
        store: CsvRecordStore<TransferRecord>,
        mirror: Option<MirrorDispatcher>,
        extensions: Vec<String>,
    ) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            store,
            mirror,
            last_parsed: LastParsed::default(),
            extensions,
        }
    }

    /// Open the CSV target and, when enabled, start the file mirror.
    pub fn from_config(config: &SentinelConfig) -> Result<Self> {
        config.validate()?;
        let store = CsvRecordStore::open(config.csv_path(), config.csv_options())?;
        let mirror = match config.mirror_path() {
            Some(path) => Some(MirrorDispatcher::spawn(Arc::new(FileMirror::new(path)))?),
            None => None,
        };
        Ok(Self::new(store, mirror, config.extensions.clone()))
    }

    pub fn store(&self) -> &CsvRecordStore<TransferRecord> {
        &self.store
    }

    pub fn mirror(&self) -> Option<&MirrorDispatcher> {
        self.mirror.as_ref()
    }

    pub fn last_parsed(&self) -> LastParsed {
        self.last_parsed.clone()
    }

    /// Whether `path` has one of the watched log extensions and is not the CSV target.
    pub fn accepts(&self, path: &Path) -> bool {
        if path == self.store.path() {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    /// Parse one log and append its new records to the CSV target.
    ///
    /// The mirror is handed the full record set when rows were added, or when the
    /// previous mirror update failed.
    pub fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        let parsed = parse_file(path)?;
        if parsed.skipped > 0 {
            debug!(path = %path.display(), skipped = parsed.skipped, "Log had unrecognised lines");
        }

        let outcome = self.store.append(&parsed.records)?;
        self.last_parsed.set(parsed.records.clone());

        if let Some(mirror) = &self.mirror {
            if outcome.appended > 0 || mirror.needs_retry() {
                mirror.submit(self.store.records().to_vec());
            }
        }

        info!(
            path = %path.display(),
            format = %parsed.format,
            session = parsed.session_label.as_deref().unwrap_or(""),
            records = parsed.records.len(),
            appended = outcome.appended,
            duplicates = outcome.duplicates,
            "Processed log"
        );

        Ok(FileOutcome {
            path: path.to_path_buf(),
            format: parsed.format,
            session_label: parsed.session_label,
            summary: parsed.summary,
            records: parsed.records.len(),
            appended: outcome.appended,
            duplicates: outcome.duplicates,
            skipped: parsed.skipped,
        })
    }

    /// Process every matching log under `dir`, oldest first.
    ///
    /// Prior processing state is ignored; dedup in the store makes a repeat run
    /// over unchanged input write nothing. One file failing never stops the rest.
    pub fn rescan(&mut self, dir: &Path, recursive: bool) -> Result<RescanSummary> {
        let files = self.collect_logs(dir, recursive)?;
        let mut summary = RescanSummary {
            files_seen: files.len(),
            ..RescanSummary::default()
        };

        for path in files {
            match self.process_file(&path) {
                Ok(outcome) => {
                    summary.processed.push(path);
                    summary.records += outcome.records;
                    summary.appended += outcome.appended;
                    summary.duplicates += outcome.duplicates;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping log during rescan");
                    summary.failures.push((path, e.to_string()));
                }
            }
        }

        info!(
            dir = %dir.display(),
            files = summary.files_seen,
            processed = summary.processed.len(),
            appended = summary.appended,
            failed = summary.failures.len(),
            "Rescan finished"
        );
        Ok(summary)
    }

    /// Matching files under `dir`, sorted by modification time then path.
    fn collect_logs(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(SentinelError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let walker = if recursive {
            walkdir::WalkDir::new(dir)
        } else {
            walkdir::WalkDir::new(dir).max_depth(1)
        };

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Cannot read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, entry.into_path()));
        }

        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Stop the mirror worker after its queued snapshot.
    pub fn shutdown(self) {
        if let Some(mirror) = self.mirror {
            mirror.shutdown();
        }
    }
}
