//! Per-file debounce state machine.
//!
//! `Unseen -> Pending -> Stable -> Processed`, with any change sending a file back to
//! `Pending`. Transitions are a pure function of the current state and one input, so
//! the timing rules are testable with synthetic instants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Known path that has not been (successfully) processed; waits for a change.
    Unseen,
    /// Changed recently; considered stable once `deadline` passes quietly.
    Pending { deadline: Instant },
    /// Fully written, queued for processing.
    Stable,
    /// Records emitted. Stays here until the file changes again.
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchInput {
    Changed { at: Instant },
    Tick { now: Instant },
    ScanSucceeded,
    ScanFailed,
}

/// The transition function.
pub fn step(state: FileState, input: WatchInput, debounce: Duration) -> FileState {
    match (state, input) {
        (_, WatchInput::Changed { at }) => FileState::Pending {
            deadline: at + debounce,
        },
        (FileState::Pending { deadline }, WatchInput::Tick { now }) if now >= deadline => {
            FileState::Stable
        }
        (FileState::Stable, WatchInput::ScanSucceeded) => FileState::Processed,
        (FileState::Stable, WatchInput::ScanFailed) => FileState::Unseen,
        (state, _) => state,
    }
}

/// What the coordinator knows about one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub last_size: Option<u64>,
    pub last_modified_at: Option<SystemTime>,
    /// End of the quiet period that made the file stable; orders the processing queue.
    pub stable_since: Option<Instant>,
    pub state: FileState,
}

impl WatchedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_size: None,
            last_modified_at: None,
            stable_since: None,
            state: FileState::Unseen,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.state == FileState::Processed
    }

    fn same_content(&self, size: Option<u64>, modified: Option<SystemTime>) -> bool {
        self.last_size.is_some() && self.last_size == size && self.last_modified_at == modified
    }
}

/// All watched files, keyed by path. Owned by a single coordinator.
#[derive(Debug)]
pub struct WatchTable {
    files: HashMap<PathBuf, WatchedFile>,
    debounce: Duration,
}

impl WatchTable {
    pub fn new(debounce: Duration) -> Self {
        Self {
            files: HashMap::new(),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn get(&self, path: &Path) -> Option<&WatchedFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Record a create/modify event. Returns `true` if the file is now pending.
    ///
    /// A processed file whose size and mtime are unchanged is a duplicate event
    /// and stays processed.
    pub fn observe(
        &mut self,
        path: &Path,
        size: Option<u64>,
        modified: Option<SystemTime>,
        at: Instant,
    ) -> bool {
        let debounce = self.debounce;
        let file = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchedFile::new(path.to_path_buf()));

        if file.is_processed() && file.same_content(size, modified) {
            return false;
        }

        file.last_size = size;
        file.last_modified_at = modified;
        file.stable_since = None;
        file.state = step(file.state, WatchInput::Changed { at }, debounce);
        true
    }

    pub fn remove(&mut self, path: &Path) -> Option<WatchedFile> {
        self.files.remove(path)
    }

    /// Pending files whose quiet period has elapsed at `now`.
    pub fn due(&self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<(Instant, PathBuf)> = self
            .files
            .values()
            .filter_map(|f| match f.state {
                FileState::Pending { deadline } if deadline <= now => {
                    Some((deadline, f.path.clone()))
                }
                _ => None,
            })
            .collect();
        due.sort();
        due.into_iter().map(|(_, p)| p).collect()
    }

    /// Move a due file to `Stable`. Returns `false` if it was not due.
    pub fn confirm_stable(&mut self, path: &Path, now: Instant) -> bool {
        let debounce = self.debounce;
        let Some(file) = self.files.get_mut(path) else {
            return false;
        };
        let FileState::Pending { deadline } = file.state else {
            return false;
        };
        if step(file.state, WatchInput::Tick { now }, debounce) != FileState::Stable {
            return false;
        }
        file.state = FileState::Stable;
        // Settled when the quiet period ended, even if polled later.
        file.stable_since = Some(deadline);
        true
    }

    /// Stable files in the order they became stable.
    pub fn stable_queue(&self) -> Vec<PathBuf> {
        let mut stable: Vec<(Instant, PathBuf)> = self
            .files
            .values()
            .filter(|f| f.state == FileState::Stable)
            .map(|f| (f.stable_since.unwrap_or_else(Instant::now), f.path.clone()))
            .collect();
        stable.sort();
        stable.into_iter().map(|(_, p)| p).collect()
    }

    pub fn mark_processed(&mut self, path: &Path) {
        self.apply(path, WatchInput::ScanSucceeded);
    }

    pub fn mark_failed(&mut self, path: &Path) {
        self.apply(path, WatchInput::ScanFailed);
        if let Some(file) = self.files.get_mut(path) {
            file.stable_since = None;
        }
    }

    /// Record a file processed outside the event flow (bulk rescan).
    ///
    /// A file with a pending change keeps its timer: the change arrived after the
    /// rescan read it, or will be processed again harmlessly thanks to dedup.
    pub fn record_processed(&mut self, path: &Path, size: Option<u64>, modified: Option<SystemTime>) {
        let file = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchedFile::new(path.to_path_buf()));
        if matches!(file.state, FileState::Pending { .. }) {
            return;
        }
        file.last_size = size;
        file.last_modified_at = modified;
        file.stable_since = None;
        file.state = FileState::Processed;
    }

    /// Earliest pending deadline, for the coordinator's timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.files
            .values()
            .filter_map(|f| match f.state {
                FileState::Pending { deadline } => Some(deadline),
                _ => None,
            })
            .min()
    }

    fn apply(&mut self, path: &Path, input: WatchInput) {
        let debounce = self.debounce;
        if let Some(file) = self.files.get_mut(path) {
            file.state = step(file.state, input, debounce);
        }
    }
}
