//! Watch coordinator: turns filesystem events into processed logs.
//!
//! One task owns the [`WatchTable`] and the [`Pipeline`]. Events, rescan commands and
//! the debounce timer are multiplexed with `select!`, so a rescan never runs at the
//! same time as an event-driven scan of the same path.

use super::state::WatchTable;
use crate::error::Result;
use crate::pipeline::{FileOutcome, LastParsed, Pipeline, RescanSummary};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
}

/// One filesystem notification, stamped when it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
    pub at: Instant,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind, at: Instant) -> Self {
        Self {
            path: path.into(),
            kind,
            at,
        }
    }
}

/// Requests accepted by a running coordinator.
#[derive(Debug)]
pub enum Command {
    Rescan {
        dir: PathBuf,
        reply: oneshot::Sender<Result<RescanSummary>>,
    },
    Stop,
}

pub struct WatchCoordinator {
    table: WatchTable,
    pipeline: Pipeline,
    recursive: bool,
}

impl WatchCoordinator {
    pub fn new(pipeline: Pipeline, debounce: Duration, recursive: bool) -> Self {
        Self {
            table: WatchTable::new(debounce),
            pipeline,
            recursive,
        }
    }

    pub fn table(&self) -> &WatchTable {
        &self.table
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn last_parsed(&self) -> LastParsed {
        self.pipeline.last_parsed()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.table.next_deadline()
    }

    /// Fold one filesystem event into the watch table.
    pub fn handle_event(&mut self, event: FsEvent) {
        let FsEvent { path, kind, at } = event;
        if kind == FsEventKind::Removed {
            if self.table.remove(&path).is_some() {
                debug!(path = %path.display(), "Stopped tracking removed file");
            }
            return;
        }
        if !self.pipeline.accepts(&path) {
            return;
        }

        match stat(&path) {
            Ok(Some((size, modified))) => {
                if self.table.observe(&path, Some(size), modified, at) {
                    debug!(path = %path.display(), size, "Log changed, waiting for it to settle");
                }
            }
            // Directories that happen to carry a log extension.
            Ok(None) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.table.remove(&path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot stat changed file"),
        }
    }

    /// Promote files whose quiet period has passed, then process stable files in
    /// the order they settled.
    pub fn poll(&mut self, now: Instant) -> Vec<FileOutcome> {
        for path in self.table.due(now) {
            match stat(&path) {
                Ok(Some((size, modified))) => {
                    let unchanged = self
                        .table
                        .get(&path)
                        .is_some_and(|f| f.last_size == Some(size) && f.last_modified_at == modified);
                    if unchanged {
                        self.table.confirm_stable(&path, now);
                    } else {
                        // Grew without an event reaching us; wait another window.
                        self.table.observe(&path, Some(size), modified, now);
                    }
                }
                Ok(None) => {
                    self.table.remove(&path);
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Pending file vanished");
                    self.table.remove(&path);
                }
            }
        }

        let mut outcomes = Vec::new();
        for path in self.table.stable_queue() {
            match self.pipeline.process_file(&path) {
                Ok(outcome) => {
                    self.table.mark_processed(&path);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to process log, will retry on next change");
                    self.table.mark_failed(&path);
                }
            }
        }
        outcomes
    }

    /// Bulk rescan of `dir` through the same pipeline.
    pub fn rescan(&mut self, dir: &Path) -> Result<RescanSummary> {
        let summary = self.pipeline.rescan(dir, self.recursive)?;
        for path in &summary.processed {
            if let Ok(Some((size, modified))) = stat(path) {
                self.table.record_processed(path, Some(size), modified);
            }
        }
        Ok(summary)
    }

    /// Drive the coordinator until `Stop` arrives or the command channel closes.
    ///
    /// A closed event channel only ends event intake; commands and pending
    /// timers keep running. Returns the coordinator so the caller can shut the
    /// pipeline down.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) -> Self {
        info!("Watch coordinator started");
        let mut events_open = true;

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Filesystem event channel closed");
                        events_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Rescan { dir, reply }) => {
                        let result = self.rescan(&dir);
                        if let Err(e) = &result {
                            warn!(dir = %dir.display(), error = %e, "Rescan failed");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Stop) | None => break,
                },
                _ = sleep_until(deadline) => {
                    self.poll(Instant::now());
                }
            }
        }

        info!(tracked = self.table.len(), "Watch coordinator stopped");
        self
    }

    /// Stop the mirror worker once its queued snapshot is written.
    pub fn shutdown(self) {
        self.pipeline.shutdown();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}

/// Size and mtime of a regular file; `None` for directories.
fn stat(path: &Path) -> io::Result<Option<(u64, Option<SystemTime>)>> {
    let meta = fs::metadata(path)?;
    if meta.is_dir() {
        return Ok(None);
    }
    Ok(Some((meta.len(), meta.modified().ok())))
}
