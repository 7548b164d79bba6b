//! Mirror boundary: keeps an external tabular copy in step with the CSV target.
//!
//! The core only knows [`SyncMirror::replace_all`]. Calls run on a dedicated thread
//! so a slow or unreachable mirror never delays local persistence.

use crate::types::TransferRecord;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use syncsentinel_sinks::{write_snapshot, SinkError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror unavailable: {0}")]
    Unavailable(String),

    #[error("Mirror rejected snapshot: {0}")]
    Rejected(String),

    #[error("Mirror IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Mirror snapshot not written: {0}")]
    Sink(#[from] SinkError),
}

/// Replace-everything contract of a mirror target.
///
/// `records` is the full current record set in CSV order, never a delta.
/// Implementations must be idempotent: replaying the same snapshot is harmless.
pub trait SyncMirror: Send + Sync {
    fn replace_all(&self, records: &[TransferRecord]) -> Result<(), MirrorError>;
}

/// Mirror into a second CSV file, replaced atomically on every call.
#[derive(Debug, Clone)]
pub struct FileMirror {
    path: PathBuf,
}

impl FileMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncMirror for FileMirror {
    fn replace_all(&self, records: &[TransferRecord]) -> Result<(), MirrorError> {
        write_snapshot(&self.path, records)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DispatchState {
    needs_retry: AtomicBool,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Runs mirror calls on a background thread, newest snapshot wins.
pub struct MirrorDispatcher {
    tx: Option<mpsc::Sender<Vec<TransferRecord>>>,
    handle: Option<JoinHandle<()>>,
    state: Arc<DispatchState>,
}

impl MirrorDispatcher {
    pub fn spawn(mirror: Arc<dyn SyncMirror>) -> Result<Self, MirrorError> {
        let (tx, rx) = mpsc::channel::<Vec<TransferRecord>>();
        let state = Arc::new(DispatchState::default());
        let worker_state = state.clone();

        let handle = std::thread::Builder::new()
            .name("syncsentinel-mirror".to_string())
            .spawn(move || run_worker(mirror.as_ref(), rx, &worker_state))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            state,
        })
    }

    /// Queue a full snapshot. Never blocks on the mirror itself.
    pub fn submit(&self, records: Vec<TransferRecord>) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(records).is_err() {
            warn!("Mirror worker has stopped, snapshot dropped");
            self.state.needs_retry.store(true, Ordering::SeqCst);
        }
    }

    /// The last replace failed and no later one has succeeded yet.
    pub fn needs_retry(&self) -> bool {
        self.state.needs_retry.load(Ordering::SeqCst)
    }

    /// Snapshots successfully replaced so far.
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::SeqCst)
    }

    /// Replace attempts that failed so far.
    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::SeqCst)
    }

    /// Stop accepting snapshots and wait for the queued one to finish.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Mirror worker panicked");
            }
        }
    }
}

impl Drop for MirrorDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    mirror: &dyn SyncMirror,
    rx: mpsc::Receiver<Vec<TransferRecord>>,
    state: &DispatchState,
) {
    while let Ok(mut snapshot) = rx.recv() {
        let mut coalesced = 0usize;
        while let Ok(newer) = rx.try_recv() {
            snapshot = newer;
            coalesced += 1;
        }
        if coalesced > 0 {
            debug!(coalesced, "Coalesced queued mirror snapshots");
        }

        match mirror.replace_all(&snapshot) {
            Ok(()) => {
                state.needs_retry.store(false, Ordering::SeqCst);
                state.delivered.fetch_add(1, Ordering::SeqCst);
                info!(rows = snapshot.len(), "Mirror updated");
            }
            Err(e) => {
                state.needs_retry.store(true, Ordering::SeqCst);
                state.failed.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, rows = snapshot.len(), "Mirror update failed, will retry after next append");
            }
        }
    }
    debug!("Mirror worker stopped");
}
