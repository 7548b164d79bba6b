//! Error types for the SyncSentinel engine

use crate::mirror::MirrorError;
use std::io;
use std::path::PathBuf;
use syncsentinel_sinks::SinkError;
use thiserror::Error;

/// SyncSentinel error type
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Unsupported log format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl SentinelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SentinelError>;
