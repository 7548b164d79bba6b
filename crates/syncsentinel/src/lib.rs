//! SyncSentinel - sync log watcher and media asset exporter
//!
//! Watches a FreeFileSync log directory, parses each finished log (plain text or
//! HTML) into [`TransferRecord`]s and appends the new ones to a deduplicated CSV,
//! optionally mirroring the full record set to a second target.

pub mod config;
pub mod error;
pub mod mirror;
pub mod parser;
pub mod pipeline;
pub mod types;
pub mod watch;

pub use config::SentinelConfig;
pub use error::{Result, SentinelError};
pub use mirror::{FileMirror, MirrorDispatcher, MirrorError, SyncMirror};
pub use parser::{detect_format, parse_file, parse_str, ParsedLog};
pub use pipeline::{FileOutcome, LastParsed, Pipeline, RescanSummary};
pub use syncsentinel_sinks as sinks;
pub use types::{FileType, LogFormat, TransferRecord};
pub use watch::{Command, FsEvent, FsEventKind, NativeWatcher, WatchCoordinator};
