//! Filesystem watching: debounce state machine, coordinator loop, native watcher.

pub mod coordinator;
pub mod native;
pub mod state;

pub use coordinator::{Command, FsEvent, FsEventKind, WatchCoordinator};
pub use native::NativeWatcher;
pub use state::{step, FileState, WatchInput, WatchTable, WatchedFile};
