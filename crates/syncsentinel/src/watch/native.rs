//! OS-native filesystem notifications via `notify`.

use super::coordinator::{FsEvent, FsEventKind};
use crate::error::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Keeps a `notify` watcher alive and forwards its events to the coordinator.
///
/// Dropping it stops the watch and closes the coordinator's event channel.
pub struct NativeWatcher {
    _watcher: RecommendedWatcher,
}

impl NativeWatcher {
    pub fn start(dir: &Path, recursive: bool, tx: UnboundedSender<FsEvent>) -> Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(kind) = convert_kind(&event.kind) else {
                        return;
                    };
                    let at = Instant::now();
                    for path in event.paths {
                        // Receiver gone means the coordinator stopped.
                        if tx.send(FsEvent::new(path, kind, at)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            },
            Config::default(),
        )?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(dir, mode)?;
        info!(dir = %dir.display(), recursive, "Watching for sync logs");

        Ok(Self { _watcher: watcher })
    }
}

fn convert_kind(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        EventKind::Remove(_) => Some(FsEventKind::Removed),
        // Access events and unclassified noise carry no content change.
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn test_convert_kind() {
        assert_eq!(
            convert_kind(&EventKind::Create(CreateKind::File)),
            Some(FsEventKind::Created)
        );
        assert_eq!(
            convert_kind(&EventKind::Modify(ModifyKind::Any)),
            Some(FsEventKind::Modified)
        );
        assert_eq!(
            convert_kind(&EventKind::Remove(RemoveKind::File)),
            Some(FsEventKind::Removed)
        );
        assert_eq!(convert_kind(&EventKind::Access(AccessKind::Any)), None);
    }
}
