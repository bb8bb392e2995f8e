//! File system watcher bridging change events into a sync session.
//!
//! Cross-platform watching via the notify crate. Events are delivered to
//! the session's command queue; all filtering and pending-map bookkeeping
//! happens inside the session actor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::error;

/// Kind of change observed under a watched root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Other | EventKind::Any => None,
        }
    }
}

/// A single observed change; the path is absolute.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Keeps the underlying notify watcher alive. Dropping the guard closes
/// the watcher and stops observation.
pub struct WatcherGuard {
    _watcher: RecommendedWatcher,
}

/// Start watching `root` recursively, delivering each change through
/// `deliver`. Watcher-level errors are logged and do not terminate the
/// session; it continues without live events.
pub fn spawn<F>(root: &Path, session_id: &str, deliver: F) -> Result<WatcherGuard>
where
    F: Fn(ChangeEvent) + Send + 'static,
{
    let session = session_id.to_string();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Some(kind) = ChangeKind::from_notify(&event.kind) {
                    for path in event.paths {
                        deliver(ChangeEvent { kind, path });
                    }
                }
            }
            Err(err) => {
                error!(session = %session, error = %err, "watcher error; continuing without live events");
            }
        },
        Config::default().with_poll_interval(Duration::from_secs(1)),
    )?;

    watcher.watch(root, RecursiveMode::Recursive)?;

    Ok(WatcherGuard { _watcher: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::tempdir;

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();

        let watcher = spawn(dir.path(), "test", move |event| {
            let _ = tx.send(event);
        });

        assert!(watcher.is_ok());
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("missing");

        let watcher = spawn(&gone, "test", |_| {});

        assert!(watcher.is_err());
    }

    #[test]
    fn test_file_change_detection() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let _guard = spawn(dir.path(), "test", move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

        std::fs::write(dir.path().join("test.txt"), "test content").unwrap();

        // Event delivery is asynchronous; in CI we may not catch it, so we
        // only verify nothing panics while draining.
        std::thread::sleep(Duration::from_millis(50));
        while rx.try_recv().is_ok() {}
    }
}
