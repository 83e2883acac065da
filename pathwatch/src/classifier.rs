//! Decides which raw directory events are meaningful changes to a watched file.
//!
//! Backends report events for the whole containing directory. A file that is
//! really a symlink swapped out by an orchestrator (for example a mounted
//! ConfigMap, where `config.yaml -> ..data/config.yaml` and `..data` is
//! atomically replaced) never receives a write event of its own, so the target
//! is re-resolved on every event in the directory and compared against the one
//! recorded last time.

use std::path::{Path, PathBuf};

use crate::error::{Result, WatchError};
use crate::event::{EventOp, RawEvent};

/// Verdict for a single raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The watched file changed; subscribers should be woken.
    Changed,

    /// The watched file itself was removed; the watch loop should stop.
    Removed,

    /// Not relevant to the watched file.
    Ignored,
}

/// A registered file and what it resolved to last time it was looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedPath {
    /// Path as given by the caller.
    pub path: PathBuf,

    /// Canonical form of the directory containing `path`. This is what the
    /// backend watches.
    pub canonical_directory: PathBuf,

    /// `canonical_directory` joined with the file name: the path the backend
    /// reports for the directory entry itself.
    pub watched_file: PathBuf,

    /// Fully resolved target, or `None` if the file did not exist.
    pub last_resolved_target: Option<PathBuf>,
}

impl WatchedPath {
    /// Resolve the containing directory and the current target of `path`.
    pub async fn resolve(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| WatchError::InvalidPath(path.to_path_buf()))?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let canonical_directory = tokio::fs::canonicalize(parent).await.map_err(|source| {
            WatchError::Resolve {
                path: parent.to_path_buf(),
                source,
            }
        })?;

        let watched_file = canonical_directory.join(file_name);
        let last_resolved_target = resolve_target(&watched_file).await;

        Ok(Self {
            path: path.to_path_buf(),
            canonical_directory,
            watched_file,
            last_resolved_target,
        })
    }

    /// Whether `event_path` names an entry directly inside the watched directory.
    pub fn is_in_directory(&self, event_path: &Path) -> bool {
        event_path.parent() == Some(self.canonical_directory.as_path())
    }

    /// Classify `event` given the freshly resolved `current_target`.
    ///
    /// A target change updates the recorded target. With `detect_swaps`
    /// disabled only events naming the file itself count.
    pub fn classify(
        &mut self,
        event: &RawEvent,
        current_target: Option<PathBuf>,
        detect_swaps: bool,
    ) -> Classification {
        let names_file = event.path == self.watched_file;

        let direct = names_file && matches!(event.op, EventOp::Write | EventOp::Create);
        let swapped = detect_swaps
            && current_target.is_some()
            && current_target != self.last_resolved_target;

        if direct || swapped {
            if current_target.is_some() {
                self.last_resolved_target = current_target;
            }
            return Classification::Changed;
        }

        if names_file && event.op == EventOp::Remove {
            return Classification::Removed;
        }

        Classification::Ignored
    }
}

/// Resolve `path` through any symlinks. `None` if it does not exist.
pub async fn resolve_target(path: &Path) -> Option<PathBuf> {
    tokio::fs::canonicalize(path).await.ok()
}
