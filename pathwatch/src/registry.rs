//! Registry of watched paths.
//!
//! Holds one entry per registered path together with the handles needed to
//! stop its watch loop. The registry itself performs no IO; the
//! [`Watcher`](crate::Watcher) serializes access to it and talks to the
//! backend.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::classifier::WatchedPath;
use crate::watch_loop::{ArmState, LoopExit};

/// A registered path and its running watch loop.
#[derive(Debug)]
pub(crate) struct WatchEntry {
    /// Distinguishes this registration from later ones for the same path.
    pub(crate) id: u64,
    pub(crate) watched: Arc<Mutex<WatchedPath>>,
    pub(crate) cancel: CancellationToken,
    /// Arming outcome, shared by every caller that added this registration.
    pub(crate) armed: watch::Receiver<ArmState>,
    pub(crate) task: JoinHandle<LoopExit>,
}

impl WatchEntry {
    /// Directory the backend watches for this entry.
    pub(crate) fn canonical_directory(&self) -> PathBuf {
        self.watched.lock().canonical_directory.clone()
    }

    /// Whether the watch loop has exited.
    pub(crate) fn is_terminated(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the watch loop and wait for it to exit.
    pub(crate) async fn stop(self) -> Option<LoopExit> {
        self.cancel.cancel();
        match self.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!("Watch loop task failed: {e}");
                None
            }
        }
    }
}

/// Set of watched paths, at most one entry per path.
#[derive(Debug, Default)]
pub struct PathRegistry {
    entries: HashMap<PathBuf, WatchEntry>,
}

impl PathRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a path is registered.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Get count of registered paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get all registered paths.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Whether any registered entry watches `dir`.
    pub fn directory_in_use(&self, dir: &Path) -> bool {
        self.entries
            .values()
            .any(|entry| entry.canonical_directory() == dir)
    }

    pub(crate) fn get(&self, path: &Path) -> Option<&WatchEntry> {
        self.entries.get(path)
    }

    /// Insert an entry, returning the one it replaced.
    pub(crate) fn insert(&mut self, path: PathBuf, entry: WatchEntry) -> Option<WatchEntry> {
        self.entries.insert(path, entry)
    }

    pub(crate) fn remove(&mut self, path: &Path) -> Option<WatchEntry> {
        self.entries.remove(path)
    }

    /// Remove the entry for `path` only if it is still registration `id`.
    pub(crate) fn remove_if(&mut self, path: &Path, id: u64) -> Option<WatchEntry> {
        match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(occupied) if occupied.get().id == id => Some(occupied.remove()),
            _ => None,
        }
    }

    /// Signal every watch loop to stop without waiting for it.
    pub(crate) fn cancel_all(&self) {
        for entry in self.entries.values() {
            entry.cancel.cancel();
        }
    }

    /// Remove every entry.
    pub(crate) fn drain(&mut self) -> Vec<(PathBuf, WatchEntry)> {
        self.entries.drain().collect()
    }
}
