//! Path watcher implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{NotifyBackend, WatchBackend};
use crate::broadcaster::{Broadcaster, Subscription, WaitOutcome};
use crate::classifier::WatchedPath;
use crate::config::WatcherConfig;
use crate::error::{Result, WatchError};
use crate::registry::{PathRegistry, WatchEntry};
use crate::watch_loop::{ArmState, WatchLoop};

/// Watches individual files and wakes subscribers when any of them changes.
///
/// Notifications are watcher-scoped: a change to any registered path wakes
/// every current waiter. Waiters should re-read whatever they depend on.
pub struct Watcher {
    /// Registered paths.
    registry: tokio::sync::Mutex<PathRegistry>,

    /// Filesystem-events backend.
    backend: Arc<dyn WatchBackend>,

    /// Shared change notification.
    broadcaster: Arc<Broadcaster>,

    config: WatcherConfig,

    next_id: AtomicU64,
}

impl Watcher {
    /// Create a watcher over the platform's native backend.
    pub fn new() -> Result<Self> {
        Self::with_config(WatcherConfig::default())
    }

    /// Create a watcher with the given configuration.
    pub fn with_config(config: WatcherConfig) -> Result<Self> {
        let backend = NotifyBackend::new(config.event_capacity).map_err(WatchError::BackendInit)?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Create a watcher over a custom backend.
    pub fn with_backend(backend: Arc<dyn WatchBackend>, config: WatcherConfig) -> Self {
        Self {
            registry: tokio::sync::Mutex::new(PathRegistry::new()),
            backend,
            broadcaster: Arc::new(Broadcaster::new()),
            config,
            next_id: AtomicU64::new(0),
        }
    }

    /// Start watching a file.
    ///
    /// Returns once the containing directory is registered with the backend,
    /// so any change made after this returns is observed. Adding a path that is
    /// already watched waits for that registration to finish arming and
    /// returns its outcome. Adding a path whose watch loop has terminated (the
    /// file was removed, or the backend failed) arms it again.
    pub async fn add_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        let (id, mut armed, fresh) = {
            let mut registry = self.registry.lock().await;

            let existing = match registry.get(&path) {
                Some(entry) if !entry.is_terminated() => Some((entry.id, entry.armed.clone())),
                Some(_) => {
                    info!("Re-arming terminated watch: {}", path.display());
                    None
                }
                None => None,
            };

            match existing {
                Some((id, armed)) => {
                    debug!("Already watching: {}", path.display());
                    (id, armed, false)
                }
                None => {
                    let watched = Arc::new(Mutex::new(WatchedPath::resolve(&path).await?));
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let cancel = CancellationToken::new();
                    let (armed_tx, armed_rx) = watch::channel(ArmState::Arming);

                    let watch_loop = WatchLoop::new(
                        watched.clone(),
                        self.broadcaster.clone(),
                        cancel.clone(),
                        self.config.detect_symlink_swaps,
                    );
                    let task = tokio::spawn(watch_loop.run(self.backend.clone(), armed_tx));

                    registry.insert(
                        path.clone(),
                        WatchEntry {
                            id,
                            watched,
                            cancel,
                            armed: armed_rx.clone(),
                            task,
                        },
                    );
                    (id, armed_rx, true)
                }
            }
        };

        // A closed channel with no settled state means the loop died while arming.
        let settled = armed.wait_for(ArmState::is_settled).await.is_ok();
        let state = if settled {
            armed.borrow().clone()
        } else {
            ArmState::Aborted
        };

        match state.into_result(&path) {
            Ok(()) => {
                if fresh {
                    info!("Watching file: {}", path.display());
                }
                Ok(())
            }
            Err(e) => {
                self.registry.lock().await.remove_if(&path, id);
                Err(e)
            }
        }
    }

    /// Stop watching a file.
    ///
    /// Returns false if the path was not registered. The watch loop has exited
    /// by the time this returns, and the directory is released unless another
    /// registered path still uses it.
    pub async fn remove_path(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();

        let Some(entry) = self.registry.lock().await.remove(path) else {
            return false;
        };
        let dir = entry.canonical_directory();

        // Join first: a loop still arming may register the directory late.
        entry.stop().await;

        let registry = self.registry.lock().await;
        if !registry.directory_in_use(&dir) {
            self.unwatch(&dir);
        }
        drop(registry);

        info!("Removed watch: {}", path.display());
        true
    }

    /// Stop watching every file.
    ///
    /// Safe to call with nothing registered. All watch loops have exited and
    /// their directories are released by the time this returns.
    pub async fn clear(&self) {
        let entries = self.registry.lock().await.drain();
        let dirs: HashSet<PathBuf> = entries
            .iter()
            .map(|(_, entry)| entry.canonical_directory())
            .collect();

        let count = entries.len();
        for (_, entry) in entries {
            entry.stop().await;
        }

        let registry = self.registry.lock().await;
        for dir in dirs.iter().filter(|dir| !registry.directory_in_use(dir)) {
            self.unwatch(dir);
        }
        drop(registry);

        if count > 0 {
            info!("Cleared {count} watches");
        }
    }

    fn unwatch(&self, dir: &Path) {
        if let Err(e) = self.backend.remove_watch(dir) {
            warn!("Failed to unwatch {}: {e}", dir.display());
        }
    }

    /// Register a waiter for the next change.
    pub fn subscribe(&self) -> Subscription<'_> {
        self.broadcaster.subscribe()
    }

    /// Wait for the next change or for `cancel` to fire.
    pub async fn wait(&self, cancel: &CancellationToken) -> WaitOutcome {
        self.broadcaster.wait(cancel).await
    }

    /// Wait for the next change, giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        self.broadcaster.wait_timeout(timeout).await
    }

    /// Get the shared broadcaster, for consumers that outlive a borrow.
    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    /// Check if a path is registered, whether or not its loop is running.
    pub async fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.registry.lock().await.contains(path.as_ref())
    }

    /// Check if a path is registered and its watch loop is still running.
    pub async fn is_active(&self, path: impl AsRef<Path>) -> bool {
        self.registry
            .lock()
            .await
            .get(path.as_ref())
            .is_some_and(|entry| !entry.is_terminated())
    }

    /// The symlink target recorded for a path at its last meaningful event.
    pub async fn recorded_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        self.registry
            .lock()
            .await
            .get(path.as_ref())
            .and_then(|entry| entry.watched.lock().last_resolved_target.clone())
    }

    /// Get all registered paths.
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        self.registry
            .lock()
            .await
            .paths()
            .map(Path::to_path_buf)
            .collect()
    }

    /// Number of registered paths.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Check if no paths are registered.
    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }

    /// Get the configuration.
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.registry.get_mut().cancel_all();
    }
}
