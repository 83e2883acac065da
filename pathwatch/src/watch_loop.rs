//! Per-path watch loop.
//!
//! Each registered path gets one task that moves through
//! `Arming -> Active -> Terminated`. Arming subscribes to the backend stream
//! before registering the directory, so nothing that happens after the caller
//! is told "armed" can be missed. The arming outcome is published on a `watch`
//! channel so that every caller waiting on the same registration sees it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::WatchBackend;
use crate::broadcaster::Broadcaster;
use crate::classifier::{Classification, WatchedPath, resolve_target};
use crate::error::{Result, WatchError};
use crate::event::{BackendEvent, RawEvent};

/// Why a watch loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The directory could not be registered with the backend.
    ArmingFailed,

    /// The watched file itself was removed.
    Removed,

    /// The backend reported an error.
    BackendError(String),

    /// The backend shut down.
    BackendClosed,

    /// The loop was stopped by `remove_path`, `clear`, or dropping the watcher.
    Cancelled,
}

/// Arming progress of a watch loop.
#[derive(Debug, Clone)]
pub(crate) enum ArmState {
    Arming,
    Armed,
    Failed {
        dir: PathBuf,
        source: Arc<notify::Error>,
    },
    /// Cancelled before arming completed.
    Aborted,
}

impl ArmState {
    pub(crate) fn is_settled(&self) -> bool {
        !matches!(self, ArmState::Arming)
    }

    /// Outcome as seen by an `add_path` caller for `path`.
    pub(crate) fn into_result(self, path: &Path) -> Result<()> {
        match self {
            ArmState::Armed => Ok(()),
            ArmState::Failed { dir, source } => Err(WatchError::BackendAdd { path: dir, source }),
            ArmState::Arming | ArmState::Aborted => {
                Err(WatchError::ArmingAborted(path.to_path_buf()))
            }
        }
    }
}

/// Watch loop for a single path.
pub(crate) struct WatchLoop {
    watched: Arc<Mutex<WatchedPath>>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
    detect_swaps: bool,
}

impl WatchLoop {
    pub(crate) fn new(
        watched: Arc<Mutex<WatchedPath>>,
        broadcaster: Arc<Broadcaster>,
        cancel: CancellationToken,
        detect_swaps: bool,
    ) -> Self {
        Self {
            watched,
            broadcaster,
            cancel,
            detect_swaps,
        }
    }

    /// Arm the directory watch, publish the outcome on `armed`, then process
    /// events until terminated.
    ///
    /// `backend` is released once arming is done so that dropping the owning
    /// watcher closes the event stream. A loop cancelled while arming reports
    /// [`ArmState::Aborted`]; releasing the directory is then up to whoever
    /// cancelled it, after joining the task.
    pub(crate) async fn run(
        self,
        backend: Arc<dyn WatchBackend>,
        armed: watch::Sender<ArmState>,
    ) -> LoopExit {
        let (path, dir, watched_file) = {
            let watched = self.watched.lock();
            (
                watched.path.clone(),
                watched.canonical_directory.clone(),
                watched.watched_file.clone(),
            )
        };

        let events = backend.subscribe();
        if let Err(source) = backend.add_watch(&dir) {
            error!("Failed to watch {} for {}: {source}", dir.display(), path.display());
            armed.send_replace(ArmState::Failed {
                dir,
                source: Arc::new(source),
            });
            return LoopExit::ArmingFailed;
        }
        drop(backend);

        if self.cancel.is_cancelled() {
            debug!("Watch for {} cancelled while arming", path.display());
            armed.send_replace(ArmState::Aborted);
            return LoopExit::Cancelled;
        }

        // Record the target as of arming; anything after this is a change.
        let initial = resolve_target(&watched_file).await;
        self.watched.lock().last_resolved_target = initial;

        debug!("Armed watch for {}", path.display());
        armed.send_replace(ArmState::Armed);
        drop(armed);

        let exit = self.process(events, &watched_file).await;
        match &exit {
            LoopExit::Removed => info!("Watched file removed: {}", path.display()),
            LoopExit::BackendError(e) => {
                error!("Stopped watching {}: watch backend error: {e}", path.display());
            }
            LoopExit::BackendClosed => debug!("Watch backend closed for {}", path.display()),
            LoopExit::Cancelled => debug!("Watch cancelled for {}", path.display()),
            LoopExit::ArmingFailed => {}
        }
        exit
    }

    async fn process(
        &self,
        mut events: broadcast::Receiver<BackendEvent>,
        watched_file: &Path,
    ) -> LoopExit {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LoopExit::Cancelled,
                received = events.recv() => received,
            };

            match received {
                Ok(BackendEvent::Fs(event)) => {
                    if self.handle_event(&event).await == Classification::Removed {
                        return LoopExit::Removed;
                    }
                }
                Ok(BackendEvent::Error(e)) => return LoopExit::BackendError(e),
                Err(broadcast::error::RecvError::Closed) => return LoopExit::BackendClosed,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "Watch loop for {} missed {missed} events, notifying anyway",
                        watched_file.display()
                    );
                    let current = resolve_target(watched_file).await;
                    if current.is_some() {
                        self.watched.lock().last_resolved_target = current;
                    }
                    self.broadcaster.broadcast();
                }
            }
        }
    }

    async fn handle_event(&self, event: &RawEvent) -> Classification {
        let watched_file = {
            let watched = self.watched.lock();
            if !watched.is_in_directory(&event.path) {
                return Classification::Ignored;
            }
            watched.watched_file.clone()
        };

        let current = resolve_target(&watched_file).await;
        let (classification, target) = {
            let mut watched = self.watched.lock();
            let classification = watched.classify(event, current, self.detect_swaps);
            (classification, watched.last_resolved_target.clone())
        };

        if classification == Classification::Changed {
            info!(
                "Detected file change: {:?} {} (target {})",
                event.op,
                event.path.display(),
                target
                    .as_deref()
                    .map(|t| t.display().to_string())
                    .unwrap_or_default()
            );
            let woken = self.broadcaster.broadcast();
            debug!("Woke {woken} waiters");
        }

        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::WaitOutcome;
    use crate::event::EventOp;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct ChannelBackend {
        tx: broadcast::Sender<BackendEvent>,
        add_calls: AtomicUsize,
    }

    impl ChannelBackend {
        fn new(capacity: usize) -> Arc<Self> {
            let (tx, _) = broadcast::channel(capacity);
            Arc::new(Self {
                tx,
                add_calls: AtomicUsize::new(0),
            })
        }
    }

    impl WatchBackend for ChannelBackend {
        fn add_watch(&self, _dir: &Path) -> notify::Result<()> {
            self.add_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn remove_watch(&self, _dir: &Path) -> notify::Result<()> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
            self.tx.subscribe()
        }
    }

    async fn watched_file(temp_dir: &TempDir) -> Arc<Mutex<WatchedPath>> {
        let path = temp_dir.path().join("app.toml");
        std::fs::write(&path, "").unwrap();
        Arc::new(Mutex::new(WatchedPath::resolve(&path).await.unwrap()))
    }

    async fn spawn_loop(
        capacity: usize,
    ) -> (
        TempDir,
        Arc<ChannelBackend>,
        Arc<Broadcaster>,
        tokio::task::JoinHandle<LoopExit>,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let backend = ChannelBackend::new(capacity);
        let broadcaster = Arc::new(Broadcaster::new());

        let watch_loop = WatchLoop::new(
            watched_file(&temp_dir).await,
            broadcaster.clone(),
            CancellationToken::new(),
            true,
        );
        let (armed_tx, mut armed_rx) = watch::channel(ArmState::Arming);
        let task = tokio::spawn(watch_loop.run(backend.clone(), armed_tx));
        let state = armed_rx.wait_for(ArmState::is_settled).await.unwrap().clone();
        assert!(matches!(state, ArmState::Armed));

        (temp_dir, backend, broadcaster, task)
    }

    #[tokio::test]
    async fn test_cancel_while_arming_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let backend = ChannelBackend::new(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let watch_loop = WatchLoop::new(
            watched_file(&temp_dir).await,
            Arc::new(Broadcaster::new()),
            cancel,
            true,
        );
        let (armed_tx, armed_rx) = watch::channel(ArmState::Arming);
        let exit = watch_loop.run(backend.clone(), armed_tx).await;

        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(backend.add_calls.load(Ordering::SeqCst), 1);
        let path = temp_dir.path().join("app.toml");
        let result = armed_rx.borrow().clone().into_result(&path);
        assert!(matches!(result, Err(WatchError::ArmingAborted(p)) if p == path));
    }

    #[tokio::test]
    async fn test_lagged_stream_notifies() {
        let (_temp_dir, backend, broadcaster, _task) = spawn_loop(1).await;
        let subscription = broadcaster.subscribe();

        for i in 0..3 {
            let path = PathBuf::from(format!("/elsewhere/{i}.toml"));
            let _ = backend.tx.send(BackendEvent::Fs(RawEvent::new(EventOp::Write, path)));
        }

        let outcome = subscription.wait_timeout(Duration::from_secs(5)).await;
        assert_eq!(outcome, WaitOutcome::Changed);
    }

    #[tokio::test]
    async fn test_closed_stream_terminates() {
        let (_temp_dir, backend, _broadcaster, task) = spawn_loop(8).await;
        drop(backend);

        let exit = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert_eq!(exit.unwrap().unwrap(), LoopExit::BackendClosed);
    }

    #[tokio::test]
    async fn test_backend_error_terminates() {
        let (_temp_dir, backend, _broadcaster, task) = spawn_loop(8).await;
        let _ = backend.tx.send(BackendEvent::Error("inotify queue overflow".to_string()));

        let exit = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert_eq!(
            exit.unwrap().unwrap(),
            LoopExit::BackendError("inotify queue overflow".to_string())
        );
    }
}
