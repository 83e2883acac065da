//! Filesystem-events backends.
//!
//! A backend arms non-recursive directory watches and publishes every event it
//! sees on a broadcast channel. Each watch loop holds its own receiver and
//! filters for the directory it cares about. The channel closes when the
//! backend is dropped.

use std::path::Path;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::event::{BackendEvent, RawEvent};

/// Capability consumed from a filesystem-events backend.
pub trait WatchBackend: Send + Sync {
    /// Start watching a directory (non-recursive).
    fn add_watch(&self, dir: &Path) -> notify::Result<()>;

    /// Stop watching a directory.
    fn remove_watch(&self, dir: &Path) -> notify::Result<()>;

    /// Subscribe to the event and error stream.
    ///
    /// Only events published after the call are delivered to the receiver.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}

/// Backend over the platform's recommended `notify` watcher.
pub struct NotifyBackend {
    watcher: Mutex<RecommendedWatcher>,
    events_tx: broadcast::Sender<BackendEvent>,
}

impl NotifyBackend {
    /// Create a backend whose event channel holds up to `capacity` events.
    pub fn new(capacity: usize) -> notify::Result<Self> {
        let (events_tx, _) = broadcast::channel(capacity.max(1));
        let tx = events_tx.clone();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in RawEvent::from_notify(event) {
                    // No receivers just means no path is being watched.
                    let _ = tx.send(BackendEvent::Fs(raw));
                }
            }
            Err(e) => {
                let _ = tx.send(BackendEvent::Error(e.to_string()));
            }
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            events_tx,
        })
    }
}

impl WatchBackend for NotifyBackend {
    fn add_watch(&self, dir: &Path) -> notify::Result<()> {
        self.watcher.lock().watch(dir, RecursiveMode::NonRecursive)?;
        debug!("Started watching: {}", dir.display());
        Ok(())
    }

    fn remove_watch(&self, dir: &Path) -> notify::Result<()> {
        self.watcher.lock().unwatch(dir)?;
        debug!("Stopped watching: {}", dir.display());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events_tx.subscribe()
    }
}
