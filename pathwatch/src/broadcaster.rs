//! Fan-out change notification.
//!
//! Any number of parties can wait for the next change. A broadcast wakes the
//! waiters registered at the instant of the call and nothing else: it is not
//! queued for parties that subscribe later, so a woken party is expected to
//! re-read whatever state it cares about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A broadcast was received.
    Changed,

    /// The wait was cancelled or timed out first.
    Cancelled,
}

/// Registry of waiters woken together by [`Broadcaster::broadcast`].
#[derive(Debug, Default)]
pub struct Broadcaster {
    waiters: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Create a broadcaster with no waiters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter now.
    ///
    /// Every broadcast issued after this call returns is observed by the
    /// subscription, even if [`Subscription::wait`] is polled later.
    pub fn subscribe(&self) -> Subscription<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);
        Subscription {
            broadcaster: self,
            id,
            rx,
        }
    }

    /// Wait for the next broadcast or for `cancel` to fire.
    pub async fn wait(&self, cancel: &CancellationToken) -> WaitOutcome {
        self.subscribe().wait(cancel).await
    }

    /// Wait for the next broadcast, giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        self.subscribe().wait_timeout(timeout).await
    }

    /// Wake every currently registered waiter once.
    ///
    /// Never blocks on slow waiters. Returns how many were woken.
    pub fn broadcast(&self) -> usize {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        waiters
            .into_values()
            .map(|tx| tx.send(()))
            .filter(Result::is_ok)
            .count()
    }

    /// Number of waiters currently registered.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn unregister(&self, id: u64) {
        self.waiters.lock().remove(&id);
    }
}

/// A registered waiter. Dropping it unregisters the waiter.
#[derive(Debug)]
pub struct Subscription<'a> {
    broadcaster: &'a Broadcaster,
    id: u64,
    rx: oneshot::Receiver<()>,
}

impl Subscription<'_> {
    /// Wait for a broadcast or for `cancel` to fire.
    pub async fn wait(mut self, cancel: &CancellationToken) -> WaitOutcome {
        tokio::select! {
            biased;
            res = &mut self.rx => match res {
                Ok(()) => WaitOutcome::Changed,
                Err(_) => WaitOutcome::Cancelled,
            },
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        }
    }

    /// Wait for a broadcast, giving up after `timeout`.
    pub async fn wait_timeout(mut self, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(())) => WaitOutcome::Changed,
            Ok(Err(_)) | Err(_) => WaitOutcome::Cancelled,
        }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.broadcaster.unregister(self.id);
    }
}
