//! # Path Watcher
//!
//! This crate watches individual files and wakes interested parties when one
//! of them changes in a meaningful way.
//!
//! ## Features
//!
//! - **Directory-level arming**: The directory containing each file is
//!   watched, so editors that save by rename are still seen
//! - **Symlink swap detection**: A file that is a symlink atomically
//!   re-pointed to a new target (mounted ConfigMaps and Secrets) counts as
//!   changed even though its own directory entry is never written
//! - **Broadcast notification**: Any number of waiters wake on the next
//!   change; nothing is queued for late subscribers
//! - **Deterministic lifecycle**: `add_path` returns once armed, and
//!   `remove_path`/`clear` return once the watch loops have exited
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Watcher                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  PathRegistry ──► WatchLoop (one per path) ──► Broadcaster      │
//! │                        │           │                │           │
//! │                        ▼           ▼                ▼           │
//! │               WatchBackend   Classifier       Subscription      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> pathwatch::Result<()> {
//! use std::time::Duration;
//! use pathwatch::{WaitOutcome, Watcher};
//!
//! let watcher = Watcher::new()?;
//! watcher.add_path("/etc/app/config.yaml").await?;
//!
//! loop {
//!     if watcher.wait_timeout(Duration::from_secs(60)).await == WaitOutcome::Changed {
//!         // re-read the configuration
//!     }
//! }
//! # }
//! ```

pub mod backend;
pub mod broadcaster;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
mod registry;
mod watch_loop;
pub mod watcher;

pub use backend::{NotifyBackend, WatchBackend};
pub use broadcaster::{Broadcaster, Subscription, WaitOutcome};
pub use classifier::{Classification, WatchedPath};
pub use config::WatcherConfig;
pub use error::{Result, WatchError};
pub use event::{BackendEvent, EventOp, RawEvent};
pub use watch_loop::LoopExit;
pub use watcher::Watcher;
