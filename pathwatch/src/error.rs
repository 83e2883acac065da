//! Error types for the path watcher.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while watching paths.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The filesystem-events backend could not be constructed.
    #[error("failed to initialize watch backend: {0}")]
    BackendInit(#[source] notify::Error),

    /// Registering the containing directory with the backend failed.
    ///
    /// The source is shared with every caller that was waiting on the same
    /// arming.
    #[error("failed to watch directory {path}: {source}")]
    BackendAdd {
        path: PathBuf,
        #[source]
        source: Arc<notify::Error>,
    },

    /// The path has no file name component to watch.
    #[error("invalid watch path: {0}")]
    InvalidPath(PathBuf),

    /// The directory containing the path could not be resolved.
    #[error("cannot resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watch loop exited before reporting that it was armed.
    #[error("watch loop for {0} exited before arming")]
    ArmingAborted(PathBuf),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
