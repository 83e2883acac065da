//! Raw filesystem events as delivered by a watch backend.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};

/// Operation carried by a raw filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOp {
    /// Entry was created, or something was renamed onto it.
    Create,

    /// Entry contents were written.
    Write,

    /// Entry was removed.
    Remove,

    /// Entry was renamed away.
    Rename,

    /// Entry metadata changed.
    Chmod,

    /// Access or unknown event.
    Other,
}

impl From<notify::EventKind> for EventOp {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Create,
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                // The destination of a rename is a new entry under that name.
                ModifyKind::Name(RenameMode::To) => Self::Create,
                ModifyKind::Name(_) => Self::Rename,
                ModifyKind::Metadata(_) => Self::Chmod,
                _ => Self::Write,
            },
            notify::EventKind::Remove(_) => Self::Remove,
            _ => Self::Other,
        }
    }
}

/// A single-path event for some entry in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Path of the affected entry, as reported by the backend.
    pub path: PathBuf,

    /// What happened to it.
    pub op: EventOp,
}

impl RawEvent {
    /// Create a new raw event.
    pub fn new(op: EventOp, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Split a notify event into one raw event per affected path.
    ///
    /// A paired rename carries `[from, to]`; the source becomes a
    /// [`EventOp::Rename`] and the destination a [`EventOp::Create`].
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        if event.kind == notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) {
            return event
                .paths
                .into_iter()
                .enumerate()
                .map(|(i, path)| {
                    let op = if i == 0 { EventOp::Rename } else { EventOp::Create };
                    Self::new(op, path)
                })
                .collect();
        }

        let op = EventOp::from(event.kind);
        event
            .paths
            .into_iter()
            .map(|path| Self::new(op, path))
            .collect()
    }
}

/// Item on a backend's event stream.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A filesystem event.
    Fs(RawEvent),

    /// The backend reported an error.
    Error(String),
}
