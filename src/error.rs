use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::io_error_msg;

/// Errors raised while merging combolists into a compilation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source file could not be opened or read. Aborts the whole merge.
    #[error("cannot read {}: {}", .path.display(), io_error_msg(.source))]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O failure while spilling a run, appending to a leaf, or replacing one.
    #[error("write failed on {}: {}", .path.display(), io_error_msg(.source))]
    DiskWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The first task failure observed by a barrier.
    #[error("task {task} failed: {source}")]
    TaskFailed {
        task: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("task {task} panicked: {message}")]
    TaskPanicked { task: u64, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("barrier deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::InputUnreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn disk(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::DiskWrite {
            path: path.into(),
            source,
        }
    }

    /// Strip scheduler wrapping to reach the error a task actually raised.
    pub fn root(&self) -> &Error {
        match self {
            Error::TaskFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
