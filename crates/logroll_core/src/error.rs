//! Error types for logroll core.

use crate::segment::SegmentState;
use logroll_storage::StorageError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for core operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors returned to callers of the rotating writer.
#[derive(Debug, Error)]
pub enum LogError {
    /// Opening, closing, renaming or writing a segment failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The writer has been closed.
    #[error("writer is closed")]
    Closed,

    /// The configuration was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A segment lifecycle transition is not allowed.
    #[error("invalid segment transition from {from} to {to}")]
    InvalidTransition {
        /// State the segment was in.
        from: SegmentState,
        /// State that was requested.
        to: SegmentState,
    },
}

impl LogError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this is the error returned after `close()`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<LogError> for io::Error {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Storage(e) => e.into(),
            LogError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, err.to_string()),
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        }
    }
}

/// Failures of background archive and retention work.
///
/// These never fail a `write` call. They are delivered through the
/// maintenance event feed and kept as the writer's last maintenance error.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Reading the source or writing the archive failed.
    #[error("archive I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The compressor rejected its input or configuration.
    #[error("compression failed for {}: {message}", path.display())]
    Compression {
        /// Source segment.
        path: PathBuf,
        /// Compressor message.
        message: String,
    },

    /// The path is not a rotated, not-yet-archived segment.
    #[error("not a pending segment: {}", path.display())]
    NotPending {
        /// Offending path.
        path: PathBuf,
    },

    /// A store operation (listing, removal) failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The archiver panicked while processing the segment.
    #[error("archiver panicked on {}: {message}", path.display())]
    Panicked {
        /// Source segment.
        path: PathBuf,
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl ArchiveError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a compression error for `path`.
    pub fn compression(path: impl AsRef<Path>, message: impl ToString) -> Self {
        Self::Compression {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }
}
