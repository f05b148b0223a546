//! Error types for segment store operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for segment store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during segment store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred while operating on a path.
    #[error("I/O error during {op} on {}: {source}", path.display())]
    Io {
        /// The operation that failed (`open`, `rename`, ...).
        op: &'static str,
        /// The path the operation was applied to.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A rename target already exists.
    #[error("segment already exists: {}", path.display())]
    AlreadyExists {
        /// The colliding destination path.
        path: PathBuf,
    },

    /// The segment handle was already released.
    #[error("segment handle is closed")]
    Closed,
}

impl StorageError {
    /// Creates an I/O error for `op` on `path`.
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns the path this error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } | Self::AlreadyExists { path } => Some(path),
            Self::Closed => None,
        }
    }

    /// Returns the raw OS error code of an I/O failure.
    #[must_use]
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns the I/O error kind, mapping collisions to `AlreadyExists`.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Io { source, .. } => source.kind(),
            Self::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            Self::Closed => io::ErrorKind::BrokenPipe,
        }
    }

    /// Returns true if the failure was caused by a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == io::ErrorKind::NotFound
    }
}

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io { source, .. } => source,
            other => io::Error::new(other.kind(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_path_and_code() {
        let err = StorageError::io(
            "open",
            "/var/log/app.log",
            io::Error::from_raw_os_error(2),
        );

        assert_eq!(err.path(), Some(Path::new("/var/log/app.log")));
        assert_eq!(err.os_code(), Some(2));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/var/log/app.log"));
    }

    #[test]
    fn collision_maps_to_already_exists() {
        let err = StorageError::AlreadyExists {
            path: PathBuf::from("app.log.1"),
        };
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::AlreadyExists);
    }
}
