//! Segment store trait definitions.

use crate::error::StorageResult;
use std::fmt;
use std::path::{Path, PathBuf};

/// An open, append-only segment file.
///
/// Handles are obtained from [`SegmentStore::open_active`] and released
/// through [`SegmentStore::close_active`].
pub trait SegmentFile: Send + fmt::Debug {
    /// Appends all of `data` to the end of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes could not be handed to the OS.
    fn append(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Flushes buffered bytes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the path the handle was opened at.
    fn path(&self) -> &Path;
}

/// Filesystem operations used by the rotating writer.
///
/// # Invariants
///
/// - `open_active` never truncates an existing file
/// - `rename_segment` never overwrites an existing destination
/// - `remove_segment` of a missing file succeeds
/// - `list_segments` may be called repeatedly and imposes no ordering
///
/// # Implementors
///
/// - [`super::FileSegmentStore`] - OS file API
pub trait SegmentStore: Send + Sync + fmt::Debug {
    /// Opens `path` for appending, creating it if absent.
    ///
    /// Returns the handle and the current size of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory is missing or the path is not
    /// writable.
    fn open_active(&self, path: &Path) -> StorageResult<(Box<dyn SegmentFile>, u64)>;

    /// Flushes and releases a segment handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails. The handle is released
    /// either way.
    fn close_active(&self, file: Box<dyn SegmentFile>) -> StorageResult<()>;

    /// Renames `from` to `to` within the same filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or `to` already exists.
    fn rename_segment(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Removes a segment file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the file not existing.
    fn remove_segment(&self, path: &Path) -> StorageResult<()>;

    /// Lists regular files in `dir` whose file name satisfies `matches`.
    ///
    /// The result is unordered; callers sort explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn list_segments(
        &self,
        dir: &Path,
        matches: &dyn Fn(&str) -> bool,
    ) -> StorageResult<Vec<PathBuf>>;

    /// Returns the size of a segment file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    fn segment_size(&self, path: &Path) -> StorageResult<u64>;
}
