//! OS-backed segment store.

use crate::error::{StorageError, StorageResult};
use crate::store::{SegmentFile, SegmentStore};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An active segment file opened in append mode.
///
/// Every `append` is handed to the OS before returning; nothing is buffered
/// in user space.
#[derive(Debug)]
pub struct FileSegment {
    path: PathBuf,
    file: Option<File>,
}

impl FileSegment {
    /// Runs `op` on the open handle, naming `what` in the error.
    fn with_file(
        &mut self,
        what: &'static str,
        op: impl FnOnce(&mut File) -> io::Result<()>,
    ) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        op(file).map_err(|e| StorageError::io(what, &self.path, e))
    }

    /// Releases the OS handle after a final flush.
    fn release(&mut self) -> StorageResult<()> {
        let Some(mut file) = self.file.take() else {
            return Err(StorageError::Closed);
        };
        file.flush()
            .map_err(|e| StorageError::io("close", &self.path, e))?;
        drop(file);
        Ok(())
    }
}

impl SegmentFile for FileSegment {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.with_file("write", |file| file.write_all(data))
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.with_file("flush", |file| file.flush())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.with_file("sync", |file| file.sync_all())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// A segment store using the OS file API.
///
/// # Durability
///
/// - `append` writes through to the OS page cache
/// - [`SegmentFile::sync`] calls `File::sync_all()`
/// - renames and removals are not followed by a directory fsync
///
/// # Example
///
/// ```no_run
/// use logroll_storage::{FileSegmentStore, SegmentStore};
/// use std::path::Path;
///
/// let store = FileSegmentStore::new();
/// store
///     .rename_segment(Path::new("app.log"), Path::new("app.log.0000000001-0"))
///     .unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSegmentStore;

impl FileSegmentStore {
    /// Creates a new file segment store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SegmentStore for FileSegmentStore {
    fn open_active(&self, path: &Path) -> StorageResult<(Box<dyn SegmentFile>, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::io("open", path, e))?;

        let size = file
            .metadata()
            .map_err(|e| StorageError::io("stat", path, e))?
            .len();

        debug!(path = %path.display(), size, "opened active segment");

        Ok((
            Box::new(FileSegment {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            size,
        ))
    }

    fn close_active(&self, mut file: Box<dyn SegmentFile>) -> StorageResult<()> {
        file.flush()?;
        // Dropping the handle closes the descriptor.
        drop(file);
        Ok(())
    }

    fn rename_segment(&self, from: &Path, to: &Path) -> StorageResult<()> {
        // `fs::rename` silently replaces the target on Unix.
        match fs::symlink_metadata(to) {
            Ok(_) => {
                return Err(StorageError::AlreadyExists {
                    path: to.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io("rename", to, e)),
        }

        fs::rename(from, to).map_err(|e| StorageError::io("rename", from, e))
    }

    fn remove_segment(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("remove", path, e)),
        }
    }

    fn list_segments(
        &self,
        dir: &Path,
        matches: &dyn Fn(&str) -> bool,
    ) -> StorageResult<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|e| StorageError::io("list", dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("list", dir, e))?;

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            if matches(name) {
                paths.push(entry.path());
            }
        }

        Ok(paths)
    }

    fn segment_size(&self, path: &Path) -> StorageResult<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| StorageError::io("stat", path, e))
    }
}

impl Drop for FileSegment {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        let (_file, size) = FileSegmentStore::new().open_active(&path).unwrap();
        assert_eq!(size, 0);
        assert!(path.exists());
    }

    #[test]
    fn open_reports_existing_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"0123456789").unwrap();

        let store = FileSegmentStore::new();
        let (mut file, size) = store.open_active(&path).unwrap();
        assert_eq!(size, 10);

        // Appends, never truncates
        file.append(b"abc").unwrap();
        store.close_active(file).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"0123456789abc");
    }

    #[test]
    fn open_fails_without_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("app.log");

        let err = FileSegmentStore::new().open_active(&path).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn rename_moves_file() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("app.log");
        let to = dir.path().join("app.log.1");
        fs::write(&from, b"data").unwrap();

        FileSegmentStore::new().rename_segment(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");
    }

    #[test]
    fn rename_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("app.log");
        let to = dir.path().join("app.log.1");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = FileSegmentStore::new().rename_segment(&from, &to).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
    }

    #[test]
    fn rename_missing_source_fails() {
        let dir = tempdir().unwrap();
        let err = FileSegmentStore::new()
            .rename_segment(&dir.path().join("nope"), &dir.path().join("nope.1"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log.1.zst");
        fs::write(&path, b"x").unwrap();

        let store = FileSegmentStore::new();
        store.remove_segment(&path).unwrap();
        store.remove_segment(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn list_filters_by_name_and_skips_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.log"), b"").unwrap();
        fs::write(dir.path().join("app.log.1.zst"), b"").unwrap();
        fs::write(dir.path().join("app.log.2.zst"), b"").unwrap();
        fs::write(dir.path().join("other.log.1.zst"), b"").unwrap();
        fs::create_dir(dir.path().join("app.log.3.zst")).unwrap();

        let store = FileSegmentStore::new();
        let matches = |name: &str| name.starts_with("app.log.") && name.ends_with(".zst");

        let mut listed = store.list_segments(dir.path(), &matches).unwrap();
        listed.sort();
        assert_eq!(
            listed,
            vec![
                dir.path().join("app.log.1.zst"),
                dir.path().join("app.log.2.zst"),
            ]
        );

        // Restartable
        assert_eq!(store.list_segments(dir.path(), &matches).unwrap().len(), 2);
    }

    #[test]
    fn closed_handle_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        let (_, _) = FileSegmentStore::new().open_active(&path).unwrap();
        let mut segment = FileSegment {
            path: path.clone(),
            file: None,
        };
        assert!(matches!(segment.append(b"x"), Err(StorageError::Closed)));
    }

    #[test]
    fn segment_size_reads_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, vec![0u8; 42]).unwrap();

        assert_eq!(FileSegmentStore::new().segment_size(&path).unwrap(), 42);
    }
}
