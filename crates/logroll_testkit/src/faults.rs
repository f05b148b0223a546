//! Fault injection.
//!
//! [`FaultyStore`] wraps the real filesystem store and fails chosen
//! operations on demand. [`FailingArchiver`] wraps the zstd archiver and
//! fails every run while armed, leaving the source untouched.

use logroll_core::{ArchiveError, ArchiveOutcome, Archiver, ZstdArchiver};
use logroll_storage::{
    FileSegmentStore, SegmentFile, SegmentStore, StorageError, StorageResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `open_active`
    Open,
    /// `close_active`
    Close,
    /// `rename_segment`
    Rename,
    /// `remove_segment`
    Remove,
    /// `list_segments`
    List,
    /// `SegmentFile::append`
    Append,
    /// `SegmentFile::sync`
    Sync,
}

impl FailPoint {
    fn op(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Rename => "rename",
            Self::Remove => "remove",
            Self::List => "list",
            Self::Append => "append",
            Self::Sync => "sync",
        }
    }
}

/// Shared switchboard of armed fail points.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    armed: Arc<Mutex<HashMap<FailPoint, usize>>>,
    injected: Arc<Mutex<HashMap<FailPoint, usize>>>,
}

impl FaultInjector {
    /// Creates an injector with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` calls of `point`.
    pub fn fail_next(&self, point: FailPoint, times: usize) {
        let mut armed = self.armed.lock();
        if times == 0 {
            armed.remove(&point);
        } else {
            armed.insert(point, times);
        }
    }

    /// Fails every call of `point` until cleared.
    pub fn fail_always(&self, point: FailPoint) {
        self.fail_next(point, usize::MAX);
    }

    /// Disarms `point`.
    pub fn clear(&self, point: FailPoint) {
        self.armed.lock().remove(&point);
    }

    /// Disarms every fail point.
    pub fn clear_all(&self) {
        self.armed.lock().clear();
    }

    /// Returns how many faults were injected at `point`.
    pub fn injected(&self, point: FailPoint) -> usize {
        self.injected.lock().get(&point).copied().unwrap_or(0)
    }

    fn check(&self, point: FailPoint, path: &Path) -> StorageResult<()> {
        let mut armed = self.armed.lock();
        let Some(remaining) = armed.get_mut(&point) else {
            return Ok(());
        };

        if *remaining != usize::MAX {
            *remaining -= 1;
        }
        if *remaining == 0 {
            armed.remove(&point);
        }
        drop(armed);

        *self.injected.lock().entry(point).or_insert(0) += 1;
        Err(StorageError::io(
            point.op(),
            path,
            io::Error::other(format!("injected {} failure", point.op())),
        ))
    }
}

/// A [`SegmentStore`] over the real filesystem with injectable failures.
#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    inner: FileSegmentStore,
    faults: FaultInjector,
}

impl FaultyStore {
    /// Creates a store with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the injector controlling this store.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }
}

impl SegmentStore for FaultyStore {
    fn open_active(&self, path: &Path) -> StorageResult<(Box<dyn SegmentFile>, u64)> {
        self.faults.check(FailPoint::Open, path)?;
        let (file, size) = self.inner.open_active(path)?;
        let file = FaultySegment {
            inner: file,
            faults: self.faults.clone(),
        };
        Ok((Box::new(file), size))
    }

    fn close_active(&self, file: Box<dyn SegmentFile>) -> StorageResult<()> {
        let path = file.path().to_path_buf();
        // The handle is released even when the close fails.
        let result = self.inner.close_active(file);
        self.faults.check(FailPoint::Close, &path)?;
        result
    }

    fn rename_segment(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.faults.check(FailPoint::Rename, from)?;
        self.inner.rename_segment(from, to)
    }

    fn remove_segment(&self, path: &Path) -> StorageResult<()> {
        self.faults.check(FailPoint::Remove, path)?;
        self.inner.remove_segment(path)
    }

    fn list_segments(
        &self,
        dir: &Path,
        matches: &dyn Fn(&str) -> bool,
    ) -> StorageResult<Vec<PathBuf>> {
        self.faults.check(FailPoint::List, dir)?;
        self.inner.list_segments(dir, matches)
    }

    fn segment_size(&self, path: &Path) -> StorageResult<u64> {
        self.inner.segment_size(path)
    }
}

/// Segment handle handed out by [`FaultyStore`].
#[derive(Debug)]
struct FaultySegment {
    inner: Box<dyn SegmentFile>,
    faults: FaultInjector,
}

impl SegmentFile for FaultySegment {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.faults.check(FailPoint::Append, self.inner.path())?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.faults.check(FailPoint::Sync, self.inner.path())?;
        self.inner.sync()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }
}

/// An archiver that fails while armed and otherwise compresses with zstd.
#[derive(Debug)]
pub struct FailingArchiver {
    inner: ZstdArchiver,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FailingArchiver {
    /// Creates an archiver that fails every run.
    pub fn new() -> Self {
        Self {
            inner: ZstdArchiver::default(),
            failing: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Arms or disarms the failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns how many archive runs were attempted.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FailingArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for FailingArchiver {
    fn suffix(&self) -> &str {
        self.inner.suffix()
    }

    fn archive(&self, source: &Path) -> Result<ArchiveOutcome, ArchiveError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ArchiveError::compression(source, "injected compression failure"));
        }
        self.inner.archive(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fail_next_fires_exactly_n_times() {
        let dir = tempdir().unwrap();
        let store = FaultyStore::new();
        store.faults().fail_next(FailPoint::Open, 2);

        let path = dir.path().join("app.log");
        assert!(store.open_active(&path).is_err());
        assert!(store.open_active(&path).is_err());
        assert!(store.open_active(&path).is_ok());
        assert_eq!(store.faults().injected(FailPoint::Open), 2);
    }

    #[test]
    fn append_faults_reach_handles() {
        let dir = tempdir().unwrap();
        let store = FaultyStore::new();
        let (mut file, _) = store.open_active(&dir.path().join("app.log")).unwrap();

        store.faults().fail_always(FailPoint::Append);
        assert!(file.append(b"x").is_err());
        assert!(file.append(b"x").is_err());

        store.faults().clear_all();
        file.append(b"x").unwrap();
    }

    #[test]
    fn failing_archiver_keeps_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.log.0000000001-1");
        std::fs::write(&source, b"data").unwrap();

        let archiver = FailingArchiver::new();
        assert!(archiver.archive(&source).is_err());
        assert_eq!(std::fs::read(&source).unwrap(), b"data");

        archiver.set_failing(false);
        archiver.archive(&source).unwrap();
        assert!(!source.exists());
        assert_eq!(archiver.attempts(), 2);
    }
}
