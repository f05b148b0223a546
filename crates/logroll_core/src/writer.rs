//! The rotating writer.
//!
//! [`RotatingWriter`] owns the active segment and serializes every write,
//! rotation and close behind one lock. A rotation closes the active file,
//! renames it to a collision-free pending name and reopens the base path
//! before the triggering write proceeds. Archiving and retention are then
//! handed to maintenance, which never fails the write.
//!
//! ## Error state
//!
//! If a rotation or a write fails after the active handle was released, the
//! writer keeps no handle at all. The next call reopens the base path and
//! keeps failing with the storage error until that succeeds. Bytes are never
//! accepted without an open segment.

use crate::archive::{Archiver, ZstdArchiver};
use crate::config::{ArchiveMode, WriterConfig};
use crate::error::{ArchiveError, LogError, LogResult};
use crate::events::{EventFeed, MaintenanceEvent};
use crate::retention::RetentionManager;
use crate::segment::{Segment, SegmentKind, SegmentName, SegmentNamer, SegmentState};
use crate::stats::{WriterStats, WriterStatsSnapshot};
use crate::worker::{Dispatcher, Maintenance, MaintenanceJob, MaintenanceWorker, PendingJobs};
use logroll_storage::{FileSegmentStore, SegmentFile, SegmentStore, StorageError};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Externally visible state of a [`RotatingWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterState {
    /// An active segment is open and accepts writes.
    Open,
    /// A rotation is in progress. Only observable from maintenance run inline.
    Rotating,
    /// The last rotation or write failed; the next call reopens the segment.
    Faulted,
    /// `close` was called. No further operation succeeds.
    Closed,
}

/// The open segment and its tracked size.
struct ActiveSegment {
    file: Box<dyn SegmentFile>,
    segment: Segment,
}

struct WriterInner {
    state: WriterState,
    active: Option<ActiveSegment>,
    next_sequence: u64,
    last_rotated_ms: u64,
    dispatcher: Option<Dispatcher>,
}

impl WriterInner {
    fn check_open(&self) -> LogResult<()> {
        if self.state == WriterState::Closed {
            return Err(LogError::Closed);
        }
        Ok(())
    }

    /// Millisecond timestamp for the next rotation, never going backwards.
    fn next_rotation_ms(&mut self) -> u64 {
        let now = crate::now_ms().max(self.last_rotated_ms);
        self.last_rotated_ms = now;
        now
    }
}

/// A size-bounded log writer that rotates, archives and prunes its segments.
///
/// # Example
///
/// ```rust,no_run
/// use logroll_core::RotatingWriter;
///
/// let writer = RotatingWriter::new("/var/log/app/app.log", 10 * 1024 * 1024, 5)?;
/// writer.write(b"service started\n")?;
/// writer.close()?;
/// # Ok::<(), logroll_core::LogError>(())
/// ```
pub struct RotatingWriter {
    namer: SegmentNamer,
    config: WriterConfig,
    store: Arc<dyn SegmentStore>,
    feed: Arc<EventFeed>,
    stats: Arc<WriterStats>,
    pending: Arc<PendingJobs>,
    inner: Mutex<WriterInner>,
}

impl RotatingWriter {
    /// Opens a writer at `base_path` with default settings besides the size
    /// and backup limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the active file
    /// cannot be opened, for example because its directory does not exist.
    pub fn new(
        base_path: impl AsRef<Path>,
        max_segment_size: u64,
        max_backups: usize,
    ) -> LogResult<Self> {
        Self::open(base_path, WriterConfig::new(max_segment_size, max_backups))
    }

    /// Opens a writer on the local filesystem with zstd archiving.
    ///
    /// # Errors
    ///
    /// See [`RotatingWriter::new`].
    pub fn open(base_path: impl AsRef<Path>, config: WriterConfig) -> LogResult<Self> {
        let archiver = Arc::new(ZstdArchiver::new(config.compression_level));
        Self::open_with(base_path, config, Arc::new(FileSegmentStore::new()), archiver)
    }

    /// Opens a writer over an explicit store and archiver.
    ///
    /// On startup the rotation sequence resumes after the highest one found
    /// on disk, stale temp files from interrupted archive runs are removed and
    /// rotated segments that were never archived are queued for archiving.
    ///
    /// # Errors
    ///
    /// See [`RotatingWriter::new`]. Listing the directory may also fail.
    #[tracing::instrument(skip_all, fields(path = %base_path.as_ref().display()))]
    pub fn open_with(
        base_path: impl AsRef<Path>,
        config: WriterConfig,
        store: Arc<dyn SegmentStore>,
        archiver: Arc<dyn Archiver>,
    ) -> LogResult<Self> {
        config.validate()?;
        let namer = SegmentNamer::new(base_path.as_ref(), archiver.suffix())?;

        let (file, size) = store.open_active(namer.active_path())?;
        let active = ActiveSegment {
            file,
            segment: Segment::active(namer.active_path().to_path_buf(), size),
        };

        let scan = scan_directory(store.as_ref(), &namer)?;

        let feed = Arc::new(EventFeed::new());
        let stats = Arc::new(WriterStats::new());
        let pending = Arc::new(PendingJobs::default());
        let retention = RetentionManager::new(Arc::clone(&store), namer.clone(), config.retention);
        let maintenance = Arc::new(Maintenance::new(
            archiver,
            retention,
            Arc::clone(&feed),
            Arc::clone(&stats),
        ));
        let dispatcher = match config.archive_mode {
            ArchiveMode::Inline => Dispatcher::Inline(maintenance),
            ArchiveMode::Background => Dispatcher::Background(
                MaintenanceWorker::spawn(maintenance, Arc::clone(&pending))
                    .map_err(|e| StorageError::io("spawn maintenance thread", namer.dir(), e))?,
            ),
        };

        for (name, path) in &scan.leftovers {
            info!(path = %path.display(), "queueing unarchived segment from previous run");
            feed.emit(MaintenanceEvent::Recovered { path: path.clone() });
            dispatcher.dispatch(MaintenanceJob::Archive {
                sequence: name.sequence,
                source: path.clone(),
            });
        }
        if scan.leftovers.is_empty() {
            dispatcher.dispatch(MaintenanceJob::Retain);
        }

        info!(
            size,
            next_sequence = scan.next_sequence,
            max_segment_size = config.rotation.max_segment_size,
            max_backups = config.retention.max_backups,
            "opened rotating writer"
        );

        Ok(Self {
            namer,
            config,
            store,
            feed,
            stats,
            pending,
            inner: Mutex::new(WriterInner {
                state: WriterState::Open,
                active: Some(active),
                next_sequence: scan.next_sequence,
                last_rotated_ms: scan.last_rotated_ms,
                dispatcher: Some(dispatcher),
            }),
        })
    }

    /// Appends `data` to the active segment, rotating first if it would
    /// push the segment past the size limit.
    ///
    /// The whole call, including a rotation it triggers, holds the writer
    /// lock. Archiving and retention run afterwards and never fail the write.
    /// A single write larger than the limit lands whole in a fresh segment.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after [`RotatingWriter::close`] and `Storage` if the
    /// rotation or the write itself fails.
    pub fn write(&self, data: &[u8]) -> LogResult<usize> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        if data.is_empty() {
            return Ok(0);
        }

        let incoming = data.len() as u64;
        let current = self.ensure_active(&mut inner)?.segment.size_bytes;
        if self.config.rotation.should_rotate(current, incoming) {
            self.rotate_locked(&mut inner)?;
        }

        let active = self.ensure_active(&mut inner)?;
        if let Err(e) = active.file.append(data) {
            error!(error = %e, "write failed, dropping active segment");
            self.abandon_active(&mut inner);
            return Err(e.into());
        }
        active.segment.size_bytes += incoming;
        self.stats.record_write(incoming);

        Ok(data.len())
    }

    /// Rotates the active segment now, regardless of its size.
    ///
    /// Returns `false` without rotating when the active segment is empty.
    ///
    /// # Errors
    ///
    /// Same as [`RotatingWriter::write`].
    pub fn rotate(&self) -> LogResult<bool> {
        let mut inner = self.inner.lock();
        inner.check_open()?;

        if self.ensure_active(&mut inner)?.segment.size_bytes == 0 {
            return Ok(false);
        }
        self.rotate_locked(&mut inner)?;
        Ok(true)
    }

    /// Flushes buffered bytes of the active segment.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or the storage error.
    pub fn flush(&self) -> LogResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        self.ensure_active(&mut inner)?.file.flush()?;
        Ok(())
    }

    /// Syncs the active segment to stable storage.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or the storage error.
    pub fn sync(&self) -> LogResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        self.ensure_active(&mut inner)?.file.sync()?;
        Ok(())
    }

    /// Closes the active segment and stops maintenance.
    ///
    /// Queued archive and retention work is drained before this returns.
    /// The writer is closed afterwards even if releasing the handle failed.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if already closed, or the error from closing the
    /// active segment.
    pub fn close(&self) -> LogResult<()> {
        let (result, dispatcher) = {
            let mut inner = self.inner.lock();
            inner.check_open()?;
            inner.state = WriterState::Closed;

            let result = match inner.active.take() {
                Some(active) => self.store.close_active(active.file),
                None => Ok(()),
            };
            (result, inner.dispatcher.take())
        };

        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown();
        }

        match &result {
            Ok(()) => info!(path = %self.namer.active_path().display(), "closed rotating writer"),
            Err(e) => warn!(error = %e, "closing active segment failed"),
        }
        result.map_err(LogError::from)
    }

    /// Returns the tracked size of the active segment, 0 while faulted.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.inner
            .lock()
            .active
            .as_ref()
            .map_or(0, |active| active.segment.size_bytes)
    }

    /// Returns the base path writes go to.
    #[must_use]
    pub fn active_path(&self) -> &Path {
        self.namer.active_path()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.inner.lock().state
    }

    /// Returns true once [`RotatingWriter::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == WriterState::Closed
    }

    /// Returns the configuration in effect.
    #[must_use]
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Returns the segment naming scheme.
    #[must_use]
    pub fn namer(&self) -> &SegmentNamer {
        &self.namer
    }

    /// Returns a snapshot of the writer counters.
    #[must_use]
    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Subscribes to maintenance events emitted from now on.
    ///
    /// Events queue without bound until received; drop the receiver once
    /// it is no longer drained.
    pub fn subscribe(&self) -> Receiver<MaintenanceEvent> {
        self.feed.subscribe()
    }

    /// Returns the most recent archive or retention failure.
    #[must_use]
    pub fn last_maintenance_error(&self) -> Option<Arc<ArchiveError>> {
        self.feed.last_error()
    }

    /// Blocks until all dispatched archive and retention work has finished.
    pub fn wait_for_maintenance(&self) {
        self.pending.wait_idle();
    }

    /// Lists every segment of this base path, oldest rotated first and the
    /// active segment last.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn segments(&self) -> LogResult<Vec<Segment>> {
        let namer = &self.namer;
        let paths = self
            .store
            .list_segments(namer.dir(), &|name| namer.is_rotated(name))?;

        let mut rotated = Vec::with_capacity(paths.len() + 1);
        for path in paths {
            let Some((name, kind)) = namer.parse_path(&path) else {
                continue;
            };
            let size_bytes = match self.store.segment_size(&path) {
                Ok(size) => size,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            let state = match kind {
                SegmentKind::Pending => SegmentState::RotatedPending,
                SegmentKind::Archived => SegmentState::Archived,
            };
            rotated.push((
                name,
                Segment {
                    path,
                    size_bytes,
                    state,
                    sequence: Some(name.sequence),
                },
            ));
        }
        rotated.sort_by_key(|(name, _)| *name);

        let mut segments: Vec<_> = rotated.into_iter().map(|(_, segment)| segment).collect();
        if let Some(active) = &self.inner.lock().active {
            segments.push(active.segment.clone());
        }
        Ok(segments)
    }

    /// Returns the active segment, reopening the base path if the writer
    /// lost its handle to an earlier failure.
    fn ensure_active<'a>(&self, inner: &'a mut WriterInner) -> LogResult<&'a mut ActiveSegment> {
        let active = match inner.active.take() {
            Some(active) => active,
            None => {
                let path = self.namer.active_path();
                let (file, size) = self.store.open_active(path)?;
                info!(path = %path.display(), size, "reopened active segment");
                ActiveSegment {
                    file,
                    segment: Segment::active(path.to_path_buf(), size),
                }
            }
        };
        inner.state = WriterState::Open;
        Ok(inner.active.insert(active))
    }

    fn abandon_active(&self, inner: &mut WriterInner) {
        if let Some(active) = inner.active.take() {
            if let Err(e) = self.store.close_active(active.file) {
                debug!(error = %e, "releasing failed segment");
            }
        }
        inner.state = WriterState::Faulted;
    }

    #[tracing::instrument(skip_all, fields(sequence = inner.next_sequence))]
    fn rotate_locked(&self, inner: &mut WriterInner) -> LogResult<()> {
        let Some(active) = inner.active.take() else {
            return Ok(());
        };
        inner.state = WriterState::Rotating;

        match self.rotate_out(inner, active) {
            Ok(()) => {
                inner.state = WriterState::Open;
                self.stats.record_rotation();
                Ok(())
            }
            Err(e) => {
                inner.state = WriterState::Faulted;
                self.stats.record_failed_rotation();
                error!(error = %e, "rotation failed");
                Err(e)
            }
        }
    }

    /// Close, rename, reopen, then dispatch maintenance.
    fn rotate_out(&self, inner: &mut WriterInner, mut active: ActiveSegment) -> LogResult<()> {
        if self.config.sync_on_rotate {
            active.file.sync()?;
        }
        self.store.close_active(active.file)?;
        let mut segment = active.segment;

        let name = SegmentName::new(inner.next_sequence, inner.next_rotation_ms());
        let pending = self.namer.pending_path(name);
        self.store.rename_segment(self.namer.active_path(), &pending)?;
        inner.next_sequence = inner.next_sequence.saturating_add(1);

        segment.transition(SegmentState::RotatedPending)?;
        segment.path = pending;
        segment.sequence = Some(name.sequence);
        info!(
            pending = %segment.path.display(),
            size = segment.size_bytes,
            "rotated segment"
        );

        let reopened = self.store.open_active(self.namer.active_path());
        let job = MaintenanceJob::Archive {
            sequence: name.sequence,
            source: segment.path,
        };

        match reopened {
            Ok((file, size)) => {
                inner.active = Some(ActiveSegment {
                    file,
                    segment: Segment::active(self.namer.active_path().to_path_buf(), size),
                });
                self.dispatch(inner, job);
                Ok(())
            }
            Err(e) => {
                // The rotated segment is complete; archive it anyway.
                self.dispatch(inner, job);
                Err(e.into())
            }
        }
    }

    fn dispatch(&self, inner: &WriterInner, job: MaintenanceJob) {
        if let Some(dispatcher) = &inner.dispatcher {
            dispatcher.dispatch(job);
        }
    }
}

/// What a startup scan of the segment directory found.
struct DirectoryScan {
    next_sequence: u64,
    last_rotated_ms: u64,
    leftovers: Vec<(SegmentName, PathBuf)>,
}

fn scan_directory(store: &dyn SegmentStore, namer: &SegmentNamer) -> LogResult<DirectoryScan> {
    let paths = store.list_segments(namer.dir(), &|name| {
        namer.is_rotated(name) || namer.is_partial(name)
    })?;

    let mut scan = DirectoryScan {
        next_sequence: 1,
        last_rotated_ms: 0,
        leftovers: Vec::new(),
    };

    for path in paths {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if namer.is_partial(file_name) {
            warn!(path = %path.display(), "removing temp file of interrupted archive");
            if let Err(e) = store.remove_segment(&path) {
                warn!(path = %path.display(), error = %e, "could not remove temp file");
            }
            continue;
        }

        if let Some((name, kind)) = namer.parse(file_name) {
            scan.next_sequence = scan.next_sequence.max(name.sequence.saturating_add(1));
            scan.last_rotated_ms = scan.last_rotated_ms.max(name.rotated_at_ms);
            if kind == SegmentKind::Pending {
                scan.leftovers.push((name, path));
            }
        }
    }

    scan.leftovers.sort();
    Ok(scan)
}

impl fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.namer.active_path())
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending_jobs", &self.pending.outstanding())
            .finish_non_exhaustive()
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(active) = inner.active.take() {
            if let Err(e) = self.store.close_active(active.file) {
                warn!(error = %e, "closing active segment on drop failed");
            }
        }
        if let Some(dispatcher) = inner.dispatcher.take() {
            dispatcher.shutdown();
        }
    }
}

impl io::Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::from)
    }
}

impl io::Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::from)
    }
}

/// A cloneable handle to a [`RotatingWriter`].
///
/// With the `tracing-subscriber` feature it plugs straight into
/// `tracing_subscriber::fmt().with_writer(..)`.
#[derive(Debug, Clone)]
pub struct SharedWriter {
    inner: Arc<RotatingWriter>,
}

impl SharedWriter {
    /// Wraps `writer` for sharing.
    #[must_use]
    pub fn new(writer: RotatingWriter) -> Self {
        Self {
            inner: Arc::new(writer),
        }
    }

    /// Returns the shared writer.
    #[must_use]
    pub fn writer(&self) -> &RotatingWriter {
        &self.inner
    }
}

impl From<Arc<RotatingWriter>> for SharedWriter {
    fn from(inner: Arc<RotatingWriter>) -> Self {
        Self { inner }
    }
}

impl std::ops::Deref for SharedWriter {
    type Target = RotatingWriter;

    fn deref(&self) -> &RotatingWriter {
        &self.inner
    }
}

impl io::Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(io::Error::from)
    }
}

/// Events from logroll itself go to stderr. Rotation logs while holding the
/// writer lock, so writing them back into the writer would deadlock.
#[cfg(feature = "tracing-subscriber")]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedWriter {
    type Writer = tracing_subscriber::fmt::writer::EitherWriter<&'a RotatingWriter, io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        tracing_subscriber::fmt::writer::EitherWriter::A(&*self.inner)
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        if meta.target().starts_with("logroll_") {
            tracing_subscriber::fmt::writer::EitherWriter::B(io::stderr())
        } else {
            self.make_writer()
        }
    }
}
