//! Background archive and retention work.
//!
//! Each rotation produces one [`MaintenanceJob`]. A job archives the rotated
//! segment and then runs a retention pass, so retention always sees the
//! archive its own rotation produced. Jobs run either on a dedicated thread
//! or inline on the writing thread; in both cases failures are reported
//! through the [`EventFeed`] and never propagated to `write`. A panicking
//! archiver is reported as [`ArchiveError::Panicked`] and the queue keeps
//! draining.

use crate::archive::Archiver;
use crate::error::ArchiveError;
use crate::events::{EventFeed, MaintenanceEvent};
use crate::retention::RetentionManager;
use crate::stats::WriterStats;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, warn};

/// Name of the maintenance thread.
const WORKER_THREAD_NAME: &str = "logroll-maintenance";

/// Work queued after a rotation or at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MaintenanceJob {
    /// Archive a rotated segment, then enforce retention.
    Archive {
        /// Rotation sequence of the segment.
        sequence: u64,
        /// Path of the rotated segment.
        source: PathBuf,
    },
    /// Enforce retention only.
    Retain,
}

/// Runs maintenance jobs and publishes their outcome.
#[derive(Debug)]
pub(crate) struct Maintenance {
    archiver: Arc<dyn Archiver>,
    retention: RetentionManager,
    feed: Arc<EventFeed>,
    stats: Arc<WriterStats>,
}

impl Maintenance {
    pub(crate) fn new(
        archiver: Arc<dyn Archiver>,
        retention: RetentionManager,
        feed: Arc<EventFeed>,
        stats: Arc<WriterStats>,
    ) -> Self {
        Self {
            archiver,
            retention,
            feed,
            stats,
        }
    }

    pub(crate) fn run(&self, job: MaintenanceJob) {
        if let MaintenanceJob::Archive { sequence, source } = job {
            self.archive(sequence, &source);
        }
        self.retain();
    }

    fn archive(&self, sequence: u64, source: &Path) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.archiver.archive(source)))
            .unwrap_or_else(|payload| {
                Err(ArchiveError::Panicked {
                    path: source.to_path_buf(),
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok(outcome) => {
                self.stats.record_archived();
                self.feed.emit(MaintenanceEvent::Archived {
                    sequence,
                    source: source.to_path_buf(),
                    archived: outcome.archived,
                    bytes_in: outcome.bytes_in,
                    bytes_out: outcome.bytes_out,
                });
            }
            Err(e) => {
                warn!(
                    source = %source.display(),
                    error = %e,
                    "archiving failed, rotated segment left uncompressed"
                );
                self.stats.record_archive_failure();
                self.feed.emit(MaintenanceEvent::ArchiveFailed {
                    sequence,
                    source: source.to_path_buf(),
                    error: Arc::new(e),
                });
            }
        }
    }

    fn retain(&self) {
        match self.retention.enforce() {
            Ok(removals) => {
                self.stats.record_removed(removals.len() as u64);
                for removal in removals {
                    self.feed.emit(MaintenanceEvent::Removed {
                        path: removal.path,
                        reason: removal.reason,
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "retention pass failed");
                self.stats.record_retention_failure();
                self.feed.emit(MaintenanceEvent::RetentionFailed {
                    error: Arc::new(ArchiveError::from(e)),
                });
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Counts dispatched jobs that have not finished yet.
#[derive(Debug, Default)]
pub(crate) struct PendingJobs {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingJobs {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Blocks until no job is outstanding.
    pub(crate) fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        *self.count.lock()
    }
}

/// Marks a job finished even if it panics.
struct FinishGuard<'a>(&'a PendingJobs);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// The maintenance thread and its queue.
#[derive(Debug)]
pub(crate) struct MaintenanceWorker {
    sender: Option<Sender<MaintenanceJob>>,
    handle: Option<JoinHandle<()>>,
    pending: Arc<PendingJobs>,
    maintenance: Arc<Maintenance>,
}

impl MaintenanceWorker {
    /// Starts the maintenance thread.
    pub(crate) fn spawn(maintenance: Arc<Maintenance>, pending: Arc<PendingJobs>) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<MaintenanceJob>();

        let worker_maintenance = Arc::clone(&maintenance);
        let worker_pending = Arc::clone(&pending);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    let _done = FinishGuard(&worker_pending);
                    let run = AssertUnwindSafe(|| worker_maintenance.run(job));
                    if panic::catch_unwind(run).is_err() {
                        error!("maintenance job panicked");
                    }
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            pending,
            maintenance,
        })
    }

    fn dispatch(&self, job: MaintenanceJob) {
        self.pending.begin();

        let job = match &self.sender {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(mpsc::SendError(job)) => job,
            },
            None => job,
        };

        // The thread is gone; keep archiving on the caller.
        warn!("maintenance thread unavailable, running job inline");
        let _done = FinishGuard(&self.pending);
        self.maintenance.run(job);
    }

    /// Drains queued jobs and joins the thread.
    fn shutdown(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("maintenance thread panicked");
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Routes jobs according to the configured archive mode.
#[derive(Debug)]
pub(crate) enum Dispatcher {
    /// Run on the calling thread.
    Inline(Arc<Maintenance>),
    /// Queue to the maintenance thread.
    Background(MaintenanceWorker),
}

impl Dispatcher {
    pub(crate) fn dispatch(&self, job: MaintenanceJob) {
        match self {
            Self::Inline(maintenance) => maintenance.run(job),
            Self::Background(worker) => worker.dispatch(job),
        }
    }

    /// Waits for queued work and stops the thread, if any.
    pub(crate) fn shutdown(self) {
        if let Self::Background(mut worker) = self {
            worker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZstdArchiver;
    use crate::config::RetentionPolicy;
    use crate::segment::SegmentNamer;
    use logroll_storage::FileSegmentStore;
    use std::fs;
    use tempfile::tempdir;

    fn maintenance(dir: &Path, max_backups: usize) -> (Arc<Maintenance>, Arc<EventFeed>) {
        let namer = SegmentNamer::new(&dir.join("app.log"), ZstdArchiver::SUFFIX).unwrap();
        let retention = RetentionManager::new(
            Arc::new(FileSegmentStore::new()),
            namer,
            RetentionPolicy::new(max_backups),
        );
        let feed = Arc::new(EventFeed::new());
        let maintenance = Maintenance::new(
            Arc::new(ZstdArchiver::default()),
            retention,
            Arc::clone(&feed),
            Arc::new(WriterStats::new()),
        );
        (Arc::new(maintenance), feed)
    }

    #[test]
    fn job_archives_then_retains() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.log.0000000001-1.zst"), b"old").unwrap();
        let source = dir.path().join("app.log.0000000002-2");
        fs::write(&source, b"fresh").unwrap();

        let (maintenance, feed) = maintenance(dir.path(), 1);
        let events = feed.subscribe();

        maintenance.run(MaintenanceJob::Archive {
            sequence: 2,
            source: source.clone(),
        });

        assert!(matches!(
            events.try_recv().unwrap(),
            MaintenanceEvent::Archived { sequence: 2, .. }
        ));
        match events.try_recv().unwrap() {
            MaintenanceEvent::Removed { path, .. } => {
                assert!(path.ends_with("app.log.0000000001-1.zst"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(dir.path().join("app.log.0000000002-2.zst").exists());
        assert!(!source.exists());
    }

    #[test]
    fn archive_failure_is_reported() {
        let dir = tempdir().unwrap();
        let (maintenance, feed) = maintenance(dir.path(), 1);
        let events = feed.subscribe();

        maintenance.run(MaintenanceJob::Archive {
            sequence: 9,
            source: dir.path().join("app.log.0000000009-9"),
        });

        assert!(matches!(
            events.try_recv().unwrap(),
            MaintenanceEvent::ArchiveFailed { sequence: 9, .. }
        ));
        assert!(feed.last_error().is_some());
    }

    #[test]
    fn worker_drains_on_shutdown() {
        let dir = tempdir().unwrap();
        let (maintenance, _feed) = maintenance(dir.path(), 10);
        let pending = Arc::new(PendingJobs::default());
        let dispatcher = Dispatcher::Background(
            MaintenanceWorker::spawn(maintenance, Arc::clone(&pending)).unwrap(),
        );

        for seq in 1..=3u64 {
            let source = dir.path().join(format!("app.log.{seq:010}-{seq}"));
            fs::write(&source, b"payload").unwrap();
            dispatcher.dispatch(MaintenanceJob::Archive {
                sequence: seq,
                source,
            });
        }

        dispatcher.shutdown();
        assert_eq!(pending.outstanding(), 0);
        for seq in 1..=3u64 {
            assert!(dir
                .path()
                .join(format!("app.log.{seq:010}-{seq}.zst"))
                .exists());
        }
    }

    #[derive(Debug, Default)]
    struct PanicOnce {
        panicked: std::sync::atomic::AtomicBool,
        inner: ZstdArchiver,
    }

    impl Archiver for PanicOnce {
        fn suffix(&self) -> &str {
            ZstdArchiver::SUFFIX
        }

        fn archive(&self, source: &Path) -> Result<crate::ArchiveOutcome, ArchiveError> {
            if !self.panicked.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("archiver blew up");
            }
            self.inner.archive(source)
        }
    }

    #[test]
    fn panicking_archiver_does_not_stall_the_queue() {
        let dir = tempdir().unwrap();
        let namer = SegmentNamer::new(&dir.path().join("app.log"), ZstdArchiver::SUFFIX).unwrap();
        let retention = RetentionManager::new(
            Arc::new(FileSegmentStore::new()),
            namer,
            RetentionPolicy::new(10),
        );
        let feed = Arc::new(EventFeed::new());
        let events = feed.subscribe();
        let maintenance = Arc::new(Maintenance::new(
            Arc::new(PanicOnce::default()),
            retention,
            Arc::clone(&feed),
            Arc::new(WriterStats::new()),
        ));
        let pending = Arc::new(PendingJobs::default());
        let worker = MaintenanceWorker::spawn(maintenance, Arc::clone(&pending)).unwrap();

        for seq in 1..=2u64 {
            let source = dir.path().join(format!("app.log.{seq:010}-{seq}"));
            fs::write(&source, b"payload").unwrap();
            worker.dispatch(MaintenanceJob::Archive {
                sequence: seq,
                source,
            });
        }

        pending.wait_idle();
        assert_eq!(pending.outstanding(), 0);
        // First segment stays uncompressed, second one is archived.
        assert!(dir.path().join("app.log.0000000001-1").exists());
        assert!(dir.path().join("app.log.0000000002-2.zst").exists());

        let failed: Vec<_> = events
            .try_iter()
            .filter_map(|event| match event {
                MaintenanceEvent::ArchiveFailed { sequence, error, .. } => Some((sequence, error)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, 1);
        match failed[0].1.as_ref() {
            ArchiveError::Panicked { message, .. } => assert_eq!(message, "archiver blew up"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wait_idle_returns_once_jobs_finish() {
        let dir = tempdir().unwrap();
        let (maintenance, _feed) = maintenance(dir.path(), 10);
        let pending = Arc::new(PendingJobs::default());
        let worker = MaintenanceWorker::spawn(maintenance, Arc::clone(&pending)).unwrap();

        let source = dir.path().join("app.log.0000000001-1");
        fs::write(&source, b"payload").unwrap();
        worker.dispatch(MaintenanceJob::Archive {
            sequence: 1,
            source,
        });

        pending.wait_idle();
        assert_eq!(pending.outstanding(), 0);
        assert!(dir.path().join("app.log.0000000001-1.zst").exists());
    }
}
