//! Writer statistics.
//!
//! All counters are atomic and can be read while writes are in progress.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a rotating writer.
#[derive(Debug, Default)]
pub struct WriterStats {
    writes: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    failed_rotations: AtomicU64,
    archived: AtomicU64,
    archive_failures: AtomicU64,
    removed: AtomicU64,
    retention_failures: AtomicU64,
}

impl WriterStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_rotation(&self) {
        self.failed_rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_archived(&self) {
        self.archived.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_archive_failure(&self) {
        self.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self, count: u64) {
        self.removed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_retention_failure(&self) {
        self.retention_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            failed_rotations: self.failed_rotations.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
            archive_failures: self.archive_failures.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            retention_failures: self.retention_failures.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of writer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStatsSnapshot {
    /// Successful `write` calls.
    pub writes: u64,
    /// Bytes accepted by `write`.
    pub bytes_written: u64,
    /// Completed rotations.
    pub rotations: u64,
    /// Rotations aborted by an I/O error.
    pub failed_rotations: u64,
    /// Segments archived.
    pub archived: u64,
    /// Archive runs that failed.
    pub archive_failures: u64,
    /// Archives deleted by retention.
    pub removed: u64,
    /// Retention passes that failed.
    pub retention_failures: u64,
}
