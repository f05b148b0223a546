//! Maintenance event feed.
//!
//! Background archive and retention work never fails a `write` call. Its
//! outcome is published here instead:
//!
//! ```rust,ignore
//! let events = writer.subscribe();
//! std::thread::spawn(move || {
//!     while let Ok(event) = events.recv() {
//!         if let MaintenanceEvent::ArchiveFailed { source, error, .. } = event {
//!             eprintln!("could not archive {}: {error}", source.display());
//!         }
//!     }
//! });
//! ```

use crate::error::ArchiveError;
use crate::retention::RemovalReason;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Outcome of one step of background maintenance.
#[derive(Debug, Clone)]
pub enum MaintenanceEvent {
    /// A rotated segment was compressed and its original removed.
    Archived {
        /// Rotation sequence of the segment.
        sequence: u64,
        /// The rotated segment that was archived.
        source: PathBuf,
        /// The resulting archive.
        archived: PathBuf,
        /// Uncompressed size.
        bytes_in: u64,
        /// Compressed size.
        bytes_out: u64,
    },

    /// Archiving failed; the rotated segment was left on disk.
    ArchiveFailed {
        /// Rotation sequence of the segment.
        sequence: u64,
        /// The rotated segment that remains uncompressed.
        source: PathBuf,
        /// What went wrong.
        error: Arc<ArchiveError>,
    },

    /// Retention deleted an archive.
    Removed {
        /// The deleted archive.
        path: PathBuf,
        /// The limit that selected it.
        reason: RemovalReason,
    },

    /// A retention pass failed; surplus archives remain until the next pass.
    RetentionFailed {
        /// What went wrong.
        error: Arc<ArchiveError>,
    },

    /// A segment left pending by an earlier run was queued for archiving.
    Recovered {
        /// The leftover rotated segment.
        path: PathBuf,
    },
}

impl MaintenanceEvent {
    /// Returns the error carried by failure events.
    #[must_use]
    pub fn error(&self) -> Option<&Arc<ArchiveError>> {
        match self {
            Self::ArchiveFailed { error, .. } | Self::RetentionFailed { error } => Some(error),
            _ => None,
        }
    }
}

/// Distributes maintenance events to subscribers and keeps the last failure.
#[derive(Debug, Default)]
pub struct EventFeed {
    subscribers: Mutex<Vec<Sender<MaintenanceEvent>>>,
    last_error: Mutex<Option<Arc<ArchiveError>>>,
}

impl EventFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver for all future events.
    ///
    /// The channel is unbounded: a subscriber that keeps its receiver but
    /// never drains it holds every event for the life of the feed. Drop the
    /// receiver to unsubscribe.
    pub fn subscribe(&self) -> Receiver<MaintenanceEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publishes an event, dropping subscribers that hung up.
    pub fn emit(&self, event: MaintenanceEvent) {
        if let Some(error) = event.error() {
            *self.last_error.lock() = Some(Arc::clone(error));
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the most recent maintenance failure.
    pub fn last_error(&self) -> Option<Arc<ArchiveError>> {
        self.last_error.lock().clone()
    }

    /// Clears and returns the most recent maintenance failure.
    pub fn take_last_error(&self) -> Option<Arc<ArchiveError>> {
        self.last_error.lock().take()
    }

    /// Returns the number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
