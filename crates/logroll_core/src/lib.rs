//! # logroll core
//!
//! A size-bounded rotating log writer.
//!
//! This crate provides:
//! - [`RotatingWriter`], which serializes writes and rotates the active
//!   segment before it would exceed its size limit
//! - Collision-free names for rotated segments that survive restarts
//! - zstd archiving of rotated segments, off the write path
//! - Retention by backup count, total size and age
//! - A maintenance event feed for archive and retention failures
//!
//! ## Example
//!
//! ```rust
//! use logroll_core::{ArchiveMode, RotatingWriter, WriterConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = WriterConfig::new(100, 2).archive_mode(ArchiveMode::Inline);
//! let writer = RotatingWriter::open(dir.path().join("app.log"), config).unwrap();
//!
//! writer.write(&[b'a'; 60]).unwrap();
//! writer.write(&[b'b'; 60]).unwrap(); // rotates first
//! assert_eq!(writer.current_size(), 60);
//!
//! writer.close().unwrap();
//! assert!(writer.close().unwrap_err().is_closed());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod config;
mod error;
mod events;
mod policy;
mod retention;
mod segment;
mod stats;
mod worker;
mod writer;

pub use archive::{archived_path, ArchiveOutcome, Archiver, ZstdArchiver};
pub use config::{ArchiveMode, RetentionPolicy, WriterConfig};
pub use error::{ArchiveError, LogError, LogResult};
pub use events::{EventFeed, MaintenanceEvent};
pub use policy::{should_rotate, RotationPolicy};
pub use retention::{plan as plan_retention, ArchivedSegment, Removal, RemovalReason, RetentionManager};
pub use segment::{Segment, SegmentKind, SegmentName, SegmentNamer, SegmentState, PARTIAL_SUFFIX};
pub use stats::{WriterStats, WriterStatsSnapshot};
pub use writer::{RotatingWriter, SharedWriter, WriterState};

pub use logroll_storage::{FileSegmentStore, SegmentFile, SegmentStore, StorageError, StorageResult};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current UNIX time in milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
