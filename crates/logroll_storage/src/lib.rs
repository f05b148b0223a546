//! # logroll storage
//!
//! Filesystem-facing primitives for the logroll rotating writer.
//!
//! This crate is the lowest layer of logroll. A [`SegmentStore`] opens the
//! active segment, renames and removes segment files, and lists the files of
//! a directory that match a caller-supplied name predicate. It has no
//! knowledge of segment naming, archiving or retention.
//!
//! ## Available Stores
//!
//! - [`FileSegmentStore`] - Backed by the OS file API
//!
//! ## Example
//!
//! ```rust
//! use logroll_storage::{FileSegmentStore, SegmentStore};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = FileSegmentStore::new();
//!
//! let (mut file, size) = store.open_active(&dir.path().join("app.log")).unwrap();
//! assert_eq!(size, 0);
//! file.append(b"hello\n").unwrap();
//! store.close_active(file).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::{FileSegment, FileSegmentStore};
pub use store::{SegmentFile, SegmentStore};
