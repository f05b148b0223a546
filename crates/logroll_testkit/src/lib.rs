//! # logroll testkit
//!
//! Test utilities for logroll.
//!
//! This crate provides:
//! - Temporary log directories with helpers to inspect segments
//! - A fault-injecting segment store and a failing archiver
//! - Property-based test generators using proptest
//! - Concurrent write stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use logroll_testkit::prelude::*;
//!
//! #[test]
//! fn rotates() {
//!     let dir = TestLogDir::new();
//!     let writer = dir.open(inline_config(100, 2));
//!     writer.write(&[b'a'; 60]).unwrap();
//!     writer.write(&[b'b'; 60]).unwrap();
//!     assert_eq!(dir.archived_segments().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
