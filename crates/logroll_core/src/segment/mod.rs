//! Segments and their on-disk names.
//!
//! A segment is one physical log file. For an active path `<dir>/<name>`:
//!
//! ```text
//! <dir>/<name>                          # active segment
//! <dir>/<name>.<seq>-<millis>           # rotated, waiting to be archived
//! <dir>/<name>.<seq>-<millis>.zst       # archived
//! <dir>/.<name>.<seq>-<millis>.*.partial  # archive being written
//! ```
//!
//! `seq` is a zero-padded rotation sequence that keeps increasing across
//! restarts; `millis` is the UNIX time of the rotation. Segments are ordered
//! by these fields, never by file modification time.

mod naming;
mod state;

pub use naming::{SegmentKind, SegmentName, SegmentNamer, PARTIAL_SUFFIX};
pub use state::{Segment, SegmentState};
