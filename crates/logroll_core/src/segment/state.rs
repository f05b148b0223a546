//! Segment lifecycle.

use crate::error::{LogError, LogResult};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a segment.
///
/// ```text
/// Active -> RotatedPending -> Archived -> Deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentState {
    /// Currently receiving writes.
    Active,
    /// Closed and renamed, not yet archived.
    RotatedPending,
    /// Compressed; the uncompressed form is gone.
    Archived,
    /// Removed by retention.
    Deleted,
}

impl SegmentState {
    /// Returns true if `next` directly follows this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::RotatedPending)
                | (Self::RotatedPending, Self::Archived)
                | (Self::Archived, Self::Deleted)
        )
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::RotatedPending => "rotated-pending",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// One physical log file at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Where the file lives.
    pub path: PathBuf,
    /// Bytes in the file. For the active segment this is the tracked size.
    pub size_bytes: u64,
    /// Lifecycle state.
    pub state: SegmentState,
    /// Rotation sequence; `None` for the active segment.
    pub sequence: Option<u64>,
}

impl Segment {
    /// Creates the active segment for `path`.
    #[must_use]
    pub fn active(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            path,
            size_bytes,
            state: SegmentState::Active,
            sequence: None,
        }
    }

    /// Moves the segment to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `next` does not follow the current state.
    pub fn transition(&mut self, next: SegmentState) -> LogResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(LogError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Returns true while the segment receives writes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SegmentState::Active
    }
}
