//! Rotation decision.

/// Returns true when a write of `incoming_len` bytes must go to a fresh segment.
///
/// Rotation is required iff `current_size + incoming_len > max_size`. A write
/// that alone exceeds `max_size` also returns true; the writer rotates first
/// and lets that single write land in the new segment unsplit.
#[must_use]
pub const fn should_rotate(current_size: u64, incoming_len: u64, max_size: u64) -> bool {
    current_size.saturating_add(incoming_len) > max_size
}

/// Controls when the active segment is rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Maximum segment size in bytes.
    pub max_segment_size: u64,
}

impl RotationPolicy {
    /// Creates a policy rotating at `max_segment_size` bytes.
    #[must_use]
    pub const fn new(max_segment_size: u64) -> Self {
        Self { max_segment_size }
    }

    /// Specifies the maximum segment size.
    #[must_use]
    pub const fn with_max_segment_size(mut self, max_segment_size: u64) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Applies [`should_rotate`] with this policy's limit.
    ///
    /// An empty segment is never rotated: there is nothing to archive, and an
    /// oversized write simply lands in it.
    #[must_use]
    pub const fn should_rotate(&self, current_size: u64, incoming_len: u64) -> bool {
        current_size > 0 && should_rotate(current_size, incoming_len, self.max_segment_size)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}
