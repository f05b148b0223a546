//! Writer configuration.

use crate::error::{LogError, LogResult};
use crate::policy::RotationPolicy;
use std::time::Duration;

/// Controls which archived segments are deleted.
///
/// The count bound is always enforced. Removal starts with the oldest
/// archive; the optional limits are applied after the count bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of archived segments to keep.
    pub max_backups: usize,
    /// Maximum total size of archived segments (in bytes).
    pub max_total_size: Option<u64>,
    /// Maximum age of archived segments, measured from rotation time.
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    /// Keeps at most `max_backups` archives.
    #[must_use]
    pub const fn new(max_backups: usize) -> Self {
        Self {
            max_backups,
            max_total_size: None,
            max_age: None,
        }
    }

    /// Specifies the maximum number of archives.
    #[must_use]
    pub const fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Specifies the maximum total size of archives.
    #[must_use]
    pub const fn with_max_total_size(mut self, max_total_size: u64) -> Self {
        self.max_total_size = Some(max_total_size);
        self
    }

    /// Specifies the maximum age of archives.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(7)
    }
}

/// Where archive and retention work runs after a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// On the writer's maintenance thread; `write` never waits for it.
    #[default]
    Background,
    /// On the writing thread, after the new active segment is open.
    Inline,
}

/// Configuration for a rotating writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// When to rotate the active segment.
    pub rotation: RotationPolicy,

    /// Which archives to keep.
    pub retention: RetentionPolicy,

    /// Where archiving runs.
    pub archive_mode: ArchiveMode,

    /// zstd compression level for archives.
    pub compression_level: i32,

    /// Whether to fsync a segment before it is rotated out.
    pub sync_on_rotate: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            rotation: RotationPolicy::default(),
            retention: RetentionPolicy::default(),
            archive_mode: ArchiveMode::Background,
            compression_level: 3,
            sync_on_rotate: true,
        }
    }
}

impl WriterConfig {
    /// Creates a configuration with the given size and backup bounds.
    #[must_use]
    pub fn new(max_segment_size: u64, max_backups: usize) -> Self {
        Self {
            rotation: RotationPolicy::new(max_segment_size),
            retention: RetentionPolicy::new(max_backups),
            ..Self::default()
        }
    }

    /// Sets the rotation policy.
    #[must_use]
    pub const fn rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = policy;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub const fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = policy;
        self
    }

    /// Sets where archiving runs.
    #[must_use]
    pub const fn archive_mode(mut self, mode: ArchiveMode) -> Self {
        self.archive_mode = mode;
        self
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets whether to fsync before rotating.
    #[must_use]
    pub const fn sync_on_rotate(mut self, value: bool) -> Self {
        self.sync_on_rotate = value;
        self
    }

    /// Checks the configuration for values the writer cannot honor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the segment size is zero or the compression
    /// level is outside zstd's range.
    pub fn validate(&self) -> LogResult<()> {
        if self.rotation.max_segment_size == 0 {
            return Err(LogError::invalid_config("max_segment_size must be non-zero"));
        }

        let levels = zstd::compression_level_range();
        if !levels.contains(&self.compression_level) {
            return Err(LogError::invalid_config(format!(
                "compression level {} outside {}..={}",
                self.compression_level,
                levels.start(),
                levels.end()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = WriterConfig::default();
        assert_eq!(config.archive_mode, ArchiveMode::Background);
        assert!(config.sync_on_rotate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = WriterConfig::new(1024, 3)
            .archive_mode(ArchiveMode::Inline)
            .sync_on_rotate(false)
            .retention(
                RetentionPolicy::new(2)
                    .with_max_total_size(4096)
                    .with_max_age(Duration::from_secs(60)),
            );

        assert_eq!(config.rotation.max_segment_size, 1024);
        assert_eq!(config.retention.max_backups, 2);
        assert_eq!(config.retention.max_total_size, Some(4096));
        assert_eq!(config.retention.max_age, Some(Duration::from_secs(60)));
        assert_eq!(config.archive_mode, ArchiveMode::Inline);
        assert!(!config.sync_on_rotate);
    }

    #[test]
    fn zero_segment_size_is_rejected() {
        let err = WriterConfig::new(0, 1).validate().unwrap_err();
        assert!(matches!(err, LogError::InvalidConfig { .. }));
    }

    #[test]
    fn zero_backups_is_allowed() {
        assert!(WriterConfig::new(100, 0).validate().is_ok());
    }

    #[test]
    fn bad_compression_level_is_rejected() {
        let err = WriterConfig::new(100, 1)
            .compression_level(1000)
            .validate()
            .unwrap_err();
        assert!(matches!(err, LogError::InvalidConfig { .. }));
    }
}
