//! Rotated and archived segment names.

use crate::error::{LogError, LogResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of archive files that are still being written.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Digits used for the rotation sequence.
const SEQUENCE_WIDTH: usize = 10;

/// The discriminator embedded in a rotated segment's file name.
///
/// Ordering is by sequence, then rotation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentName {
    /// Rotation sequence, strictly increasing per base path.
    pub sequence: u64,
    /// UNIX time of the rotation in milliseconds.
    pub rotated_at_ms: u64,
}

impl SegmentName {
    /// Creates a name from its parts.
    #[must_use]
    pub const fn new(sequence: u64, rotated_at_ms: u64) -> Self {
        Self {
            sequence,
            rotated_at_ms,
        }
    }

    /// Parses `<seq>-<millis>`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (sequence, rotated_at_ms) = s.split_once('-')?;
        Some(Self {
            sequence: parse_digits(sequence)?,
            rotated_at_ms: parse_digits(rotated_at_ms)?,
        })
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}-{}",
            self.sequence,
            self.rotated_at_ms,
            width = SEQUENCE_WIDTH
        )
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Which kind of rotated file a name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Renamed out of the active path, not yet compressed.
    Pending,
    /// Compressed archive.
    Archived,
}

/// Derives segment paths for one active path.
#[derive(Debug, Clone)]
pub struct SegmentNamer {
    active_path: PathBuf,
    dir: PathBuf,
    file_name: String,
    archive_suffix: String,
}

impl SegmentNamer {
    /// Creates a namer for `active_path` with archives ending in `archive_suffix`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the path has no UTF-8 file name or the
    /// suffix does not start with a dot.
    pub fn new(active_path: &Path, archive_suffix: &str) -> LogResult<Self> {
        let file_name = active_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                LogError::invalid_config(format!(
                    "log path has no UTF-8 file name: {}",
                    active_path.display()
                ))
            })?
            .to_string();

        if archive_suffix.len() < 2 || !archive_suffix.starts_with('.') {
            return Err(LogError::invalid_config(format!(
                "archive suffix must look like \".ext\", got {archive_suffix:?}"
            )));
        }

        let dir = match active_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            active_path: active_path.to_path_buf(),
            dir,
            file_name,
            archive_suffix: archive_suffix.to_string(),
        })
    }

    /// Returns the active segment path.
    #[must_use]
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Returns the directory holding all segments.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the active segment's file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the archive suffix, including its dot.
    #[must_use]
    pub fn archive_suffix(&self) -> &str {
        &self.archive_suffix
    }

    /// Returns the path of a rotated, not yet archived segment.
    #[must_use]
    pub fn pending_path(&self, name: SegmentName) -> PathBuf {
        self.dir.join(format!("{}.{}", self.file_name, name))
    }

    /// Returns the path of an archived segment.
    #[must_use]
    pub fn archived_path(&self, name: SegmentName) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", self.file_name, name, self.archive_suffix))
    }

    /// Parses a file name belonging to this base path.
    ///
    /// Returns `None` for the active file, for temp files and for anything
    /// belonging to a different base path.
    #[must_use]
    pub fn parse(&self, file_name: &str) -> Option<(SegmentName, SegmentKind)> {
        let rest = file_name
            .strip_prefix(self.file_name.as_str())?
            .strip_prefix('.')?;

        match rest.strip_suffix(self.archive_suffix.as_str()) {
            Some(body) => SegmentName::parse(body).map(|name| (name, SegmentKind::Archived)),
            None => SegmentName::parse(rest).map(|name| (name, SegmentKind::Pending)),
        }
    }

    /// Parses the file name of `path`.
    #[must_use]
    pub fn parse_path(&self, path: &Path) -> Option<(SegmentName, SegmentKind)> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.parse(name))
    }

    /// Returns true for archived segment names.
    #[must_use]
    pub fn is_archived(&self, file_name: &str) -> bool {
        matches!(self.parse(file_name), Some((_, SegmentKind::Archived)))
    }

    /// Returns true for rotated, not yet archived segment names.
    #[must_use]
    pub fn is_pending(&self, file_name: &str) -> bool {
        matches!(self.parse(file_name), Some((_, SegmentKind::Pending)))
    }

    /// Returns true for rotated segments of either kind.
    #[must_use]
    pub fn is_rotated(&self, file_name: &str) -> bool {
        self.parse(file_name).is_some()
    }

    /// Returns true for leftover in-progress archive files of this base path.
    ///
    /// Temp files are named `.<file_name>.<seq>-<millis>.<token>.partial`;
    /// the embedded segment name must parse so that temp files of another
    /// base path sharing this prefix are left alone.
    #[must_use]
    pub fn is_partial(&self, file_name: &str) -> bool {
        let Some(body) = file_name
            .strip_prefix('.')
            .and_then(|rest| rest.strip_prefix(self.file_name.as_str()))
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.strip_suffix(PARTIAL_SUFFIX))
        else {
            return false;
        };

        body.rsplit_once('.').is_some_and(|(name, token)| {
            !token.is_empty()
                && token.bytes().all(|b| b.is_ascii_alphanumeric())
                && SegmentName::parse(name).is_some()
        })
    }
}
