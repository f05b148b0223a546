//! Archiving of rotated segments.
//!
//! An [`Archiver`] turns a rotated, closed segment into a compressed artifact
//! next to it and removes the uncompressed original.
//!
//! ## Invariants
//!
//! - On failure the source file is left untouched
//! - A run that fails before `persist` leaves no file at the archived path
//! - The archived name only appears once its content is complete and synced
//! - If removing the source fails after `persist`, both the source and a
//!   complete archive remain and the run reports an error; the next startup
//!   archives the source again over the existing archive

use crate::error::ArchiveError;
use crate::segment::PARTIAL_SUFFIX;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zstd::stream::write::Encoder as ZstdEncoder;

/// What an archive run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// Path of the compressed artifact.
    pub archived: PathBuf,
    /// Uncompressed bytes read from the source.
    pub bytes_in: u64,
    /// Bytes written to the archive.
    pub bytes_out: u64,
}

/// Compresses a rotated segment.
pub trait Archiver: Send + Sync + fmt::Debug {
    /// Suffix appended to the source path to form the archived path.
    fn suffix(&self) -> &str;

    /// Archives `source` to `source` + [`Archiver::suffix`] and removes `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, compressing or persisting fails. The
    /// source must then still exist unchanged.
    fn archive(&self, source: &Path) -> Result<ArchiveOutcome, ArchiveError>;
}

/// Returns `source` with `suffix` appended to its file name.
#[must_use]
pub fn archived_path(source: &Path, suffix: &str) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Archiver producing zstd frames with a content checksum.
#[derive(Debug, Clone)]
pub struct ZstdArchiver {
    level: i32,
}

impl ZstdArchiver {
    /// File suffix of zstd archives.
    pub const SUFFIX: &'static str = ".zst";

    /// Creates an archiver compressing at `level`.
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// Returns the compression level.
    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }

    fn compress_to(&self, source: &Path, file: &File) -> Result<u64, ArchiveError> {
        let mut input = File::open(source).map_err(|e| ArchiveError::io(source, e))?;

        let mut encoder = ZstdEncoder::new(file, self.level)
            .map_err(|e| ArchiveError::compression(source, e))?;
        encoder
            .include_checksum(true)
            .map_err(|e| ArchiveError::compression(source, e))?;

        let bytes_in = io::copy(&mut input, &mut encoder).map_err(|e| ArchiveError::io(source, e))?;
        encoder
            .finish()
            .map_err(|e| ArchiveError::compression(source, e))?;

        Ok(bytes_in)
    }
}

impl Default for ZstdArchiver {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Archiver for ZstdArchiver {
    fn suffix(&self) -> &str {
        Self::SUFFIX
    }

    #[tracing::instrument(skip(self), fields(level = self.level))]
    fn archive(&self, source: &Path) -> Result<ArchiveOutcome, ArchiveError> {
        let source_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ArchiveError::NotPending {
                path: source.to_path_buf(),
            })?;
        let dir = match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let archived = archived_path(source, self.suffix());

        // The temp file is deleted on drop unless persisted.
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{source_name}."))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| ArchiveError::io(dir, e))?;

        let bytes_in = self.compress_to(source, temp.as_file())?;

        temp.as_file()
            .sync_all()
            .map_err(|e| ArchiveError::io(temp.path(), e))?;
        let bytes_out = temp
            .as_file()
            .metadata()
            .map_err(|e| ArchiveError::io(temp.path(), e))?
            .len();

        temp.persist(&archived)
            .map_err(|e| ArchiveError::io(&archived, e.error))?;
        debug!(archived = %archived.display(), "persisted archive");

        fs::remove_file(source).map_err(|e| ArchiveError::io(source, e))?;

        info!(
            source = %source.display(),
            archived = %archived.display(),
            bytes_in,
            bytes_out,
            "archived segment"
        );

        Ok(ArchiveOutcome {
            archived,
            bytes_in,
            bytes_out,
        })
    }
}
