//! Test fixtures and log directory helpers.
//!
//! A [`TestLogDir`] owns a temporary directory holding one base path and
//! knows how to find, read and decompress every segment derived from it.

use logroll_core::{
    ArchiveMode, RotatingWriter, SegmentKind, SegmentNamer, WriterConfig, ZstdArchiver,
};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Default base file name used by fixtures.
pub const DEFAULT_LOG_NAME: &str = "app.log";

/// A temporary log directory with automatic cleanup.
pub struct TestLogDir {
    dir: TempDir,
    namer: SegmentNamer,
}

impl TestLogDir {
    /// Creates a directory for `app.log`.
    pub fn new() -> Self {
        Self::with_name(DEFAULT_LOG_NAME)
    }

    /// Creates a directory for a base file called `name`.
    pub fn with_name(name: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let namer = SegmentNamer::new(&dir.path().join(name), ZstdArchiver::SUFFIX)
            .expect("Invalid log name");
        Self { dir, namer }
    }

    /// Returns the directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the active log path.
    pub fn base_path(&self) -> PathBuf {
        self.namer.active_path().to_path_buf()
    }

    /// Returns the naming scheme of this directory.
    pub fn namer(&self) -> &SegmentNamer {
        &self.namer
    }

    /// Opens a writer on the base path.
    pub fn open(&self, config: WriterConfig) -> RotatingWriter {
        RotatingWriter::open(self.base_path(), config).expect("Failed to open writer")
    }

    /// Returns the bytes of the active segment, empty if it does not exist.
    pub fn active_contents(&self) -> Vec<u8> {
        fs::read(self.base_path()).unwrap_or_default()
    }

    /// Returns every file name in the directory, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path())
            .expect("Failed to list directory")
            .map(|entry| {
                entry
                    .expect("Failed to read entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }

    /// Rotated segments not yet archived, oldest first.
    pub fn pending_segments(&self) -> Vec<PathBuf> {
        self.rotated(SegmentKind::Pending)
    }

    /// Archived segments, oldest first.
    pub fn archived_segments(&self) -> Vec<PathBuf> {
        self.rotated(SegmentKind::Archived)
    }

    /// Temp files left by interrupted archive runs.
    pub fn partial_files(&self) -> Vec<PathBuf> {
        self.file_names()
            .into_iter()
            .filter(|name| self.namer.is_partial(name))
            .map(|name| self.path().join(name))
            .collect()
    }

    /// Returns the full byte stream: every rotated segment in sequence
    /// order, decompressing archives, followed by the active segment.
    pub fn read_stream(&self) -> Vec<u8> {
        let mut rotated: Vec<_> = self
            .file_names()
            .into_iter()
            .filter_map(|name| self.namer.parse(&name).map(|(n, kind)| (n, kind, name)))
            .collect();
        rotated.sort_by_key(|(name, _, _)| *name);

        let mut stream = Vec::new();
        for (_, kind, file_name) in rotated {
            let path = self.path().join(file_name);
            match kind {
                SegmentKind::Pending => {
                    stream.extend(fs::read(&path).expect("Failed to read segment"));
                }
                SegmentKind::Archived => stream.extend(decompress(&path)),
            }
        }
        stream.extend(self.active_contents());
        stream
    }

    fn rotated(&self, wanted: SegmentKind) -> Vec<PathBuf> {
        let mut found: Vec<_> = self
            .file_names()
            .into_iter()
            .filter_map(|name| match self.namer.parse(&name) {
                Some((seg, kind)) if kind == wanted => Some((seg, name)),
                _ => None,
            })
            .collect();
        found.sort_by_key(|(seg, _)| *seg);
        found
            .into_iter()
            .map(|(_, name)| self.path().join(name))
            .collect()
    }
}

impl Default for TestLogDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A config that archives on the writing thread, for deterministic tests.
pub fn inline_config(max_segment_size: u64, max_backups: usize) -> WriterConfig {
    WriterConfig::new(max_segment_size, max_backups)
        .archive_mode(ArchiveMode::Inline)
        .sync_on_rotate(false)
}

/// Decompresses a zstd archive.
pub fn decompress(path: &Path) -> Vec<u8> {
    let file = File::open(path).expect("Failed to open archive");
    let mut decoder = zstd::stream::read::Decoder::new(file).expect("Invalid zstd frame");
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .expect("Failed to decompress archive");
    out
}

/// Runs a test with a fresh log directory.
///
/// # Example
///
/// ```rust
/// use logroll_testkit::{inline_config, with_log_dir};
///
/// with_log_dir(|dir| {
///     let writer = dir.open(inline_config(100, 1));
///     writer.write(b"hello").unwrap();
///     assert_eq!(dir.active_contents(), b"hello");
/// });
/// ```
pub fn with_log_dir<F, R>(f: F) -> R
where
    F: FnOnce(&TestLogDir) -> R,
{
    let dir = TestLogDir::new();
    f(&dir)
}
