//! Retention of archived segments.
//!
//! The [`RetentionManager`] lists archives fresh from the store every time it
//! runs, orders them by the discriminator embedded in their names and deletes
//! the oldest ones beyond the configured bounds. Segments still being archived
//! do not carry the archive suffix and are never candidates.

use crate::config::RetentionPolicy;
use crate::segment::{SegmentKind, SegmentName, SegmentNamer};
use logroll_storage::{SegmentStore, StorageResult};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// An archive found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedSegment {
    /// Path of the archive.
    pub path: PathBuf,
    /// Discriminator parsed from the file name.
    pub name: SegmentName,
    /// Size in bytes.
    pub size: u64,
}

/// Why an archive was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// More than `max_backups` archives.
    Count,
    /// Archives exceeded `max_total_size`.
    TotalSize,
    /// Archive older than `max_age`.
    Age,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Count => "count",
            Self::TotalSize => "total-size",
            Self::Age => "age",
        })
    }
}

/// One archive selected for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Path of the archive.
    pub path: PathBuf,
    /// Limit that selected it.
    pub reason: RemovalReason,
}

/// Computes which archives violate `policy`.
///
/// `segments` must be ordered oldest first. `now_ms` is the current UNIX
/// time in milliseconds and only matters for the age limit.
#[must_use]
pub fn plan(policy: &RetentionPolicy, segments: &[ArchivedSegment], now_ms: u64) -> Vec<Removal> {
    let mut removals = Vec::new();

    let excess = segments.len().saturating_sub(policy.max_backups);
    let (expired, mut kept) = segments.split_at(excess);
    removals.extend(expired.iter().map(|s| Removal {
        path: s.path.clone(),
        reason: RemovalReason::Count,
    }));

    if let Some(max_total_size) = policy.max_total_size {
        let mut total: u64 = kept.iter().map(|s| s.size).sum();
        while total > max_total_size {
            let Some((oldest, rest)) = kept.split_first() else {
                break;
            };
            total -= oldest.size;
            removals.push(Removal {
                path: oldest.path.clone(),
                reason: RemovalReason::TotalSize,
            });
            kept = rest;
        }
    }

    if let Some(max_age) = policy.max_age {
        let cutoff = now_ms.saturating_sub(duration_ms(max_age));
        removals.extend(
            kept.iter()
                .filter(|s| s.name.rotated_at_ms < cutoff)
                .map(|s| Removal {
                    path: s.path.clone(),
                    reason: RemovalReason::Age,
                }),
        );
    }

    removals
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Enforces a [`RetentionPolicy`] over the archives of one base path.
pub struct RetentionManager {
    store: Arc<dyn SegmentStore>,
    namer: SegmentNamer,
    policy: RetentionPolicy,
}

impl RetentionManager {
    /// Creates a retention manager.
    pub fn new(store: Arc<dyn SegmentStore>, namer: SegmentNamer, policy: RetentionPolicy) -> Self {
        Self {
            store,
            namer,
            policy,
        }
    }

    /// Returns the policy being enforced.
    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Lists archived segments, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed. Archives that
    /// vanish between listing and stat are skipped.
    pub fn list_archived(&self) -> StorageResult<Vec<ArchivedSegment>> {
        let namer = &self.namer;
        let paths = self
            .store
            .list_segments(namer.dir(), &|name| namer.is_archived(name))?;

        let mut segments = Vec::with_capacity(paths.len());
        for path in paths {
            let Some((name, SegmentKind::Archived)) = namer.parse_path(&path) else {
                continue;
            };
            let size = match self.store.segment_size(&path) {
                Ok(size) => size,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            segments.push(ArchivedSegment { path, name, size });
        }

        segments.sort_by_key(|s| s.name);
        Ok(segments)
    }

    /// Deletes archives beyond the policy bounds, oldest first.
    ///
    /// Returns what was removed. After success at most `max_backups`
    /// archives remain.
    ///
    /// # Errors
    ///
    /// Returns the first listing or removal failure. Removals already done
    /// are not rolled back; remaining candidates are retried on the next run.
    #[tracing::instrument(skip_all, fields(dir = %self.namer.dir().display(), removed))]
    pub fn enforce(&self) -> StorageResult<Vec<Removal>> {
        self.enforce_at(crate::now_ms())
    }

    /// Like [`RetentionManager::enforce`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`RetentionManager::enforce`].
    pub fn enforce_at(&self, now_ms: u64) -> StorageResult<Vec<Removal>> {
        let segments = self.list_archived()?;
        let removals = plan(&self.policy, &segments, now_ms);

        for removal in &removals {
            info!(
                path = %removal.path.display(),
                reason = %removal.reason,
                "deleting archived segment"
            );
            self.store.remove_segment(&removal.path)?;
        }

        tracing::Span::current().record("removed", removals.len());
        Ok(removals)
    }
}

impl fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionManager")
            .field("dir", &self.namer.dir())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logroll_storage::FileSegmentStore;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn archived(seq: u64, rotated_at_ms: u64, size: u64) -> ArchivedSegment {
        ArchivedSegment {
            path: PathBuf::from(format!("app.log.{seq:010}-{rotated_at_ms}.zst")),
            name: SegmentName::new(seq, rotated_at_ms),
            size,
        }
    }

    fn removed_sequences(removals: &[Removal]) -> Vec<String> {
        removals
            .iter()
            .map(|r| r.path.display().to_string())
            .collect()
    }

    #[test]
    fn plan_within_bounds_removes_nothing() {
        let segments = vec![archived(1, 0, 10), archived(2, 0, 10)];
        assert!(plan(&RetentionPolicy::new(2), &segments, 0).is_empty());
    }

    #[test]
    fn plan_removes_oldest_by_count() {
        let segments = vec![
            archived(1, 0, 10),
            archived(2, 0, 10),
            archived(3, 0, 10),
            archived(4, 0, 10),
        ];
        let removals = plan(&RetentionPolicy::new(2), &segments, 0);

        assert_eq!(
            removed_sequences(&removals),
            vec!["app.log.0000000001-0.zst", "app.log.0000000002-0.zst"]
        );
        assert!(removals.iter().all(|r| r.reason == RemovalReason::Count));
    }

    #[test]
    fn plan_zero_backups_removes_everything() {
        let segments = vec![archived(1, 0, 10), archived(2, 0, 10)];
        assert_eq!(plan(&RetentionPolicy::new(0), &segments, 0).len(), 2);
    }

    #[test]
    fn plan_applies_total_size_after_count() {
        let segments = vec![
            archived(1, 0, 100),
            archived(2, 0, 100),
            archived(3, 0, 100),
            archived(4, 0, 100),
        ];
        let policy = RetentionPolicy::new(3).with_max_total_size(150);
        let removals = plan(&policy, &segments, 0);

        assert_eq!(removals.len(), 3);
        assert_eq!(removals[0].reason, RemovalReason::Count);
        assert_eq!(removals[1].reason, RemovalReason::TotalSize);
        assert_eq!(removals[2].reason, RemovalReason::TotalSize);
        assert!(removals[2].path.ends_with("app.log.0000000003-0.zst"));
    }

    #[test]
    fn plan_applies_age_to_survivors() {
        let segments = vec![
            archived(1, 1_000, 1),
            archived(2, 5_000, 1),
            archived(3, 9_000, 1),
        ];
        let policy = RetentionPolicy::new(10).with_max_age(Duration::from_secs(5));
        let removals = plan(&policy, &segments, 10_000);

        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].reason, RemovalReason::Age);
        assert!(removals[0].path.ends_with("app.log.0000000001-1000.zst"));
    }

    fn touch(dir: &Path, name: &str, len: usize) {
        fs::write(dir.join(name), vec![b'x'; len]).unwrap();
    }

    fn manager(dir: &Path, policy: RetentionPolicy) -> RetentionManager {
        let namer = SegmentNamer::new(&dir.join("app.log"), ".zst").unwrap();
        RetentionManager::new(Arc::new(FileSegmentStore::new()), namer, policy)
    }

    #[test]
    fn list_orders_by_sequence_and_ignores_other_files() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "app.log", 5);
        touch(dir.path(), "app.log.0000000010-1.zst", 3);
        touch(dir.path(), "app.log.0000000002-9.zst", 2);
        touch(dir.path(), "app.log.0000000011-2", 4);
        touch(dir.path(), ".app.log.0000000011-2.abc.partial", 1);
        touch(dir.path(), "other.log.0000000001-1.zst", 1);

        let listed = manager(dir.path(), RetentionPolicy::new(5))
            .list_archived()
            .unwrap();

        let sequences: Vec<_> = listed.iter().map(|s| s.name.sequence).collect();
        assert_eq!(sequences, vec![2, 10]);
        assert_eq!(listed[0].size, 2);
    }

    #[test]
    fn enforce_deletes_oldest_and_spares_pending() {
        let dir = tempdir().unwrap();
        for seq in 1..=4 {
            touch(dir.path(), &format!("app.log.{seq:010}-{seq}.zst"), 1);
        }
        // Mid-archive segment and its temp file are not archives.
        touch(dir.path(), "app.log.0000000005-5", 1);
        touch(dir.path(), ".app.log.0000000005-5.tmp1.partial", 1);

        let manager = manager(dir.path(), RetentionPolicy::new(2));
        let removals = manager.enforce().unwrap();
        assert_eq!(removals.len(), 2);

        let remaining: Vec<_> = manager
            .list_archived()
            .unwrap()
            .into_iter()
            .map(|s| s.name.sequence)
            .collect();
        assert_eq!(remaining, vec![3, 4]);
        assert!(dir.path().join("app.log.0000000005-5").exists());
        assert!(dir.path().join(".app.log.0000000005-5.tmp1.partial").exists());

        // Idempotent
        assert!(manager.enforce().unwrap().is_empty());
    }

    #[test]
    fn enforce_fails_when_directory_is_gone() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir.path().join("missing"), RetentionPolicy::new(1));
        assert!(manager.enforce().unwrap_err().is_not_found());
    }
}
