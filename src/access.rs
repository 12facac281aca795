//! # Safe Access
//!
//! Turns a discovered profile into a path that can be opened for reading while
//! the browser is running. On platforms where the browser locks its store the
//! file is copied into a per-profile scratch directory first.
//!
//! Snapshots are named after the source file's length and modification time,
//! so an unchanged store resolves to the same path on every call and a modified
//! one resolves to a new path.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::SNAPSHOT_SLUG_LEN;
use crate::error::HistoryError;
use crate::profiles::{Platform, ProfileLocation};

/// Version of the source file a snapshot was copied from.
///
/// Ordered by modification time, then length, so a later copy of the same
/// store always compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotGeneration {
    pub modified_nanos: u128,
    pub len: u64,
}

impl SnapshotGeneration {
    fn file_name(&self) -> String {
        format!("{:x}-{:x}.sqlite", self.len, self.modified_nanos)
    }
}

/// A profile together with the path actually opened for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStore {
    pub profile: ProfileLocation,
    pub read_path: PathBuf,
    /// Set when `read_path` is a snapshot copy owned by this process.
    pub snapshot: Option<SnapshotGeneration>,
}

impl ResolvedStore {
    pub fn is_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SafeAccessor {
    requires_snapshot_copy: bool,
    scratch_dir: PathBuf,
}

impl SafeAccessor {
    pub fn new(requires_snapshot_copy: bool, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            requires_snapshot_copy,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn for_platform(platform: Platform, scratch_dir: impl Into<PathBuf>) -> Self {
        Self::new(platform.requires_snapshot_copy(), scratch_dir)
    }

    pub fn requires_snapshot_copy(&self) -> bool {
        self.requires_snapshot_copy
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn resolve(&self, profile: &ProfileLocation) -> Result<ResolvedStore, HistoryError> {
        if !self.requires_snapshot_copy {
            return Ok(ResolvedStore {
                profile: profile.clone(),
                read_path: profile.store_path.clone(),
                snapshot: None,
            });
        }

        let access_err = |path: &Path, source: io::Error| HistoryError::Access {
            profile: profile.name.clone(),
            path: path.to_path_buf(),
            source,
        };

        let source = &profile.store_path;
        let meta = std::fs::metadata(source).map_err(|e| access_err(source, e))?;
        let generation = SnapshotGeneration {
            modified_nanos: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            len: meta.len(),
        };

        let slot_dir = self.scratch_dir.join(profile_slug(source));
        std::fs::create_dir_all(&slot_dir).map_err(|e| access_err(&slot_dir, e))?;
        let target = slot_dir.join(generation.file_name());
        let resolved = ResolvedStore {
            profile: profile.clone(),
            read_path: target,
            snapshot: Some(generation),
        };

        if let Ok(existing) = std::fs::metadata(&resolved.read_path) {
            if existing.is_file() && existing.len() == generation.len {
                debug!(
                    profile = %profile.name,
                    path = %resolved.read_path.display(),
                    "snapshot reused"
                );
                return Ok(resolved);
            }
        }

        match copy_snapshot(source, &slot_dir, &resolved.read_path) {
            Ok(SnapshotCopy::Written(bytes)) => {
                info!(
                    profile = %profile.name,
                    source = %source.display(),
                    snapshot = %resolved.read_path.display(),
                    bytes,
                    "snapshot copied"
                );
                Ok(resolved)
            }
            Ok(SnapshotCopy::AlreadyPresent) => {
                debug!(
                    profile = %profile.name,
                    path = %resolved.read_path.display(),
                    "snapshot written concurrently"
                );
                Ok(resolved)
            }
            Err(err) => {
                warn!(
                    profile = %profile.name,
                    source = %source.display(),
                    error = %err,
                    "snapshot copy failed"
                );
                Err(access_err(source, err))
            }
        }
    }
}

enum SnapshotCopy {
    Written(u64),
    /// Another resolver persisted the same generation first.
    AlreadyPresent,
}

/// Copy through a temporary file so a concurrent reader never sees a partial
/// snapshot. An existing target is never replaced: it may be open in another
/// connection, and it holds the same generation.
fn copy_snapshot(source: &Path, slot_dir: &Path, target: &Path) -> io::Result<SnapshotCopy> {
    let mut input = File::open(source)?;
    let mut tmp = tempfile::NamedTempFile::new_in(slot_dir)?;
    let bytes = io::copy(&mut input, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(SnapshotCopy::Written(bytes)),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(SnapshotCopy::AlreadyPresent)
        }
        Err(err) => Err(err.error),
    }
}

/// Remove a snapshot file once no handle refers to it. Live stores are never touched.
pub(crate) fn discard_snapshot(store: &ResolvedStore) {
    if !store.is_snapshot() || store.read_path == store.profile.store_path {
        return;
    }
    match std::fs::remove_file(&store.read_path) {
        Ok(()) => debug!(path = %store.read_path.display(), "stale snapshot removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(path = %store.read_path.display(), error = %err, "stale snapshot not removed")
        }
    }
}

fn profile_slug(source: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string_lossy().as_bytes());
    let mut slug = hex::encode(hasher.finalize());
    slug.truncate(SNAPSHOT_SLUG_LEN);
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn profile(root: &Path, name: &str, bytes: &[u8]) -> ProfileLocation {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        let store_path = dir.join("History");
        fs::write(&store_path, bytes).expect("write");
        ProfileLocation {
            name: name.to_string(),
            store_path,
        }
    }

    #[test]
    fn direct_mode_returns_source_path() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"data");
        let accessor = SafeAccessor::new(false, dir.path().join("scratch"));
        let resolved = accessor.resolve(&p).expect("resolve");
        assert_eq!(resolved.read_path, p.store_path);
        assert!(!resolved.is_snapshot());
        assert!(!dir.path().join("scratch").exists());
    }

    #[test]
    fn snapshot_mode_copies_bytes() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"SQLite format 3\0rest");
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let resolved = accessor.resolve(&p).expect("resolve");
        assert!(resolved.is_snapshot());
        assert_ne!(resolved.read_path, p.store_path);
        assert!(resolved.read_path.starts_with(dir.path().join("scratch")));
        assert_eq!(
            fs::read(&resolved.read_path).expect("read"),
            b"SQLite format 3\0rest"
        );
    }

    #[test]
    fn unchanged_source_reuses_snapshot_path() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"one");
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let first = accessor.resolve(&p).expect("first");
        let second = accessor.resolve(&p).expect("second");
        assert_eq!(first.read_path, second.read_path);
    }

    #[test]
    fn modified_source_gets_new_snapshot_path() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"one");
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let first = accessor.resolve(&p).expect("first");
        fs::write(&p.store_path, b"one plus more").expect("rewrite");
        let second = accessor.resolve(&p).expect("second");
        assert_ne!(first.read_path, second.read_path);
        assert_eq!(fs::read(&second.read_path).expect("read"), b"one plus more");
    }

    #[test]
    fn modified_source_has_greater_generation() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"one");
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let first = accessor.resolve(&p).expect("first");
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&p.store_path, b"one plus more").expect("rewrite");
        let second = accessor.resolve(&p).expect("second");
        assert!(second.snapshot > first.snapshot);
    }

    #[test]
    fn parallel_resolves_of_unchanged_store_agree() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", &vec![0x33u8; 256 * 1024]);
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));

        let resolved: Vec<ResolvedStore> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| accessor.resolve(&p)))
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("join").expect("resolve"))
                .collect()
        });

        let first = &resolved[0].read_path;
        assert!(resolved.iter().all(|r| &r.read_path == first));
        assert_eq!(fs::read(first).expect("read").len(), 256 * 1024);
        let leftovers = fs::read_dir(first.parent().expect("slot dir"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1, "temporary copies must not be left behind");
    }

    #[test]
    fn snapshots_are_unique_per_profile() {
        let dir = tempdir().expect("tempdir");
        let a = profile(dir.path(), "Default", b"same");
        let b = profile(dir.path(), "Profile 1", b"same");
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let ra = accessor.resolve(&a).expect("a");
        let rb = accessor.resolve(&b).expect("b");
        assert_ne!(ra.read_path.parent(), rb.read_path.parent());
    }

    #[test]
    fn vanished_source_is_access_error() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"x");
        fs::remove_file(&p.store_path).expect("remove");
        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let err = accessor.resolve(&p).expect_err("should fail");
        assert!(matches!(err, HistoryError::Access { ref profile, .. } if profile == "Default"));
    }

    #[test]
    fn discard_leaves_live_store_alone() {
        let dir = tempdir().expect("tempdir");
        let p = profile(dir.path(), "Default", b"x");
        let direct = ResolvedStore {
            profile: p.clone(),
            read_path: p.store_path.clone(),
            snapshot: None,
        };
        discard_snapshot(&direct);
        assert!(p.store_path.exists());

        let accessor = SafeAccessor::new(true, dir.path().join("scratch"));
        let snap = accessor.resolve(&p).expect("resolve");
        discard_snapshot(&snap);
        assert!(!snap.read_path.exists());
        assert!(p.store_path.exists());
    }
}
