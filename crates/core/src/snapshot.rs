//! Directory tree snapshots.
//!
//! [`scan_tree`] walks one tree and records every regular file (size, mtime,
//! optional digest) and every directory, keyed by root-relative path.
//! [`Snapshotter`] runs it on the blocking pool under the retry wrapper, so a
//! failed walk is repeated from scratch and never yields a partial snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::SyncError;
use crate::hasher;
use crate::models::{FileRecord, Side, Snapshot};
use crate::retry::Retry;

/// Walk `root` and build a snapshot. Blocking.
///
/// When `strict` is set every file is digested, so the cost grows with total
/// content size instead of entry count.
pub fn scan_tree(root: &Path, side: Side, strict: bool) -> Result<Snapshot, SyncError> {
    let mut snapshot = Snapshot::empty(side);

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            SyncError::io("scan directory", path, e.into())
        })?;

        let rel = relative_to(root, entry.path())?;
        let parent = rel
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let file_type = entry.file_type();
        // Only mirrored entries make a folder non-empty.
        if file_type.is_dir() || file_type.is_file() {
            if let Some(ref parent) = parent {
                snapshot.occupied.insert(parent.clone());
            }
        }

        if file_type.is_dir() {
            snapshot.dirs.insert(rel);
        } else if file_type.is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| SyncError::io("read metadata", entry.path(), e.into()))?;
            let modified = metadata
                .modified()
                .map_err(|e| SyncError::io("read modification time", entry.path(), e))?;
            let digest = if strict {
                Some(hasher::digest_file(entry.path())?)
            } else {
                None
            };

            snapshot.files.insert(
                rel.clone(),
                FileRecord {
                    identity: rel,
                    modified_at: DateTime::<Utc>::from(modified),
                    size_bytes: metadata.len(),
                    digest,
                },
            );
        } else {
            debug!(path = %entry.path().display(), "skipping entry that is not a regular file");
            if let Some(parent) = parent {
                snapshot.pinned.insert(parent);
            }
        }
    }

    snapshot.taken_at = Utc::now();
    Ok(snapshot)
}

fn relative_to(root: &Path, path: &Path) -> Result<PathBuf, SyncError> {
    path.strip_prefix(root).map(Path::to_path_buf).map_err(|_| {
        SyncError::io(
            "normalize path",
            path,
            std::io::Error::other("entry is outside the scanned root"),
        )
    })
}

/// Produces snapshots of a tree, retrying until a full enumeration succeeds.
#[derive(Debug, Clone)]
pub struct Snapshotter {
    root: PathBuf,
    side: Side,
    strict: bool,
}

impl Snapshotter {
    pub fn new(root: impl Into<PathBuf>, side: Side, strict: bool) -> Self {
        Self {
            root: root.into(),
            side,
            strict,
        }
    }

    /// Take a complete snapshot, retrying the whole walk on any error.
    pub async fn scan(&self, retry: &Retry<'_>) -> Result<Snapshot, SyncError> {
        let what = format!("Getting file info from {} \"{}\"", self.side, self.root.display());
        let snapshot = retry
            .run(&what, || {
                let root = self.root.clone();
                let side = self.side;
                let strict = self.strict;
                async move {
                    tokio::task::spawn_blocking(move || scan_tree(&root, side, strict)).await?
                }
            })
            .await?;

        info!(
            side = %self.side,
            files = snapshot.file_count(),
            dirs = snapshot.dirs.len(),
            bytes = snapshot.total_bytes(),
            strict = self.strict,
            "scan complete"
        );
        Ok(snapshot)
    }
}
