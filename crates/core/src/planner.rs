//! Three-way diff between the previous source snapshot, the current source
//! snapshot and the current destination snapshot.
//!
//! # Ordering
//!
//! The plan is emitted in groups, each in sorted path order:
//!
//! 0. Removal of destination entries whose type differs from the source
//!    (a file where the source has a directory, or the reverse). A
//!    destination directory pinned by unmirrored entries is left alone and
//!    the source file of the same name is not copied.
//! 1. `CreateFolder` (missing parents) and `CopyOrUpdate` for source files
//! 2. `DeleteFile` for destination-only files
//! 3. `CreateFolder` for empty source directories missing at the destination
//! 4. `DeleteFolder` for destination-only directories, deepest first
//!
//! Apart from group 0, where both entries cannot coexist, copies always
//! precede deletes: a file that moved to a new identity exists at its new
//! location before the old one is removed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::models::{Action, FileRecord, Snapshot};

/// Why a file is being copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    /// No file with this identity at the destination.
    Missing,
    /// Source is new or changed since the last cycle and the destination
    /// metadata does not match it.
    Modified,
    /// Source unchanged since the last cycle, but the destination copy
    /// drifted (edited or replaced out of band).
    Drifted,
    /// Metadata matches but content digests differ.
    DigestMismatch,
}

impl std::fmt::Display for CopyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Modified => write!(f, "modified"),
            Self::Drifted => write!(f, "drifted"),
            Self::DigestMismatch => write!(f, "digest_mismatch"),
        }
    }
}

/// Decide whether one source file needs copying to the destination.
///
/// Digest never participates in the source-side "unchanged since last cycle"
/// check; it only gates the destination comparison, and only when both
/// records carry a digest.
pub fn copy_reason(
    previous: Option<&FileRecord>,
    current: &FileRecord,
    dest: Option<&FileRecord>,
    strict: bool,
) -> Option<CopyReason> {
    let Some(dest) = dest else {
        return Some(CopyReason::Missing);
    };

    let unchanged_since_last_cycle = previous.is_some_and(|p| p.same_metadata(current));

    if !current.same_metadata(dest) {
        return Some(if unchanged_since_last_cycle {
            CopyReason::Drifted
        } else {
            CopyReason::Modified
        });
    }

    if strict && current.digest_differs(dest) == Some(true) {
        return Some(CopyReason::DigestMismatch);
    }

    None
}

/// Builds the ordered action list for one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPlanner {
    strict: bool,
}

impl DiffPlanner {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Compute the actions that make `destination` mirror `current`.
    pub fn plan(
        &self,
        previous: &Snapshot,
        current: &Snapshot,
        destination: &Snapshot,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut planned_dirs: BTreeSet<PathBuf> = BTreeSet::new();
        let mut removed_files: BTreeSet<&PathBuf> = BTreeSet::new();
        let mut removed_dirs: BTreeSet<&PathBuf> = BTreeSet::new();
        let mut blocked: BTreeSet<&PathBuf> = BTreeSet::new();

        // 0. Type conflicts.
        for identity in destination.files.keys() {
            if current.dirs.contains(identity) {
                debug!(path = %identity.display(), "destination file shadows a source folder");
                actions.push(Action::DeleteFile(identity.clone()));
                removed_files.insert(identity);
            }
        }
        for dir in destination.dirs.iter().filter(|d| current.contains(d)) {
            if subtree_pinned(destination, dir) {
                // Pinned folders are never removed; the file stays unmirrored.
                warn!(
                    path = %dir.display(),
                    "destination folder holds unmirrored entries, not replacing it with a file"
                );
                blocked.insert(dir);
                continue;
            }
            debug!(path = %dir.display(), "destination folder shadows a source file");
            for identity in destination.files.keys().filter(|f| f.starts_with(dir)) {
                if removed_files.insert(identity) {
                    actions.push(Action::DeleteFile(identity.clone()));
                }
            }
            let mut nested: Vec<&PathBuf> = destination
                .dirs
                .iter()
                .filter(|d| d.starts_with(dir) && !removed_dirs.contains(*d))
                .collect();
            sort_deepest_first(&mut nested);
            for d in nested {
                removed_dirs.insert(d);
                actions.push(Action::DeleteFolder(d.clone()));
            }
        }

        // 1. Copies and their parent folders.
        for (identity, record) in current.files.iter().filter(|(id, _)| !blocked.contains(id)) {
            let reason = copy_reason(
                previous.get(identity),
                record,
                destination.get(identity),
                self.strict,
            );
            let Some(reason) = reason else {
                continue;
            };
            debug!(path = %identity.display(), %reason, "planning copy");

            if let Some(parent) = identity.parent() {
                if !destination.has_dir(parent) && !covered_by_planned(&planned_dirs, parent) {
                    actions.push(Action::CreateFolder(parent.to_path_buf()));
                    planned_dirs.insert(parent.to_path_buf());
                }
            }

            actions.push(Action::CopyOrUpdate {
                source: identity.clone(),
                dest: identity.clone(),
            });
        }

        // 2. Files that no longer exist at the source.
        for identity in destination.files.keys() {
            if !current.contains(identity) && !removed_files.contains(identity) {
                debug!(path = %identity.display(), "planning delete");
                actions.push(Action::DeleteFile(identity.clone()));
            }
        }

        // 3. Empty source folders.
        for dir in current.empty_dirs() {
            if !destination.has_dir(dir) && !covered_by_planned(&planned_dirs, dir) {
                actions.push(Action::CreateFolder(dir.clone()));
                planned_dirs.insert(dir.clone());
            }
        }

        // 4. Destination-only folders. Their files were all planned for
        // deletion above, so only non-mirrored entries can keep them alive.
        let mut stale: Vec<&PathBuf> = destination
            .dirs
            .iter()
            .filter(|d| !current.dirs.contains(*d) && !removed_dirs.contains(*d))
            .filter(|d| !subtree_pinned(destination, d))
            .collect();
        sort_deepest_first(&mut stale);
        for dir in stale {
            actions.push(Action::DeleteFolder(dir.clone()));
        }

        actions
    }
}

/// `create_dir_all` on a planned descendant already covers `dir`.
fn covered_by_planned(planned: &BTreeSet<PathBuf>, dir: &Path) -> bool {
    planned.iter().any(|p| p.starts_with(dir))
}

fn sort_deepest_first(dirs: &mut [&PathBuf]) {
    dirs.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
}

fn subtree_pinned(snapshot: &Snapshot, dir: &Path) -> bool {
    snapshot.pinned.iter().any(|p| p.starts_with(dir))
}
