//! Domain model types used throughout foldersync.
//!
//! These types bridge the snapshotter, the planner, and the executor.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

/// One file's observed state at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the tree root.
    pub identity: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Content digest, present only when strict verification is on.
    pub digest: Option<String>,
}

impl FileRecord {
    /// `true` when modification time and size are identical.
    pub fn same_metadata(&self, other: &FileRecord) -> bool {
        self.modified_at == other.modified_at && self.size_bytes == other.size_bytes
    }

    /// Digest comparison that only applies when both sides carry a digest.
    ///
    /// Returns `None` when either digest is absent.
    pub fn digest_differs(&self, other: &FileRecord) -> Option<bool> {
        match (&self.digest, &other.digest) {
            (Some(a), Some(b)) => Some(a != b),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Which tree a snapshot was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Destination,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// Point-in-time view of one directory tree.
///
/// Keys are root-relative paths. `dirs` holds every directory below the root;
/// `occupied` holds every directory with at least one mirrored child, that is
/// a regular file or a subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub side: Side,
    pub taken_at: DateTime<Utc>,
    pub files: BTreeMap<PathBuf, FileRecord>,
    pub dirs: BTreeSet<PathBuf>,
    pub occupied: BTreeSet<PathBuf>,
    /// Directories holding entries that are neither regular files nor
    /// directories. These are never mirrored and keep their parent alive.
    pub pinned: BTreeSet<PathBuf>,
}

impl Snapshot {
    /// An empty snapshot, used as `previousSource` before the first cycle.
    pub fn empty(side: Side) -> Self {
        Self {
            side,
            taken_at: Utc::now(),
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            occupied: BTreeSet::new(),
            pinned: BTreeSet::new(),
        }
    }

    pub fn get(&self, identity: &Path) -> Option<&FileRecord> {
        self.files.get(identity)
    }

    pub fn contains(&self, identity: &Path) -> bool {
        self.files.contains_key(identity)
    }

    /// `true` for the root itself and every recorded directory.
    pub fn has_dir(&self, dir: &Path) -> bool {
        dir.as_os_str().is_empty() || self.dirs.contains(dir)
    }

    /// Directories with no files and no subdirectories. Entries that are not
    /// mirrored do not count.
    pub fn empty_dirs(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.dirs.iter().filter(move |d| !self.occupied.contains(*d))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total bytes across all recorded files.
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.size_bytes).sum()
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One filesystem mutation planned for the destination.
///
/// All paths are relative to the source or destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateFolder(PathBuf),
    CopyOrUpdate { source: PathBuf, dest: PathBuf },
    DeleteFile(PathBuf),
    DeleteFolder(PathBuf),
}

impl Action {
    /// The destination-relative path this action mutates.
    pub fn target(&self) -> &Path {
        match self {
            Self::CreateFolder(p) | Self::DeleteFile(p) | Self::DeleteFolder(p) => p,
            Self::CopyOrUpdate { dest, .. } => dest,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateFolder(_) => "create-folder",
            Self::CopyOrUpdate { .. } => "copy-or-update",
            Self::DeleteFile(_) => "delete-file",
            Self::DeleteFolder(_) => "delete-folder",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.label(), self.target().display())
    }
}

// ---------------------------------------------------------------------------
// Operations reported through Notify
// ---------------------------------------------------------------------------

/// Event kind attached to every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Copy,
    Create,
    Update,
    Delete,
    Fail,
    Info,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Fail => write!(f, "fail"),
            Self::Info => write!(f, "info"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle statistics
// ---------------------------------------------------------------------------

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    pub files_copied: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub folders_created: u64,
    pub folders_deleted: u64,
    /// Actions resolved without a mutation (the target already moved on).
    pub actions_skipped: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CycleStats {
    /// `true` if any action mutated the destination.
    pub fn changed(&self) -> bool {
        self.files_copied
            + self.files_updated
            + self.files_deleted
            + self.folders_created
            + self.folders_deleted
            > 0
    }
}
