//! Applies planned actions to the destination tree.
//!
//! Every action runs under the retry wrapper: a failing step is reported,
//! delayed and retried until it succeeds or the engine is cancelled. Exactly
//! one success notification is emitted per action.
//!
//! A few failures mean the filesystem changed between scan and execution
//! (the source file vanished, the file to delete is already gone, a folder
//! to delete gained content). Those resolve as [`Outcome::Skipped`] instead
//! of retrying; the next cycle plans again from fresh snapshots.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::debug;

use crate::errors::SyncError;
use crate::models::{Action, Operation};
use crate::retry::Retry;

/// Result of one applied action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    FolderCreated,
    Copied,
    Updated,
    FileDeleted,
    FolderDeleted,
    Skipped(String),
}

impl Outcome {
    /// `true` if the destination was mutated.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

/// Internal result of the blocking copy step.
enum CopyStep {
    Done { existed: bool, created_parent: Option<PathBuf> },
    SourceVanished,
}

/// Applies actions relative to a source and a destination root.
#[derive(Debug, Clone)]
pub struct Executor {
    source_root: PathBuf,
    dest_root: PathBuf,
}

impl Executor {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
        }
    }

    /// Apply one action, retrying until it succeeds.
    pub async fn apply(&self, action: &Action, retry: &Retry<'_>) -> Result<Outcome, SyncError> {
        debug!(%action, "applying action");
        match action {
            Action::CreateFolder(rel) => self.create_folder(rel, retry).await,
            Action::CopyOrUpdate { source, dest } => self.copy_or_update(source, dest, retry).await,
            Action::DeleteFile(rel) => self.delete_file(rel, retry).await,
            Action::DeleteFolder(rel) => self.delete_folder(rel, retry).await,
        }
    }

    async fn create_folder(&self, rel: &Path, retry: &Retry<'_>) -> Result<Outcome, SyncError> {
        let path = self.dest_root.join(rel);
        let what = format!("Creating folder \"{}\"", path.display());

        retry
            .run(&what, || {
                let path = path.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        fs::create_dir_all(&path)
                            .map_err(|e| SyncError::io("create folder", &path, e))
                    })
                    .await?
                }
            })
            .await?;

        retry
            .notifier
            .notify(Operation::Create, &format!("Created folder \"{}\".", path.display()));
        Ok(Outcome::FolderCreated)
    }

    async fn copy_or_update(
        &self,
        source: &Path,
        dest: &Path,
        retry: &Retry<'_>,
    ) -> Result<Outcome, SyncError> {
        let src = self.source_root.join(source);
        let dst = self.dest_root.join(dest);
        let what = format!("Copying file \"{}\" to \"{}\"", src.display(), dst.display());

        let step = retry
            .run(&what, || {
                let src = src.clone();
                let dst = dst.clone();
                async move {
                    tokio::task::spawn_blocking(move || copy_preserving_mtime(&src, &dst)).await?
                }
            })
            .await?;

        match step {
            CopyStep::SourceVanished => {
                let msg = format!(
                    "Source file \"{}\" disappeared before it could be copied, skipping.",
                    src.display()
                );
                retry.notifier.notify(Operation::Info, &msg);
                Ok(Outcome::Skipped(msg))
            }
            CopyStep::Done { existed, created_parent } => {
                if let Some(parent) = created_parent {
                    retry.notifier.notify(
                        Operation::Create,
                        &format!("Created folder \"{}\".", parent.display()),
                    );
                }
                if existed {
                    retry
                        .notifier
                        .notify(Operation::Update, &format!("Updated file \"{}\".", dst.display()));
                    Ok(Outcome::Updated)
                } else {
                    retry.notifier.notify(
                        Operation::Copy,
                        &format!("Copied file \"{}\" to \"{}\".", src.display(), dst.display()),
                    );
                    Ok(Outcome::Copied)
                }
            }
        }
    }

    async fn delete_file(&self, rel: &Path, retry: &Retry<'_>) -> Result<Outcome, SyncError> {
        let path = self.dest_root.join(rel);
        let what = format!("Deleting file \"{}\"", path.display());

        let removed = retry
            .run(&what, || {
                let path = path.clone();
                async move {
                    tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
                        Ok(()) => Ok(true),
                        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                        Err(e) => Err(SyncError::io("delete file", &path, e)),
                    })
                    .await?
                }
            })
            .await?;

        if removed {
            retry
                .notifier
                .notify(Operation::Delete, &format!("Deleted file \"{}\".", path.display()));
            Ok(Outcome::FileDeleted)
        } else {
            let msg = format!("File \"{}\" was already gone.", path.display());
            retry.notifier.notify(Operation::Info, &msg);
            Ok(Outcome::Skipped(msg))
        }
    }

    /// Never recursive: a folder that gained content since the scan is kept.
    async fn delete_folder(&self, rel: &Path, retry: &Retry<'_>) -> Result<Outcome, SyncError> {
        let path = self.dest_root.join(rel);
        let what = format!("Deleting folder \"{}\"", path.display());

        let result = retry
            .run(&what, || {
                let path = path.clone();
                async move { tokio::task::spawn_blocking(move || remove_empty_dir(&path)).await? }
            })
            .await?;

        match result {
            FolderRemoval::Removed => {
                retry.notifier.notify(
                    Operation::Delete,
                    &format!("Deleted empty folder \"{}\".", path.display()),
                );
                Ok(Outcome::FolderDeleted)
            }
            FolderRemoval::Missing => {
                let msg = format!("Folder \"{}\" was already gone.", path.display());
                retry.notifier.notify(Operation::Info, &msg);
                Ok(Outcome::Skipped(msg))
            }
            FolderRemoval::NotEmpty => {
                let msg = format!("Folder \"{}\" is no longer empty, keeping it.", path.display());
                retry.notifier.notify(Operation::Info, &msg);
                Ok(Outcome::Skipped(msg))
            }
        }
    }
}

enum FolderRemoval {
    Removed,
    Missing,
    NotEmpty,
}

fn remove_empty_dir(path: &Path) -> Result<FolderRemoval, SyncError> {
    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FolderRemoval::Missing),
        Err(e) => return Err(SyncError::io("list folder", path, e)),
    };
    if entries.next().is_some() {
        return Ok(FolderRemoval::NotEmpty);
    }
    match fs::remove_dir(path) {
        Ok(()) => Ok(FolderRemoval::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(FolderRemoval::Missing),
        Err(e) => Err(SyncError::io("delete folder", path, e)),
    }
}

/// Copy with overwrite and stamp the source modification time on the copy,
/// so the next destination scan reports the same metadata as the source.
fn copy_preserving_mtime(src: &Path, dst: &Path) -> Result<CopyStep, SyncError> {
    let src_meta = match fs::metadata(src) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CopyStep::SourceVanished),
        Err(e) => return Err(SyncError::io("read source metadata", src, e)),
    };
    let modified = src_meta
        .modified()
        .map_err(|e| SyncError::io("read source modification time", src, e))?;

    let mut created_parent = None;
    if let Some(parent) = dst.parent() {
        if !parent.is_dir() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io("create folder", parent, e))?;
            created_parent = Some(parent.to_path_buf());
        }
    }

    let existed = match fs::symlink_metadata(dst) {
        Ok(meta) => {
            // `fs::copy` carries the source permissions over, so an earlier
            // copy of a read-only file cannot be opened for writing.
            if meta.permissions().readonly() {
                fs::remove_file(dst)
                    .map_err(|e| SyncError::io("replace read-only file", dst, e))?;
            }
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(SyncError::io("read destination metadata", dst, e)),
    };
    fs::copy(src, dst).map_err(|e| SyncError::io("copy file", dst, e))?;

    filetime::set_file_mtime(dst, FileTime::from_system_time(modified))
        .map_err(|e| SyncError::io("set modification time", dst, e))?;

    Ok(CopyStep::Done {
        existed,
        created_parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SyncControl;
    use crate::notify::MemoryNotifier;
    use crate::retry::DEFAULT_RETRY_DELAY;

    struct Fixture {
        _src: tempfile::TempDir,
        _dst: tempfile::TempDir,
        src: PathBuf,
        dst: PathBuf,
        sink: MemoryNotifier,
        control: SyncControl,
    }

    impl Fixture {
        fn new() -> Self {
            let src = tempfile::tempdir().unwrap();
            let dst = tempfile::tempdir().unwrap();
            Self {
                src: src.path().to_path_buf(),
                dst: dst.path().to_path_buf(),
                _src: src,
                _dst: dst,
                sink: MemoryNotifier::new(),
                control: SyncControl::new(),
            }
        }

        fn executor(&self) -> Executor {
            Executor::new(&self.src, &self.dst)
        }

        fn retry(&self) -> Retry<'_> {
            Retry::new(DEFAULT_RETRY_DELAY, &self.sink, &self.control)
        }
    }

    fn copy_action(path: &str) -> Action {
        Action::CopyOrUpdate {
            source: PathBuf::from(path),
            dest: PathBuf::from(path),
        }
    }

    #[tokio::test]
    async fn test_copy_then_update_preserves_mtime() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.src.join("sub")).unwrap();
        std::fs::write(fx.src.join("sub/a.txt"), b"v1").unwrap();

        let outcome = fx.executor().apply(&copy_action("sub/a.txt"), &fx.retry()).await.unwrap();
        assert_eq!(outcome, Outcome::Copied);
        assert_eq!(std::fs::read(fx.dst.join("sub/a.txt")).unwrap(), b"v1");
        assert_eq!(fx.sink.count(Operation::Create), 1);
        assert_eq!(fx.sink.count(Operation::Copy), 1);

        let src_mtime = std::fs::metadata(fx.src.join("sub/a.txt")).unwrap().modified().unwrap();
        let dst_mtime = std::fs::metadata(fx.dst.join("sub/a.txt")).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);

        std::fs::write(fx.src.join("sub/a.txt"), b"version two").unwrap();
        let outcome = fx.executor().apply(&copy_action("sub/a.txt"), &fx.retry()).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(std::fs::read(fx.dst.join("sub/a.txt")).unwrap(), b"version two");
        assert_eq!(fx.sink.count(Operation::Update), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_file_is_copied_and_replaced() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let src = fx.src.join("ro.txt");
        let dst = fx.dst.join("ro.txt");
        let set_mode = |path: &Path, mode: u32| {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        };
        let mode_of = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;

        std::fs::write(&src, b"v1").unwrap();
        set_mode(&src, 0o444);

        let outcome = fx.executor().apply(&copy_action("ro.txt"), &fx.retry()).await.unwrap();
        assert_eq!(outcome, Outcome::Copied);
        assert_eq!(mode_of(&dst), 0o444);
        assert_eq!(
            std::fs::metadata(&src).unwrap().modified().unwrap(),
            std::fs::metadata(&dst).unwrap().modified().unwrap()
        );

        // A second name for the first copy shows whether it was rewritten in
        // place or replaced.
        let old_copy = fx.dst.join("ro.old");
        std::fs::hard_link(&dst, &old_copy).unwrap();

        set_mode(&src, 0o644);
        std::fs::write(&src, b"version two").unwrap();
        set_mode(&src, 0o444);

        let outcome = fx.executor().apply(&copy_action("ro.txt"), &fx.retry()).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(std::fs::read(&dst).unwrap(), b"version two");
        assert_eq!(std::fs::read(&old_copy).unwrap(), b"v1");
        assert_eq!(mode_of(&dst), 0o444);
        assert_eq!(fx.sink.count(Operation::Fail), 0);
    }

    #[tokio::test]
    async fn test_vanished_source_is_skipped() {
        let fx = Fixture::new();
        let outcome = fx.executor().apply(&copy_action("ghost.txt"), &fx.retry()).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert!(!outcome.is_change());
        assert_eq!(fx.sink.count(Operation::Info), 1);
        assert_eq!(fx.sink.count(Operation::Fail), 0);
    }

    #[tokio::test]
    async fn test_delete_file_and_missing_file() {
        let fx = Fixture::new();
        std::fs::write(fx.dst.join("old.txt"), b"x").unwrap();

        let action = Action::DeleteFile(PathBuf::from("old.txt"));
        assert_eq!(fx.executor().apply(&action, &fx.retry()).await.unwrap(), Outcome::FileDeleted);
        assert!(!fx.dst.join("old.txt").exists());

        let again = fx.executor().apply(&action, &fx.retry()).await.unwrap();
        assert!(matches!(again, Outcome::Skipped(_)));
        assert_eq!(fx.sink.count(Operation::Delete), 1);
    }

    #[tokio::test]
    async fn test_create_and_delete_folder() {
        let fx = Fixture::new();
        let create = Action::CreateFolder(PathBuf::from("a/b/c"));
        let outcome = fx.executor().apply(&create, &fx.retry()).await.unwrap();
        assert_eq!(outcome, Outcome::FolderCreated);
        assert!(fx.dst.join("a/b/c").is_dir());

        let delete = Action::DeleteFolder(PathBuf::from("a/b/c"));
        let outcome = fx.executor().apply(&delete, &fx.retry()).await.unwrap();
        assert_eq!(outcome, Outcome::FolderDeleted);
        assert!(!fx.dst.join("a/b/c").exists());
        assert!(fx.dst.join("a/b").is_dir());
    }

    #[tokio::test]
    async fn test_delete_folder_is_never_recursive() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.dst.join("busy")).unwrap();
        std::fs::write(fx.dst.join("busy/new.txt"), b"arrived late").unwrap();

        let delete = Action::DeleteFolder(PathBuf::from("busy"));
        let outcome = fx.executor().apply(&delete, &fx.retry()).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert!(fx.dst.join("busy/new.txt").exists());
        assert_eq!(fx.sink.count(Operation::Fail), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_retries_until_cancelled() {
        let fx = Fixture::new();
        // remove_file on a directory fails every attempt.
        std::fs::create_dir_all(fx.dst.join("not-a-file")).unwrap();

        let canceller = fx.control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(4)).await;
            canceller.cancel();
        });

        let action = Action::DeleteFile(PathBuf::from("not-a-file"));
        let result = fx.executor().apply(&action, &fx.retry()).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(fx.sink.count(Operation::Fail) >= 1);
        assert_eq!(fx.sink.count(Operation::Delete), 0);
        assert!(fx.dst.join("not-a-file").is_dir());
    }
}
