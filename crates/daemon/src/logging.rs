//! Tracing setup: a console layer plus an optional append-only log file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use foldersync_core::models::Operation;
use foldersync_core::notify::Notify;

/// Keeps the file writer flushing until dropped at the end of `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
    /// Set when the log file did not exist and was created here.
    pub created: Option<PathBuf>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. The log file is created if missing
/// and always appended to.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    let mut created = None;
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (file, was_created) = open_log_file(path)?;
            if was_created {
                created = Some(path.to_path_buf());
            }
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LogGuard {
        _file: guard,
        created,
    })
}

/// Open `path` for appending, creating it and its folder when missing.
/// Returns whether the file was created.
fn open_log_file(path: &Path) -> Result<(File, bool)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let created = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    Ok((file, created))
}

/// Announce a log file created by [`init`].
pub fn report_created(guard: &LogGuard, notifier: &dyn Notify) {
    if let Some(ref path) = guard.created {
        notifier.notify(
            Operation::Create,
            &format!("Created log file \"{}\".", path.display()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldersync_core::notify::MemoryNotifier;
    use std::io::Write;

    #[test]
    fn test_open_log_file_reports_creation_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("foldersync.log");

        let (mut file, created) = open_log_file(&path).unwrap();
        assert!(created);
        writeln!(file, "first").unwrap();
        drop(file);

        let (mut file, created) = open_log_file(&path).unwrap();
        assert!(!created);
        writeln!(file, "second").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_report_created_notifies_create() {
        let sink = MemoryNotifier::new();
        let guard = LogGuard {
            _file: None,
            created: Some(PathBuf::from("/var/log/foldersync.log")),
        };
        report_created(&guard, &sink);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, Operation::Create);
        assert_eq!(events[0].1, "Created log file \"/var/log/foldersync.log\".");

        let quiet = LogGuard {
            _file: None,
            created: None,
        };
        report_created(&quiet, &sink);
        assert_eq!(sink.events().len(), 1);
    }
}
