//! Configuration for foldersync.
//!
//! Loaded from a TOML file or assembled from command-line arguments, then
//! validated once at startup. The engine consumes the immutable result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Shortest accepted poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
/// Longest accepted poll interval in seconds.
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Complete foldersync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// What to mirror and how often.
    pub mirror: MirrorSection,

    /// Log sink settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Mirror section
// ---------------------------------------------------------------------------

/// Source, destination and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSection {
    /// Directory to mirror from.
    pub source: PathBuf,

    /// Directory to mirror into. Anything here that is not in the source is
    /// deleted.
    pub destination: PathBuf,

    /// Seconds between cycles (5–3600, default 30).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Compare content digests in addition to size and modification time.
    /// Every file is read in full on every scan.
    #[serde(default)]
    pub verify: bool,

    /// Seconds to wait before retrying a failed filesystem step (default 3).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    3
}

// ---------------------------------------------------------------------------
// Logging section
// ---------------------------------------------------------------------------

/// Where and how verbosely to log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Append-only log file. Console only when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_file: None,
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine settings
// ---------------------------------------------------------------------------

/// The immutable subset of configuration the sync engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub poll_interval: Duration,
    pub strict: bool,
    pub retry_delay: Duration,
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MirrorConfig {
    /// Build a config directly from its essential values.
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            mirror: MirrorSection {
                source: source.into(),
                destination: destination.into(),
                poll_interval_secs,
                verify: false,
                retry_delay_secs: default_retry_delay(),
            },
            logging: LoggingSection::default(),
        }
    }

    /// Load a [`MirrorConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MirrorConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Expand a leading `~` in every configured path.
    pub fn resolve_paths(&mut self) {
        self.mirror.source = expand_tilde(&self.mirror.source);
        self.mirror.destination = expand_tilde(&self.mirror.destination);
        if let Some(ref log_file) = self.logging.log_file {
            self.logging.log_file = Some(expand_tilde(log_file));
        }
    }

    /// Validate paths and bounds. Any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_dir("mirror.source", &self.mirror.source)?;
        check_dir("mirror.destination", &self.mirror.destination)?;

        let interval = self.mirror.poll_interval_secs;
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&interval) {
            return Err(ConfigError::InvalidValue {
                field: "mirror.poll_interval_secs".into(),
                detail: format!(
                    "must be between {} and {} seconds, got {}",
                    MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, interval
                ),
            });
        }

        if self.mirror.retry_delay_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mirror.retry_delay_secs".into(),
                detail: "retry delay must be > 0".into(),
            });
        }

        let source = std::fs::canonicalize(&self.mirror.source)?;
        let destination = std::fs::canonicalize(&self.mirror.destination)?;
        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(ConfigError::InvalidValue {
                field: "mirror.destination".into(),
                detail: format!(
                    "source '{}' and destination '{}' must not contain each other",
                    source.display(),
                    destination.display()
                ),
            });
        }

        if let Some(ref log_file) = self.logging.log_file {
            if log_file.is_dir() {
                return Err(ConfigError::InvalidValue {
                    field: "logging.log_file".into(),
                    detail: format!("'{}' is a directory", log_file.display()),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    /// The settings the engine runs with.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            source: self.mirror.source.clone(),
            destination: self.mirror.destination.clone(),
            poll_interval: Duration::from_secs(self.mirror.poll_interval_secs),
            strict: self.mirror.verify,
            retry_delay: Duration::from_secs(self.mirror.retry_delay_secs),
        }
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# foldersync configuration

[mirror]
source = "/path/to/source"
destination = "/path/to/replica"
poll_interval_secs = 30
# Compare content digests as well as size and modification time.
# Every file is read in full on every scan.
verify = false
retry_delay_secs = 3

[logging]
# log_file = "~/foldersync.log"  # console only when unset
log_level = "info"
"#
    }
}

fn check_dir(field: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: "path must not be empty".into(),
        });
    }
    if !path.is_dir() {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: format!("'{}' is not an existing directory", path.display()),
        });
    }
    Ok(())
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
