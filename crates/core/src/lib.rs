//! foldersync core library.
//!
//! One-way polling mirror of a source directory tree into a destination
//! tree: snapshots, diff planning, action execution with unbounded retry,
//! pause/cancel control, and the cycle orchestrator that ties them together.

pub mod config;
pub mod control;
pub mod cycle;
pub mod errors;
pub mod executor;
pub mod hasher;
pub mod models;
pub mod notify;
pub mod planner;
pub mod retry;
pub mod snapshot;

// Re-exports for convenience.
pub use config::{EngineSettings, MirrorConfig};
pub use control::SyncControl;
pub use cycle::{CycleState, MirrorEngine};
pub use errors::{ConfigError, CoreError, SyncError};
pub use notify::{Notify, TracingNotifier};
