//! The sync cycle orchestrator.
//!
//! One cycle:
//! 1. Snapshot the source tree, then the destination tree.
//! 2. Plan the actions against the source snapshot retained from the previous
//!    completed cycle.
//! 3. Apply every action in planner order.
//! 4. Retain this cycle's source snapshot for the next one.
//!
//! [`MirrorEngine::run`] repeats cycles separated by a cooldown until the
//! shared [`SyncControl`] is cancelled.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::control::SyncControl;
use crate::errors::SyncError;
use crate::executor::{Executor, Outcome};
use crate::models::{CycleStats, Operation, Side, Snapshot};
use crate::notify::Notify;
use crate::planner::DiffPlanner;
use crate::retry::Retry;
use crate::snapshot::Snapshotter;

/// Where the orchestrator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Scanning,
    Planning,
    Executing,
    Cooldown,
    Paused,
    Terminated,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Cooldown => write!(f, "cooldown"),
            Self::Paused => write!(f, "paused"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// State that lives for one run of the program.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub settings: EngineSettings,
    /// Source snapshot of the last completed cycle. Empty before the first.
    pub previous_source: Snapshot,
}

impl SyncState {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            previous_source: Snapshot::empty(Side::Source),
        }
    }
}

/// Drives mirror cycles from the source tree to the destination tree.
pub struct MirrorEngine {
    state: SyncState,
    phase: CycleState,
    control: SyncControl,
    notifier: Arc<dyn Notify>,
    source: Snapshotter,
    destination: Snapshotter,
    planner: DiffPlanner,
    executor: Executor,
    cycles: u64,
}

impl MirrorEngine {
    pub fn new(settings: EngineSettings, control: SyncControl, notifier: Arc<dyn Notify>) -> Self {
        let source = Snapshotter::new(&settings.source, Side::Source, settings.strict);
        let destination =
            Snapshotter::new(&settings.destination, Side::Destination, settings.strict);
        let planner = DiffPlanner::new(settings.strict);
        let executor = Executor::new(&settings.source, &settings.destination);
        Self {
            state: SyncState::new(settings),
            phase: CycleState::Idle,
            control,
            notifier,
            source,
            destination,
            planner,
            executor,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> CycleState {
        self.phase
    }

    pub fn previous_source(&self) -> &Snapshot {
        &self.state.previous_source
    }

    /// Number of cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn set_phase(&mut self, phase: CycleState) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "state transition");
            self.phase = phase;
        }
    }

    /// Block while paused, reporting the `Paused` state for the duration.
    async fn checkpoint(&mut self) -> Result<(), SyncError> {
        if self.control.is_paused() && !self.control.is_cancelled() {
            let resume_to = self.phase;
            self.set_phase(CycleState::Paused);
            let result = self.control.checkpoint().await;
            self.set_phase(resume_to);
            return result;
        }
        self.control.checkpoint().await
    }

    fn notify_info(&self, message: &str) {
        self.notifier.notify(Operation::Info, message);
    }

    // -----------------------------------------------------------------------
    // One cycle
    // -----------------------------------------------------------------------

    /// Run a single cycle. Returns [`SyncError::Cancelled`] if cancelled at
    /// any checkpoint; the retained source snapshot then stays untouched.
    pub async fn run_cycle(&mut self) -> Result<CycleStats, SyncError> {
        match self.cycle_inner().await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                if e.is_cancelled() {
                    self.set_phase(CycleState::Terminated);
                }
                Err(e)
            }
        }
    }

    async fn cycle_inner(&mut self) -> Result<CycleStats, SyncError> {
        let mut stats = CycleStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        self.checkpoint().await?;
        self.notify_info("Synchronization started.");

        // Cloned so the retry wrapper does not borrow `self`.
        let notifier = Arc::clone(&self.notifier);
        let control = self.control.clone();
        let retry = Retry::new(self.state.settings.retry_delay, notifier.as_ref(), &control);

        // ---- scan ----
        self.set_phase(CycleState::Scanning);
        let current_source = self.source.scan(&retry).await?;
        self.checkpoint().await?;
        let current_destination = self.destination.scan(&retry).await?;
        self.checkpoint().await?;

        // ---- plan ----
        self.set_phase(CycleState::Planning);
        let actions =
            self.planner
                .plan(&self.state.previous_source, &current_source, &current_destination);
        info!(actions = actions.len(), "plan ready");

        // ---- execute ----
        self.set_phase(CycleState::Executing);
        for action in &actions {
            self.checkpoint().await?;
            let outcome = self.executor.apply(action, &retry).await?;
            match outcome {
                Outcome::FolderCreated => stats.folders_created += 1,
                Outcome::Copied => stats.files_copied += 1,
                Outcome::Updated => stats.files_updated += 1,
                Outcome::FileDeleted => stats.files_deleted += 1,
                Outcome::FolderDeleted => stats.folders_deleted += 1,
                Outcome::Skipped(reason) => {
                    debug!(%action, reason = %reason, "action skipped");
                    stats.actions_skipped += 1;
                }
            }
        }

        self.state.previous_source = current_source;
        self.cycles += 1;
        stats.completed_at = Some(Utc::now());

        if !stats.changed() {
            self.notify_info("No changes, skipping.");
        }

        info!(
            cycle = self.cycles,
            copied = stats.files_copied,
            updated = stats.files_updated,
            deleted = stats.files_deleted,
            folders_created = stats.folders_created,
            folders_deleted = stats.folders_deleted,
            skipped = stats.actions_skipped,
            "sync cycle completed"
        );

        self.set_phase(CycleState::Idle);
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Polling loop
    // -----------------------------------------------------------------------

    /// Run cycles until cancelled. Returns the number of completed cycles.
    pub async fn run(&mut self) -> Result<u64, SyncError> {
        let interval = self.state.settings.poll_interval;
        info!(
            source = %self.state.settings.source.display(),
            destination = %self.state.settings.destination.display(),
            poll_interval_secs = interval.as_secs(),
            strict = self.state.settings.strict,
            "mirror loop started"
        );

        loop {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => return Err(e),
            }

            self.notify_info(&format!(
                "Waiting {} seconds before next synchronization.",
                interval.as_secs()
            ));
            self.set_phase(CycleState::Cooldown);
            if self.control.cooldown(interval).await.is_err() {
                break;
            }
        }

        self.set_phase(CycleState::Terminated);
        info!(cycles = self.cycles, "mirror loop stopped");
        Ok(self.cycles)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::notify::MemoryNotifier;

    struct Fixture {
        _src: tempfile::TempDir,
        _dst: tempfile::TempDir,
        source: PathBuf,
        destination: PathBuf,
        sink: Arc<MemoryNotifier>,
        control: SyncControl,
    }

    impl Fixture {
        fn new() -> Self {
            let src = tempfile::tempdir().unwrap();
            let dst = tempfile::tempdir().unwrap();
            Self {
                source: src.path().to_path_buf(),
                destination: dst.path().to_path_buf(),
                _src: src,
                _dst: dst,
                sink: Arc::new(MemoryNotifier::new()),
                control: SyncControl::new(),
            }
        }

        fn engine(&self) -> MirrorEngine {
            let settings = EngineSettings {
                source: self.source.clone(),
                destination: self.destination.clone(),
                poll_interval: Duration::from_secs(5),
                strict: false,
                retry_delay: Duration::from_secs(1),
            };
            MirrorEngine::new(settings, self.control.clone(), self.sink.clone())
        }

        fn write_source(&self, rel: &str, content: &str) {
            let path = self.source.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }

        fn infos(&self) -> Vec<String> {
            self.sink
                .events()
                .into_iter()
                .filter(|(op, _)| *op == Operation::Info)
                .map(|(_, msg)| msg)
                .collect()
        }
    }

    #[test]
    fn test_cycle_state_display() {
        assert_eq!(CycleState::Idle.to_string(), "idle");
        assert_eq!(CycleState::Cooldown.to_string(), "cooldown");
        assert_eq!(CycleState::Terminated.to_string(), "terminated");
    }

    #[tokio::test]
    async fn test_first_cycle_mirrors_and_retains_source() {
        let fx = Fixture::new();
        fx.write_source("a.txt", "alpha");
        fx.write_source("nested/b.txt", "beta");

        let mut engine = fx.engine();
        let stats = engine.run_cycle().await.unwrap();

        assert_eq!(stats.files_copied, 2);
        assert!(stats.changed());
        assert!(stats.completed_at.is_some());
        assert_eq!(std::fs::read_to_string(fx.destination.join("nested/b.txt")).unwrap(), "beta");
        assert_eq!(engine.previous_source().file_count(), 2);
        assert_eq!(engine.phase(), CycleState::Idle);
        assert_eq!(engine.cycles(), 1);
        assert_eq!(fx.infos().first().map(String::as_str), Some("Synchronization started."));
    }

    #[tokio::test]
    async fn test_second_cycle_reports_no_changes() {
        let fx = Fixture::new();
        fx.write_source("a.txt", "alpha");

        let mut engine = fx.engine();
        engine.run_cycle().await.unwrap();
        fx.sink.clear();

        let stats = engine.run_cycle().await.unwrap();
        assert!(!stats.changed());
        assert_eq!(
            fx.infos(),
            vec!["Synchronization started.".to_string(), "No changes, skipping.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancelled_cycle_keeps_previous_source() {
        let fx = Fixture::new();
        fx.write_source("a.txt", "alpha");

        let mut engine = fx.engine();
        fx.control.cancel();
        let result = engine.run_cycle().await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(engine.previous_source().file_count(), 0);
        assert_eq!(engine.phase(), CycleState::Terminated);
        assert!(!fx.destination.join("a.txt").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_cycle_waits_for_resume() {
        let fx = Fixture::new();
        fx.write_source("a.txt", "alpha");
        fx.control.pause();

        let resumer = fx.control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            resumer.resume();
        });

        let mut engine = fx.engine();
        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.files_copied, 1);
        assert!(fx.destination.join("a.txt").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel_during_cooldown() {
        let fx = Fixture::new();
        let mut engine = fx.engine();

        let canceller = fx.control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            canceller.cancel();
        });

        let cycles = engine.run().await.unwrap();
        assert!(cycles >= 1);
        assert_eq!(engine.phase(), CycleState::Terminated);
        assert!(fx
            .infos()
            .iter()
            .any(|m| m == "Waiting 5 seconds before next synchronization."));
    }
}
