//! Pause and cancel signalling between the control sources and the engine.
//!
//! [`SyncControl`] is a cheap, cloneable handle around a `tokio::sync::watch`
//! channel. Control sources (keyboard listener, OS signals) flip the flags;
//! the engine waits on them at its checkpoints without polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::SyncError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    paused: bool,
    cancelled: bool,
}

/// Shared pause/cancel flags.
#[derive(Debug, Clone)]
pub struct SyncControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl Default for SyncControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn is_paused(&self) -> bool {
        self.tx.borrow().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().cancelled
    }

    pub fn pause(&self) {
        self.tx.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        self.tx.send_modify(|s| s.paused = false);
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_pause(&self) -> bool {
        let mut now_paused = false;
        self.tx.send_modify(|s| {
            s.paused = !s.paused;
            now_paused = s.paused;
        });
        now_paused
    }

    /// Request termination. Irreversible.
    pub fn cancel(&self) {
        self.tx.send_modify(|s| s.cancelled = true);
    }

    /// Checkpoint: returns once not paused, or `Cancelled` if termination
    /// was requested before or while waiting.
    pub async fn checkpoint(&self) -> Result<(), SyncError> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|s| s.cancelled || !s.paused)
            .await
            .map_err(|_| SyncError::Cancelled)?;
        if state.cancelled {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Sleep that wakes early on cancel. Pausing does not stretch it.
    ///
    /// Used for retry back-off, where the step retries regardless of pause.
    pub async fn sleep(&self, duration: Duration) -> Result<(), SyncError> {
        let mut rx = self.tx.subscribe();
        if rx.borrow_and_update().cancelled {
            return Err(SyncError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = rx.wait_for(|s| s.cancelled) => Err(SyncError::Cancelled),
        }
    }

    /// Interval wait in which paused time does not count.
    ///
    /// While paused the remaining time is frozen; on resume the countdown
    /// continues. Cancel ends the wait immediately.
    pub async fn cooldown(&self, duration: Duration) -> Result<(), SyncError> {
        let mut rx = self.tx.subscribe();
        let mut remaining = duration;

        loop {
            let state = *rx.borrow_and_update();
            if state.cancelled {
                return Err(SyncError::Cancelled);
            }

            if state.paused {
                debug!(remaining_ms = remaining.as_millis() as u64, "cooldown paused");
                self.checkpoint().await?;
                continue;
            }

            if remaining.is_zero() {
                return Ok(());
            }

            let started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(SyncError::Cancelled);
                    }
                    remaining = remaining.saturating_sub(started.elapsed());
                }
            }
        }
    }
}
