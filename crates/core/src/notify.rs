//! Notification sink for per-operation events.
//!
//! The engine reports every copy, update, delete, folder creation, failure and
//! informational message through a [`Notify`] implementation. The default
//! [`TracingNotifier`] forwards to `tracing`, so whatever subscriber the
//! binary installs (console, log file) receives them.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::models::Operation;

/// Capability the engine calls into for user-visible events.
pub trait Notify: Send + Sync {
    fn notify(&self, op: Operation, message: &str);
}

/// Forwards notifications as `tracing` events with an `op` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notify for TracingNotifier {
    fn notify(&self, op: Operation, message: &str) {
        match op {
            Operation::Fail => warn!(target: "foldersync", op = %op, "{}", message),
            _ => info!(target: "foldersync", op = %op, "{}", message),
        }
    }
}

/// Keeps every notification in memory, in order.
///
/// Useful for embedding the engine in something that renders its own
/// activity feed, and for tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<(Operation, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far.
    pub fn events(&self) -> Vec<(Operation, String)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of events with the given operation kind.
    pub fn count(&self, op: Operation) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(o, _)| *o == op)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Notify for MemoryNotifier {
    fn notify(&self, op: Operation, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((op, message.to_string()));
    }
}

impl<T: Notify + ?Sized> Notify for std::sync::Arc<T> {
    fn notify(&self, op: Operation, message: &str) {
        (**self).notify(op, message)
    }
}
