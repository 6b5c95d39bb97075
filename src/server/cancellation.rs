//! Cancellation Registry — process-wide set of cancelled task ids.
//!
//! `tasks/cancel` inserts a task id here before persisting the `canceled`
//! status; any in-flight [`AgentExecutor`](super::AgentExecutor)
//! holding a [`RequestContext`](super::RequestContext) can cooperatively poll
//! [`RequestContext::is_cancelled`] at its own suspension points, the same
//! way `task_updater.rs`'s `TaskUpdater` is handed to a Handler to publish
//! status transitions.
//!
//! This is a cooperative signal, not a forceful one — [`DefaultRequestHandler`](
//! super::request_handler::DefaultRequestHandler) additionally aborts the
//! executor's `JoinHandle` as a backstop for Handlers that never check.

use std::collections::HashSet;
use std::sync::RwLock;

/// Process-wide set of task ids that have been asked to cancel.
///
/// Grounded on the same `RwLock`-guarded-collection shape used throughout
/// `server/task_store.rs` and `server/event_queue.rs`, but `std::sync::RwLock`
/// rather than `tokio::sync::RwLock` — membership checks are meant to be
/// called from a Handler's synchronous suspension points without forcing
/// an `.await`, and critical sections here are a single hash lookup.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    cancelled: RwLock<HashSet<String>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `task_id` as cancelled.
    pub fn add(&self, task_id: &str) {
        self.cancelled
            .write()
            .expect("cancellation registry lock poisoned")
            .insert(task_id.to_string());
    }

    /// Clear the cancellation mark for `task_id`.
    ///
    /// Called once a task has actually reached a terminal state, so a
    /// later task reusing the same id (after a terminal-state reset to
    /// `submitted`, spec I2) doesn't start out pre-cancelled.
    pub fn remove(&self, task_id: &str) {
        self.cancelled
            .write()
            .expect("cancellation registry lock poisoned")
            .remove(task_id);
    }

    /// Whether `task_id` has been marked cancelled.
    pub fn contains(&self, task_id: &str) -> bool {
        self.cancelled
            .read()
            .expect("cancellation registry lock poisoned")
            .contains(task_id)
    }
}
