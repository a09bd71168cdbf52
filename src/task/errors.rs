use parking_lot::Mutex;
use std::sync::Arc;

/// Task-scoped error channel.
///
/// Producers push error strings as they encounter per-shard or per-row
/// faults; the result sender drains the queue on each tick and ships the
/// snapshot back to the requesting node. Draining is destructive, so a given
/// error string is delivered exactly once.
#[derive(Clone, Default)]
pub struct ErrorQueue {
    inner: Arc<Mutex<Vec<String>>>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("Search error: {}", message);
        self.inner.lock().push(message);
    }

    /// Takes all currently queued errors, leaving the queue empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
