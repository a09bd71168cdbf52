use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// One-way completion latch.
///
/// Set exactly once per search; repeated signals are idempotent. Safe to
/// await from the client polling path while node callbacks mutate collector
/// state concurrently.
#[derive(Default)]
pub struct CompletionState {
    complete: AtomicBool,
    notify: Notify,
}

impl CompletionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn signal(&self) {
        if !self.complete.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Blocks until the latch is signalled.
    pub async fn await_completion(&self) {
        loop {
            if self.is_complete() {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the re-check so a concurrent signal cannot slip
            // between the check and the await.
            notified.as_mut().enable();
            if self.is_complete() {
                return;
            }
            notified.await;
        }
    }

    /// Blocks until signalled or `timeout` elapses. Returns whether the latch
    /// was signalled.
    pub async fn await_completion_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_completion())
            .await
            .is_ok()
    }
}
