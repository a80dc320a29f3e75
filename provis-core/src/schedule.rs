//! Cancellable delayed callbacks.
//!
//! A [`ScheduledTask`] runs a closure once after a delay unless it is
//! cancelled first. Dropping the handle cancels it.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a callback scheduled on the Tokio runtime.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `f` after `delay`. Must be called from within a Tokio runtime.
    pub fn after<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        Self { handle }
    }

    /// Prevent the callback from running if it has not run yet.
    pub fn cancel(self) {
        drop(self);
    }

    /// True once the callback has run or the task was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
