//! Cancellable delayed work on the Tokio runtime.
//!
//! Every debounce in the engine goes through here. Cancelling a token aborts
//! the underlying task, so cancelled work never runs, even if its timer has
//! already expired but the task has not been polled yet.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to one scheduled task.
#[derive(Debug)]
pub struct TaskToken {
    handle: JoinHandle<()>,
}

impl TaskToken {
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run `future` as a cancellable background task.
pub fn spawn(future: impl Future<Output = ()> + Send + 'static) -> TaskToken {
    TaskToken {
        handle: tokio::spawn(future),
    }
}

/// Whether the calling thread is inside a Tokio runtime.
pub fn runtime_available() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Run `task` once `delay` has elapsed.
///
/// Must be called from within a Tokio runtime.
pub fn schedule(delay: Duration, task: impl FnOnce() + Send + 'static) -> TaskToken {
    let handle = tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        task();
    });
    TaskToken { handle }
}

/// Run `task` on a later scheduling tick.
///
/// The task yields once before running, so events queued by the caller's
/// current turn are delivered first.
pub fn next_tick(task: impl FnOnce() + Send + 'static) -> TaskToken {
    let handle = tokio::spawn(async move {
        tokio::task::yield_now().await;
        task();
    });
    TaskToken { handle }
}

/// Slot for at most one pending task.
///
/// Scheduling again cancels whatever was pending, which is what coalesces a
/// burst of triggers into one run with the latest state.
#[derive(Debug, Default)]
pub struct Debounce {
    pending: Option<TaskToken>,
}

impl Debounce {
    pub fn schedule(&mut self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        self.cancel();
        self.pending = Some(schedule(delay, task));
    }

    /// Cancel the pending task. Returns whether one was still waiting.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some_and(|token| {
            let waiting = !token.is_finished();
            token.cancel();
            waiting
        })
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|token| !token.is_finished())
    }
}
