use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Lets at most one destructive file operation (new, open, open via drop)
/// run at a time. Later attempts while one is in flight are dropped.
#[derive(Debug, Default)]
pub struct ExclusiveActionGuard {
    busy: AtomicBool,
}

/// Held while an exclusive operation runs; releases the guard on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the lease is dropped"]
pub struct ActionLease<'a> {
    guard: &'a ExclusiveActionGuard,
}

impl Drop for ActionLease<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

impl ExclusiveActionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Option<ActionLease<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ActionLease { guard: self })
    }

    /// Run `action` unless another one is in flight, in which case this is
    /// a silent no-op returning `None`.
    pub async fn run<F: Future>(&self, action: F) -> Option<F::Output> {
        let Some(_lease) = self.try_acquire() else {
            debug!("exclusive action already running, ignoring request");
            return None;
        };
        Some(action.await)
    }
}
