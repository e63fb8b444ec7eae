//! Broadcast "commit your pending edits now" with a bounded wait.
//!
//! Saves call [`FlushBus::request`] first so that edits still sitting in a
//! surface debounce reach the store before the content is written out.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::listeners::{ListenerSet, Subscription};

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(180);

/// Acknowledgement slot handed to each flush listener.
///
/// Call [`FlushAck::complete`] once pending work is committed. Dropping the
/// ack without completing also counts as done.
#[derive(Debug)]
pub struct FlushAck {
    responder: oneshot::Sender<()>,
}

impl FlushAck {
    pub fn complete(self) {
        // The requester may already have timed out.
        let _ = self.responder.send(());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    Completed,
    TimedOut,
}

type FlushListener = dyn Fn(FlushAck) + Send + Sync;

#[derive(Clone)]
pub struct FlushBus {
    listeners: Arc<ListenerSet<FlushListener>>,
    timeout: Duration,
}

impl Default for FlushBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlushBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushBus")
            .field("listeners", &self.listeners.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FlushBus {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FLUSH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            listeners: Arc::new(ListenerSet::new()),
            timeout,
        }
    }

    pub fn subscribe(&self, listener: impl Fn(FlushAck) + Send + Sync + 'static) -> Subscription {
        let listener: Arc<FlushListener> = Arc::new(listener);
        self.listeners.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Ask every listener to flush and wait for all of them, or for the
    /// timeout, whichever comes first.
    pub async fn request(&self) -> FlushOutcome {
        let listeners = self.listeners.snapshot();
        if listeners.is_empty() {
            debug!("flush requested with no listeners");
            return FlushOutcome::Completed;
        }

        let mut acks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let (responder, ack) = oneshot::channel();
            listener(FlushAck { responder });
            acks.push(ack);
        }

        match tokio::time::timeout(self.timeout, join_all(acks)).await {
            Ok(_) => FlushOutcome::Completed,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis(),
                    "flush timed out waiting for listeners"
                );
                FlushOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn no_listeners_completes_immediately() {
        let bus = FlushBus::new();
        let started = tokio::time::Instant::now();
        assert_eq!(bus.request().await, FlushOutcome::Completed);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_every_listener() {
        let bus = FlushBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut subs = Vec::new();
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            subs.push(bus.subscribe(move |ack: FlushAck| {
                calls.fetch_add(1, Ordering::SeqCst);
                ack.complete();
            }));
        }

        assert_eq!(bus.request().await, FlushOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn late_ack_within_timeout_completes() {
        let bus = FlushBus::new();
        let _sub = bus.subscribe(|ack: FlushAck| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ack.complete();
            });
        });

        let started = tokio::time::Instant::now();
        assert_eq!(bus.request().await, FlushOutcome::Completed);
        assert_eq!(started.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_listener_times_out() {
        let bus = FlushBus::with_timeout(Duration::from_millis(100));
        let parked = Arc::new(Mutex::new(Vec::new()));
        let parked_clone = Arc::clone(&parked);
        let _sub = bus.subscribe(move |ack: FlushAck| {
            parked_clone
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(ack);
        });

        let started = tokio::time::Instant::now();
        assert_eq!(bus.request().await, FlushOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_ack_counts_as_done() {
        let bus = FlushBus::new();
        let _sub = bus.subscribe(drop);
        assert_eq!(bus.request().await, FlushOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribed_listener_is_not_asked() {
        let bus = FlushBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let sub = bus.subscribe(move |ack: FlushAck| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            ack.complete();
        });
        drop(sub);

        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.request().await, FlushOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
