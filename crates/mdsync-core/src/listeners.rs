//! Listener registry shared by the document store and the flush bus.
//!
//! Callbacks are cloned out of the registry before they run, so a callback
//! may subscribe, unsubscribe, or call back into its owner without
//! deadlocking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

trait Detach: Send + Sync {
    fn detach(&self, id: usize);
}

/// Ordered set of callbacks of one shape.
///
/// Wrap in `Arc` to enable subscriptions.
pub(crate) struct ListenerSet<F: ?Sized> {
    callbacks: RwLock<Vec<(usize, Arc<F>)>>,
    next_id: AtomicUsize,
}

impl<F: ?Sized> Default for ListenerSet<F> {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> ListenerSet<F> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `callback` after every existing listener.
    pub(crate) fn subscribe(self: &Arc<Self>, callback: Arc<F>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));

        let weak: Weak<Self> = Arc::downgrade(self);
        let registry: Weak<dyn Detach> = weak;
        Subscription {
            registry: Some(registry),
            id,
        }
    }

    /// Current callbacks in subscription order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<F: ?Sized + Send + Sync + 'static> Detach for ListenerSet<F> {
    fn detach(&self, id: usize) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(i, _)| *i != id);
    }
}

/// Handle returned by every `subscribe` in this crate.
///
/// Hold it to keep receiving callbacks; drop it or call
/// [`Subscription::unsubscribe`] to stop. Unsubscribing twice is harmless.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Option<Weak<dyn Detach>>,
    id: usize,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.detach(self.id);
        }
    }

    pub const fn is_active(&self) -> bool {
        self.registry.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
