//! Keeps a mounted rich surface and the document store in step.
//!
//! Surface edits are committed to the store after a quiet period. Store
//! changes that did not come from this surface are pushed into it with a
//! latch set, so the surface's own change notifications for that
//! replacement are not committed back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::debug;

use crate::convert::MarkupConverter;
use crate::flush::{FlushAck, FlushBus};
use crate::listeners::{ListenerSet, Subscription};
use crate::schedule::{self, Debounce, TaskToken};
use crate::store::{DocumentState, DocumentStore};
use crate::surface::{EditingSurface, SurfaceEvent};

pub const DEFAULT_COMMIT_DEBOUNCE: Duration = Duration::from_millis(450);
pub const DEFAULT_FOCUS_LOSS_DEBOUNCE: Duration = Duration::ZERO;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncTimings {
    /// Quiet period after the last edit before it is committed.
    pub commit_debounce: Duration,
    /// Delay used instead when the surface loses focus with edits pending.
    /// Zero commits right away.
    pub focus_loss_debounce: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            commit_debounce: DEFAULT_COMMIT_DEBOUNCE,
            focus_loss_debounce: DEFAULT_FOCUS_LOSS_DEBOUNCE,
        }
    }
}

type CheckboxListener = dyn Fn() + Send + Sync;

#[derive(Debug, Default)]
struct SyncState {
    applying_external_update: bool,
    pending_local_edit: bool,
    last_synced_markdown: String,
}

/// Mediator between one mounted surface and the store.
///
/// Create with [`SyncCoordinator::attach`] from inside a Tokio runtime; the
/// debounces and the latch release are spawned tasks.
pub struct SyncCoordinator {
    store: DocumentStore,
    surface: Arc<dyn EditingSurface>,
    converter: Arc<dyn MarkupConverter>,
    timings: SyncTimings,
    state: Mutex<SyncState>,
    commit_debounce: Mutex<Debounce>,
    latch_release: Mutex<Option<TaskToken>>,
    checkbox_listeners: Arc<ListenerSet<CheckboxListener>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("timings", &self.timings)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Mount `surface`: show the store's content in it and start listening
    /// to the surface, the store and the flush bus.
    pub fn attach(
        store: &DocumentStore,
        surface: Arc<dyn EditingSurface>,
        converter: Arc<dyn MarkupConverter>,
        flush: &FlushBus,
        timings: SyncTimings,
    ) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            store: store.clone(),
            surface: Arc::clone(&surface),
            converter,
            timings,
            state: Mutex::new(SyncState::default()),
            commit_debounce: Mutex::new(Debounce::default()),
            latch_release: Mutex::new(None),
            checkbox_listeners: Arc::new(ListenerSet::new()),
            subscriptions: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&coordinator);
        surface.connect(Arc::new(move |event: SurfaceEvent| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.handle_event(event);
            }
        }));

        let weak = Arc::downgrade(&coordinator);
        let store_sub = store.subscribe(move |state: &DocumentState| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.apply_store_content(&state.content);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(&coordinator);
        let flush_sub = flush.subscribe(move |ack: FlushAck| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.flush();
            }
            ack.complete();
        });

        coordinator
            .lock_subscriptions()
            .extend([store_sub, flush_sub]);
        coordinator.apply_store_content(&store.content());
        coordinator
    }

    /// Unmount: commit whatever is pending and stop listening.
    pub fn detach(&self) {
        self.flush();
        self.surface.disconnect();
        let subscriptions = std::mem::take(&mut *self.lock_subscriptions());
        drop(subscriptions);
        debug!("surface detached");
    }

    /// Entry point for everything the surface reports.
    pub fn handle_event(self: &Arc<Self>, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Changed { doc_changed: false } => {}
            SurfaceEvent::Changed { doc_changed: true } => {
                {
                    let mut state = self.lock_state();
                    if state.applying_external_update {
                        debug!("ignoring surface change during external update");
                        return;
                    }
                    state.pending_local_edit = true;
                }
                self.schedule_commit(self.timings.commit_debounce);
            }
            SurfaceEvent::FocusLost => {
                if !self.has_pending_local_edit() {
                    return;
                }
                if self.timings.focus_loss_debounce.is_zero() {
                    self.flush();
                } else {
                    self.schedule_commit(self.timings.focus_loss_debounce);
                }
            }
            SurfaceEvent::CheckboxToggled => {
                if self.is_applying_external_update() {
                    return;
                }
                self.lock_commit_debounce().cancel();
                self.commit();
                for listener in self.checkbox_listeners.snapshot() {
                    listener();
                }
            }
        }
    }

    /// Call `listener` after each checkbox toggle has been committed.
    pub fn on_checkbox_commit(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.checkbox_listeners.subscribe(Arc::new(listener))
    }

    /// Commit a pending edit now, skipping the debounce.
    pub fn flush(&self) {
        self.lock_commit_debounce().cancel();
        if self.has_pending_local_edit() {
            self.commit();
        }
    }

    pub fn has_pending_local_edit(&self) -> bool {
        self.lock_state().pending_local_edit
    }

    pub fn is_applying_external_update(&self) -> bool {
        self.lock_state().applying_external_update
    }

    pub fn last_synced_markdown(&self) -> String {
        self.lock_state().last_synced_markdown.clone()
    }

    fn schedule_commit(self: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(self);
        self.lock_commit_debounce().schedule(delay, move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.commit();
            }
        });
    }

    fn commit(&self) {
        let markdown = self.converter.to_markdown(&self.surface.markup());
        {
            let mut state = self.lock_state();
            state.pending_local_edit = false;
            if state.last_synced_markdown == markdown {
                return;
            }
            // Recorded before the store call so the store's synchronous
            // notification is recognised as our own echo.
            state.last_synced_markdown.clone_from(&markdown);
        }
        debug!(len = markdown.len(), "committing surface edit");
        self.store.set_content(markdown);
    }

    fn apply_store_content(self: &Arc<Self>, content: &str) {
        if self.lock_state().last_synced_markdown == content {
            return;
        }

        let expected = self.converter.to_markup(content);
        let current = self.surface.markup();
        if current == expected || self.converter.to_markdown(&current) == content {
            content.clone_into(&mut self.lock_state().last_synced_markdown);
            return;
        }

        self.lock_commit_debounce().cancel();
        {
            let mut state = self.lock_state();
            state.applying_external_update = true;
            state.pending_local_edit = false;
            content.clone_into(&mut state.last_synced_markdown);
        }

        debug!(len = content.len(), "pushing store content into surface");
        self.surface.replace_content(&expected, false);

        // A release left over from an earlier replace must not clear the
        // latch set for this one.
        let weak = Arc::downgrade(self);
        let release = schedule::next_tick(move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.lock_state().applying_external_update = false;
            }
        });
        if let Some(stale) = self.lock_latch_release().replace(release) {
            stale.cancel();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_commit_debounce(&self) -> MutexGuard<'_, Debounce> {
        self.commit_debounce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_latch_release(&self) -> MutexGuard<'_, Option<TaskToken>> {
        self.latch_release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
