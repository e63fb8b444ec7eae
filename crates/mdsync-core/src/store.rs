//! The canonical document: markdown content, file identity, dirty flag.
//!
//! Every other component reads the document through snapshots or
//! notifications and changes it only through the operations here.
//! Listeners run synchronously after each committed mutation, in
//! subscription order, with no store lock held.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::listeners::{ListenerSet, Subscription};
use crate::schedule::{self, Debounce};
use crate::stats::{DocumentStats, compute_stats};

pub const DEFAULT_STATS_DEBOUNCE: Duration = Duration::from_millis(120);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// WYSIWYG surface backed by markup.
    #[default]
    Rich,
    /// Plain markdown text editor.
    Plain,
}

impl ViewMode {
    pub const fn toggle(self) -> Self {
        match self {
            Self::Rich => Self::Plain,
            Self::Plain => Self::Rich,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Rich => "Rich text",
            Self::Plain => "Markdown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentState {
    pub content: String,
    pub current_file_path: Option<PathBuf>,
    pub has_unsaved_changes: bool,
    pub view_mode: ViewMode,
    /// May lag `content` by the stats debounce window.
    pub stats: DocumentStats,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            content: String::new(),
            current_file_path: None,
            has_unsaved_changes: false,
            view_mode: ViewMode::default(),
            stats: DocumentStats::EMPTY,
        }
    }
}

impl DocumentState {
    pub fn title(&self) -> Cow<'_, str> {
        self.current_file_path
            .as_ref()
            .and_then(|path| path.file_name())
            .map_or_else(|| Cow::Borrowed("Untitled"), |name| name.to_string_lossy())
    }

    pub fn path_label(&self) -> Cow<'_, str> {
        self.current_file_path
            .as_ref()
            .map_or_else(|| Cow::Borrowed("Unsaved"), |path| path.to_string_lossy())
    }

    pub fn window_title(&self) -> String {
        format!(
            "mdsync — {}{}",
            self.title(),
            if self.has_unsaved_changes { "*" } else { "" }
        )
    }

    pub fn path(&self) -> Option<&Path> {
        self.current_file_path.as_deref()
    }
}

type StateListener = dyn Fn(&DocumentState) + Send + Sync;

struct StoreInner {
    state: Mutex<DocumentState>,
    stats_debounce: Mutex<Debounce>,
    stats_delay: Duration,
    listeners: Arc<ListenerSet<StateListener>>,
}

/// Shared handle to the canonical document. Clones refer to the same store.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("DocumentStore")
            .field("path", &state.current_file_path)
            .field("len", &state.content.len())
            .field("dirty", &state.has_unsaved_changes)
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::with_stats_debounce(DEFAULT_STATS_DEBOUNCE)
    }

    /// A zero delay recomputes stats inline with every content change.
    pub fn with_stats_debounce(stats_delay: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(DocumentState::default()),
                stats_debounce: Mutex::new(Debounce::default()),
                stats_delay,
                listeners: Arc::new(ListenerSet::new()),
            }),
        }
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&DocumentState) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Arc<StateListener> = Arc::new(listener);
        self.inner.listeners.subscribe(listener)
    }

    pub fn snapshot(&self) -> DocumentState {
        self.lock_state().clone()
    }

    pub fn content(&self) -> String {
        self.lock_state().content.clone()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.lock_state().has_unsaved_changes
    }

    pub fn current_file_path(&self) -> Option<PathBuf> {
        self.lock_state().current_file_path.clone()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.lock_state().view_mode
    }

    pub fn stats(&self) -> DocumentStats {
        self.lock_state().stats
    }

    /// Replace the markdown after an edit. Returns whether anything changed.
    pub fn set_content(&self, markdown: impl Into<String>) -> bool {
        let markdown = markdown.into();
        let immediate = self.stats_are_immediate();

        let snapshot = {
            let mut state = self.lock_state();
            if state.content == markdown {
                debug!("set_content: content unchanged, skipping");
                return false;
            }
            state.content = markdown;
            state.has_unsaved_changes = true;
            if immediate {
                state.stats = compute_stats(&state.content);
            }
            state.clone()
        };

        if !immediate {
            self.schedule_stats();
        }
        self.notify(&snapshot);
        true
    }

    /// Load a document read from `path`. The result is clean.
    pub fn open_document(&self, path: impl Into<PathBuf>, markdown: impl Into<String>) {
        self.replace_document(Some(path.into()), markdown.into());
    }

    /// Start a fresh, untitled, empty document.
    pub fn new_document(&self) {
        self.replace_document(None, String::new());
    }

    /// Record that the current content was persisted to `path`.
    pub fn save_completed(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let snapshot = {
            let mut state = self.lock_state();
            if !state.has_unsaved_changes && state.current_file_path.as_ref() == Some(&path) {
                return;
            }
            state.current_file_path = Some(path);
            state.has_unsaved_changes = false;
            state.clone()
        };
        self.notify(&snapshot);
    }

    /// Change only the file identity. A changed identity no longer matches
    /// what was persisted, so the document becomes dirty.
    pub fn set_current_file(&self, path: Option<PathBuf>) {
        let snapshot = {
            let mut state = self.lock_state();
            if state.current_file_path == path {
                return;
            }
            state.current_file_path = path;
            state.has_unsaved_changes = true;
            state.clone()
        };
        self.notify(&snapshot);
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        let snapshot = {
            let mut state = self.lock_state();
            if state.view_mode == mode {
                return;
            }
            state.view_mode = mode;
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn replace_document(&self, path: Option<PathBuf>, content: String) {
        self.lock_debounce().cancel();

        let snapshot = {
            let mut state = self.lock_state();
            state.stats = compute_stats(&content);
            state.content = content;
            state.current_file_path = path;
            state.has_unsaved_changes = false;
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn stats_are_immediate(&self) -> bool {
        self.inner.stats_delay.is_zero() || !schedule::runtime_available()
    }

    fn schedule_stats(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.lock_debounce()
            .schedule(self.inner.stats_delay, move || {
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.recompute_stats();
                }
            });
    }

    fn recompute_stats(&self) {
        let snapshot = {
            let mut state = self.lock_state();
            let stats = compute_stats(&state.content);
            if state.stats == stats {
                return;
            }
            state.stats = stats;
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &DocumentState) {
        for listener in self.inner.listeners.snapshot() {
            listener(snapshot);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DocumentState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_debounce(&self) -> MutexGuard<'_, Debounce> {
        self.inner
            .stats_debounce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording(store: &DocumentStore) -> (Arc<Mutex<Vec<DocumentState>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sub = store.subscribe(move |state| {
            seen_clone
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(state.clone());
        });
        (seen, sub)
    }

    fn seen_len(seen: &Mutex<Vec<DocumentState>>) -> usize {
        seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[test]
    fn set_content_marks_dirty_and_notifies_full_state() {
        let store = DocumentStore::new();
        let (seen, _sub) = recording(&store);

        assert!(store.set_content("hello world"));

        let seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].content, "hello world");
        assert!(seen[0].has_unsaved_changes);
        assert_eq!(seen[0].stats.word_count, 2);
    }

    #[test]
    fn identical_set_content_notifies_once() {
        let store = DocumentStore::new();
        let (seen, _sub) = recording(&store);

        assert!(store.set_content("same"));
        assert!(!store.set_content("same"));

        assert_eq!(seen_len(&seen), 1);
    }

    #[test]
    fn open_document_replaces_content_and_clears_dirty() {
        let store = DocumentStore::new();
        store.set_content("draft");

        store.open_document("/notes/a.md", "# A\n\nbody");

        let state = store.snapshot();
        assert_eq!(state.content, "# A\n\nbody");
        assert_eq!(state.path(), Some(Path::new("/notes/a.md")));
        assert!(!state.has_unsaved_changes);
        assert_eq!(state.stats.line_count, 3);
    }

    #[test]
    fn new_document_resets_to_empty_untitled() {
        let store = DocumentStore::new();
        store.open_document("/notes/a.md", "text");
        store.set_content("edited");

        store.new_document();

        let state = store.snapshot();
        assert_eq!(state.content, "");
        assert!(state.current_file_path.is_none());
        assert!(!state.has_unsaved_changes);
        assert_eq!(state.stats, DocumentStats::EMPTY);
    }

    #[test]
    fn save_completed_clears_flag_without_touching_content() {
        let store = DocumentStore::new();
        store.set_content("unsaved text");

        store.save_completed("/tmp/out.md");

        let state = store.snapshot();
        assert_eq!(state.content, "unsaved text");
        assert_eq!(state.path(), Some(Path::new("/tmp/out.md")));
        assert!(!state.has_unsaved_changes);
    }

    #[test]
    fn set_current_file_changes_identity_and_marks_dirty() {
        let store = DocumentStore::new();
        store.open_document("/a.md", "x");
        let (seen, _sub) = recording(&store);

        store.set_current_file(None);
        store.set_current_file(None);

        assert_eq!(seen_len(&seen), 1);
        assert!(store.has_unsaved_changes());
        assert!(store.current_file_path().is_none());
    }

    #[test]
    fn set_view_mode_notifies_only_on_change() {
        let store = DocumentStore::new();
        let (seen, _sub) = recording(&store);

        store.set_view_mode(ViewMode::Rich);
        store.set_view_mode(ViewMode::Plain);

        assert_eq!(seen_len(&seen), 1);
        assert_eq!(store.view_mode(), ViewMode::Plain);

        store.set_view_mode(store.view_mode().toggle());
        assert_eq!(store.view_mode(), ViewMode::Rich);
        assert_eq!(store.view_mode().label(), "Rich text");
    }

    #[test]
    fn listeners_may_read_the_store_while_notified() {
        let store = DocumentStore::new();
        let reader = store.clone();
        let lengths = Arc::new(AtomicUsize::new(0));
        let lengths_clone = Arc::clone(&lengths);
        let _sub = store.subscribe(move |_| {
            lengths_clone.store(reader.content().len(), Ordering::SeqCst);
        });

        store.set_content("four");

        assert_eq!(lengths.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let store = DocumentStore::new();
        let (seen, mut sub) = recording(&store);

        store.set_content("one");
        sub.unsubscribe();
        sub.unsubscribe();
        store.set_content("two");

        assert_eq!(seen_len(&seen), 1);
    }

    #[test]
    fn document_titles() {
        let mut state = DocumentState::default();
        assert_eq!(state.title(), "Untitled");
        assert_eq!(state.path_label(), "Unsaved");
        assert_eq!(state.window_title(), "mdsync — Untitled");

        state.current_file_path = Some(PathBuf::from("/docs/notes.md"));
        state.has_unsaved_changes = true;
        assert_eq!(state.title(), "notes.md");
        assert_eq!(state.window_title(), "mdsync — notes.md*");
    }

    #[tokio::test(start_paused = true)]
    async fn stats_recompute_is_debounced_and_settles_exactly() {
        let store = DocumentStore::new();
        let (seen, _sub) = recording(&store);

        store.set_content("a");
        store.set_content("a b");
        store.set_content("hello world");
        assert_eq!(store.stats(), DocumentStats::EMPTY);

        tokio::time::sleep(DEFAULT_STATS_DEBOUNCE + Duration::from_millis(5)).await;

        assert_eq!(
            store.stats(),
            DocumentStats {
                line_count: 1,
                word_count: 2,
                character_count: 11,
            }
        );
        // Three content changes plus a single coalesced stats update.
        assert_eq!(seen_len(&seen), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn open_document_cancels_pending_stats_recompute() {
        let store = DocumentStore::new();
        store.set_content("pending words here");
        store.open_document("/a.md", "one");
        let (seen, _sub) = recording(&store);

        tokio::time::sleep(DEFAULT_STATS_DEBOUNCE * 2).await;

        assert_eq!(store.stats().word_count, 1);
        assert_eq!(seen_len(&seen), 0);
    }
}
