//! User-facing file operations on one editor window.
//!
//! Everything that could throw away unsaved work goes through
//! [`EditorSession::confirm_unsaved_changes`], and new/open/drop are
//! additionally serialized by an [`ExclusiveActionGuard`]. Operations report
//! success as a `bool`; the reason for a failure is kept in
//! [`EditorSession::last_error`].

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::EditorConfig;
use crate::convert::{HtmlConverter, MarkupConverter};
use crate::disk_io::is_markdown_file;
use crate::error::PersistenceError;
use crate::flush::{FlushBus, FlushOutcome};
use crate::gate::{Decision, UnsavedChangesGate};
use crate::guard::ExclusiveActionGuard;
use crate::launch::LaunchOptions;
use crate::listeners::Subscription;
use crate::persistence::{FileContent, Persistence};
use crate::schedule::{self, TaskToken};
use crate::store::{DocumentStore, ViewMode};
use crate::surface::EditingSurface;
use crate::sync::SyncCoordinator;

/// How long autosave waits after a checkbox toggle before saving.
pub const CHECKBOX_SAVE_DELAY: Duration = Duration::from_millis(100);

/// A file dropped onto the window. Drops from some sources carry the text
/// but no path on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DroppedFile {
    pub name: String,
    pub path: Option<PathBuf>,
    pub contents: Option<String>,
}

impl DroppedFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path: Some(path),
            contents: None,
        }
    }

    pub fn from_contents(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            contents: Some(contents.into()),
        }
    }
}

pub struct EditorSession {
    store: DocumentStore,
    gate: UnsavedChangesGate,
    guard: ExclusiveActionGuard,
    flush: FlushBus,
    persistence: Arc<dyn Persistence>,
    converter: Arc<dyn MarkupConverter>,
    config: EditorConfig,
    mounted: Mutex<Option<MountedSurface>>,
    checkbox_toggled: Arc<Notify>,
    last_error: Mutex<Option<String>>,
}

struct MountedSurface {
    coordinator: Arc<SyncCoordinator>,
    _checkbox: Subscription,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("store", &self.store)
            .field("gate", &self.gate)
            .field("surface_mounted", &self.has_surface())
            .field("last_error", &self.last_error())
            .finish_non_exhaustive()
    }
}

impl EditorSession {
    pub fn new(persistence: Arc<dyn Persistence>, config: EditorConfig) -> Self {
        let store = DocumentStore::with_stats_debounce(config.stats_debounce());
        store.set_view_mode(config.view.default_mode);

        Self {
            store,
            gate: UnsavedChangesGate::new(),
            guard: ExclusiveActionGuard::new(),
            flush: FlushBus::with_timeout(config.sync.flush_timeout()),
            persistence,
            converter: Arc::new(HtmlConverter::new()),
            config,
            mounted: Mutex::new(None),
            checkbox_toggled: Arc::new(Notify::new()),
            last_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn MarkupConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// The prompt the UI renders and resolves.
    pub const fn gate(&self) -> &UnsavedChangesGate {
        &self.gate
    }

    pub const fn flush_bus(&self) -> &FlushBus {
        &self.flush
    }

    pub const fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Message of the last failed operation, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.lock_error().clone()
    }

    /// Apply startup options: view mode, then the startup file if it is
    /// markdown.
    pub async fn open_startup(&self, options: &LaunchOptions) -> bool {
        self.set_view_mode(options.view_mode.unwrap_or(self.config.view.default_mode));

        let Some(path) = options.path.as_deref() else {
            return true;
        };
        if !is_markdown_file(path) {
            warn!(path = %path.display(), "ignoring non-markdown startup file");
            self.record_error(
                "Open failed",
                PersistenceError::NotMarkdown(path.to_path_buf()),
            );
            return false;
        }
        self.open_path(path).await
    }

    pub async fn new_file(&self) -> bool {
        self.guard
            .run(async {
                if !self.confirm_unsaved_changes("create a new file").await {
                    return false;
                }
                self.store.new_document();
                self.clear_error();
                info!("started new document");
                true
            })
            .await
            .unwrap_or(false)
    }

    /// Pick a file and open it.
    pub async fn open_file(&self) -> bool {
        self.guard
            .run(async {
                if !self.confirm_unsaved_changes("open another file").await {
                    return false;
                }
                match self.persistence.open().await {
                    Ok(Some(file)) => {
                        self.load(file);
                        true
                    }
                    Ok(None) => {
                        debug!("open cancelled");
                        false
                    }
                    Err(err) => {
                        self.record_error("Open failed", err);
                        false
                    }
                }
            })
            .await
            .unwrap_or(false)
    }

    pub async fn open_path(&self, path: &Path) -> bool {
        self.guard
            .run(async {
                if !self.confirm_unsaved_changes("open another file").await {
                    return false;
                }
                self.read_and_load(path).await
            })
            .await
            .unwrap_or(false)
    }

    /// Open a file dropped onto the window. Only markdown files are taken.
    pub async fn open_dropped(&self, dropped: DroppedFile) -> bool {
        let is_markdown = dropped
            .path
            .as_deref()
            .map_or_else(|| is_markdown_file(Path::new(&dropped.name)), is_markdown_file);
        if !is_markdown {
            debug!(name = %dropped.name, "ignoring dropped non-markdown file");
            return false;
        }

        self.guard
            .run(async {
                if !self.confirm_unsaved_changes("open the dropped file").await {
                    return false;
                }
                match (dropped.path.as_deref(), dropped.contents.as_deref()) {
                    (Some(path), _) => self.read_and_load(path).await,
                    (None, Some(contents)) => {
                        // No file behind it: import as an untitled, unsaved document.
                        self.store.set_current_file(None);
                        self.store.set_content(contents);
                        self.clear_error();
                        info!(name = %dropped.name, "imported dropped file");
                        true
                    }
                    (None, None) => {
                        self.record_error(
                            "Open failed",
                            format!("Dropped file {} has no contents", dropped.name),
                        );
                        false
                    }
                }
            })
            .await
            .unwrap_or(false)
    }

    /// Save to the current path, or ask for one if the document is untitled.
    pub async fn save(&self) -> bool {
        self.flush_pending().await;
        let snapshot = self.store.snapshot();
        match snapshot.current_file_path {
            Some(path) => self.write_to(path, snapshot.content).await,
            None => self.pick_and_write(snapshot.content).await,
        }
    }

    pub async fn save_as(&self) -> bool {
        self.flush_pending().await;
        self.pick_and_write(self.store.content()).await
    }

    /// Whether the window may close now.
    pub async fn request_close(&self) -> bool {
        self.confirm_unsaved_changes("close the window").await
    }

    /// Ask before an action that would replace the document.
    ///
    /// A clean document proceeds. Otherwise the user decides: cancel stops,
    /// discard proceeds, save proceeds only once the document is saved.
    pub async fn confirm_unsaved_changes(&self, action: &str) -> bool {
        self.flush_pending().await;
        if !self.store.has_unsaved_changes() {
            return true;
        }

        match self.gate.request_decision(action).await {
            Decision::Cancel => {
                debug!(action, "unsaved changes prompt cancelled");
                false
            }
            Decision::Discard => {
                debug!(action, "discarding unsaved changes");
                true
            }
            Decision::Save => self.save().await && !self.store.has_unsaved_changes(),
        }
    }

    /// Mount a rich surface, replacing any surface already mounted.
    pub fn mount_surface(&self, surface: Arc<dyn EditingSurface>) -> Arc<SyncCoordinator> {
        self.unmount_surface();
        let coordinator = SyncCoordinator::attach(
            &self.store,
            surface,
            Arc::clone(&self.converter),
            &self.flush,
            self.config.sync.timings(),
        );
        let toggled = Arc::clone(&self.checkbox_toggled);
        let checkbox = coordinator.on_checkbox_commit(move || toggled.notify_one());
        *self.lock_mounted() = Some(MountedSurface {
            coordinator: Arc::clone(&coordinator),
            _checkbox: checkbox,
        });
        coordinator
    }

    /// Commit the mounted surface's pending edit and detach it.
    pub fn unmount_surface(&self) {
        let mounted = self.lock_mounted().take();
        if let Some(mounted) = mounted {
            mounted.coordinator.detach();
        }
    }

    pub fn has_surface(&self) -> bool {
        self.lock_mounted().is_some()
    }

    /// Switching to plain markdown unmounts the rich surface. The host
    /// mounts a surface again when switching back.
    pub fn set_view_mode(&self, mode: ViewMode) {
        if mode == ViewMode::Plain {
            self.unmount_surface();
        }
        self.store.set_view_mode(mode);
    }

    pub async fn recent_files(&self) -> Vec<PathBuf> {
        self.persistence.recent_files().await.unwrap_or_else(|err| {
            warn!("failed to load recent files: {err}");
            Vec::new()
        })
    }

    /// Save a dirty document that already has a path. Untitled documents
    /// are left alone.
    pub async fn autosave_now(&self) -> bool {
        self.flush_pending().await;
        if !self.store.has_unsaved_changes() || self.store.current_file_path().is_none() {
            return false;
        }
        debug!("autosaving");
        self.save().await
    }

    /// Start autosave, if enabled: periodically, and shortly after every
    /// checkbox toggle in the rich surface. Cancel the token to stop it.
    pub fn spawn_autosave(self: &Arc<Self>) -> Option<TaskToken> {
        let autosave = &self.config.autosave;
        if !autosave.enabled {
            return None;
        }
        let interval = autosave.interval();
        if interval.is_zero() {
            warn!("autosave interval is zero, autosave disabled");
            return None;
        }

        let weak = Arc::downgrade(self);
        let toggled = Arc::clone(&self.checkbox_toggled);
        Some(schedule::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = toggled.notified() => tokio::time::sleep(CHECKBOX_SAVE_DELAY).await,
                }
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.autosave_now().await;
            }
        }))
    }

    async fn flush_pending(&self) -> FlushOutcome {
        self.flush.request().await
    }

    async fn read_and_load(&self, path: &Path) -> bool {
        match self.persistence.open_path(path).await {
            Ok(file) => {
                self.load(file);
                true
            }
            Err(err) => {
                self.record_error("Open failed", err);
                false
            }
        }
    }

    fn load(&self, file: FileContent) {
        self.store.open_document(file.path, file.content);
        self.clear_error();
    }

    async fn pick_and_write(&self, content: String) -> bool {
        match self.persistence.save_as(&content).await {
            Ok(Some(path)) => {
                self.mark_saved(path, &content);
                true
            }
            Ok(None) => {
                debug!("save as cancelled");
                false
            }
            Err(err) => {
                self.record_error("Save failed", err);
                false
            }
        }
    }

    async fn write_to(&self, path: PathBuf, content: String) -> bool {
        match self.persistence.save(&path, &content).await {
            Ok(()) => {
                self.mark_saved(path, &content);
                true
            }
            Err(err) => {
                self.record_error("Save failed", err);
                false
            }
        }
    }

    fn mark_saved(&self, path: PathBuf, saved: &str) {
        // Edits that landed while the write was in flight keep the
        // document dirty.
        if self.store.content() == saved {
            self.store.save_completed(path);
        } else {
            self.store.set_current_file(Some(path));
        }
        self.clear_error();
    }

    fn record_error(&self, context: &str, err: impl Display) {
        let message = format!("{context}: {err}");
        error!("{message}");
        *self.lock_error() = Some(message);
    }

    fn clear_error(&self) {
        self.lock_error().take();
    }

    fn lock_error(&self) -> MutexGuard<'_, Option<String>> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mounted(&self) -> MutexGuard<'_, Option<MountedSurface>> {
        self.mounted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
