//! The rich editing surface as the sync engine sees it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Notifications a surface raises while the user works in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A transaction was applied. `doc_changed` is false for selection-only
    /// transactions.
    Changed { doc_changed: bool },
    FocusLost,
    /// A task-list checkbox was clicked.
    CheckboxToggled,
}

pub type EventSink = Arc<dyn Fn(SurfaceEvent) + Send + Sync>;

pub trait EditingSurface: Send + Sync {
    /// The current document as markup.
    fn markup(&self) -> String;

    /// Replace the whole document. With `emit_update` false the surface
    /// should not report the replacement as a change, though some surfaces
    /// do anyway.
    fn replace_content(&self, markup: &str, emit_update: bool);

    /// Route events to `sink`, replacing any previous sink.
    fn connect(&self, sink: EventSink);

    fn disconnect(&self);
}

/// In-memory surface for headless use and tests.
///
/// The `edit`/`blur`/`toggle_checkbox` methods stand in for user input and
/// raise the matching events synchronously.
pub struct MemorySurface {
    markup: Mutex<String>,
    sink: Mutex<Option<EventSink>>,
    echo_replacements: bool,
    replacements: AtomicUsize,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySurface")
            .field("markup_len", &self.lock_markup().len())
            .field("echo_replacements", &self.echo_replacements)
            .field("replacements", &self.replacement_count())
            .finish()
    }
}

impl MemorySurface {
    pub fn new() -> Self {
        Self {
            markup: Mutex::new(String::new()),
            sink: Mutex::new(None),
            echo_replacements: false,
            replacements: AtomicUsize::new(0),
        }
    }

    /// A surface that reports every programmatic replacement as a document
    /// change, even when asked not to.
    pub fn echoing() -> Self {
        Self {
            echo_replacements: true,
            ..Self::new()
        }
    }

    /// The user typed: the document now reads `markup`.
    pub fn edit(&self, markup: impl Into<String>) {
        *self.lock_markup() = markup.into();
        self.emit(SurfaceEvent::Changed { doc_changed: true });
    }

    /// The user moved the cursor without changing the document.
    pub fn select(&self) {
        self.emit(SurfaceEvent::Changed { doc_changed: false });
    }

    pub fn blur(&self) {
        self.emit(SurfaceEvent::FocusLost);
    }

    pub fn toggle_checkbox(&self, markup: impl Into<String>) {
        *self.lock_markup() = markup.into();
        self.emit(SurfaceEvent::CheckboxToggled);
    }

    /// How many times the document was replaced programmatically.
    pub fn replacement_count(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.lock_sink().is_some()
    }

    fn emit(&self, event: SurfaceEvent) {
        let sink = self.lock_sink().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    fn lock_markup(&self) -> MutexGuard<'_, String> {
        self.markup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Option<EventSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EditingSurface for MemorySurface {
    fn markup(&self) -> String {
        self.lock_markup().clone()
    }

    fn replace_content(&self, markup: &str, emit_update: bool) {
        *self.lock_markup() = markup.to_owned();
        self.replacements.fetch_add(1, Ordering::SeqCst);
        if emit_update || self.echo_replacements {
            self.emit(SurfaceEvent::Changed { doc_changed: true });
        }
    }

    fn connect(&self, sink: EventSink) {
        *self.lock_sink() = Some(sink);
    }

    fn disconnect(&self) {
        self.lock_sink().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(surface: &MemorySurface) -> Arc<Mutex<Vec<SurfaceEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        surface.connect(Arc::new(move |event: SurfaceEvent| {
            seen_clone
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }));
        seen
    }

    fn events(seen: &Mutex<Vec<SurfaceEvent>>) -> Vec<SurfaceEvent> {
        seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[test]
    fn user_input_updates_markup_and_emits() {
        let surface = MemorySurface::new();
        let seen = recording(&surface);

        surface.edit("<p>a</p>");
        surface.select();
        surface.blur();
        surface.toggle_checkbox("<p>b</p>");

        assert_eq!(surface.markup(), "<p>b</p>");
        assert_eq!(
            events(&seen),
            vec![
                SurfaceEvent::Changed { doc_changed: true },
                SurfaceEvent::Changed { doc_changed: false },
                SurfaceEvent::FocusLost,
                SurfaceEvent::CheckboxToggled,
            ]
        );
    }

    #[test]
    fn quiet_replace_does_not_emit_unless_echoing() {
        let quiet = MemorySurface::new();
        let quiet_seen = recording(&quiet);
        quiet.replace_content("<p>x</p>", false);
        assert!(events(&quiet_seen).is_empty());
        assert_eq!(quiet.replacement_count(), 1);

        let echoing = MemorySurface::echoing();
        let echo_seen = recording(&echoing);
        echoing.replace_content("<p>x</p>", false);
        assert_eq!(
            events(&echo_seen),
            vec![SurfaceEvent::Changed { doc_changed: true }]
        );
    }

    #[test]
    fn disconnect_stops_events() {
        let surface = MemorySurface::new();
        let seen = recording(&surface);
        assert!(surface.is_connected());

        surface.disconnect();
        surface.edit("<p>later</p>");

        assert!(!surface.is_connected());
        assert!(events(&seen).is_empty());
        assert_eq!(surface.markup(), "<p>later</p>");
    }
}
