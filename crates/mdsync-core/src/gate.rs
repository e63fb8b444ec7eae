//! The save / discard / cancel prompt shown before a destructive action.
//!
//! At most one prompt is open at a time. Whoever opened it awaits a
//! [`DecisionHandle`]; the UI reads [`UnsavedChangesGate::prompt`] to render
//! it and calls [`UnsavedChangesGate::resolve`] when the user picks.

use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Save,
    Discard,
    Cancel,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    /// What the user was about to do, e.g. "open another file".
    pub action: String,
    pub title: String,
    pub message: String,
}

impl Prompt {
    fn for_action(action: String) -> Self {
        Self {
            action,
            title: "Unsaved changes".to_owned(),
            message: "This file has unsaved changes. Do you want to save before continuing?"
                .to_owned(),
        }
    }
}

struct OpenPrompt {
    prompt: Prompt,
    responder: oneshot::Sender<Decision>,
}

#[derive(Default)]
pub struct UnsavedChangesGate {
    open: Mutex<Option<OpenPrompt>>,
}

impl std::fmt::Debug for UnsavedChangesGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsavedChangesGate")
            .field("prompt", &self.prompt())
            .finish()
    }
}

impl UnsavedChangesGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the prompt for `action` and return the pending decision.
    ///
    /// If a prompt is already open the returned handle is `Cancel` right
    /// away and the open prompt is left as it is.
    pub fn request_decision(&self, action: impl Into<String>) -> DecisionHandle {
        let action = action.into();
        let mut open = self.lock();

        if let Some(current) = open.as_ref() {
            if !current.responder.is_closed() {
                debug!(
                    open = %current.prompt.action,
                    requested = %action,
                    "prompt already open, cancelling request"
                );
                return DecisionHandle::ready(Decision::Cancel);
            }
            debug!(action = %current.prompt.action, "dropping abandoned prompt");
        }

        let (responder, receiver) = oneshot::channel();
        *open = Some(OpenPrompt {
            prompt: Prompt::for_action(action),
            responder,
        });
        DecisionHandle {
            state: HandleState::Waiting(receiver),
        }
    }

    /// Close the prompt with `decision`. Returns false if nothing was open.
    pub fn resolve(&self, decision: Decision) -> bool {
        let Some(open) = self.lock().take() else {
            debug!(?decision, "resolve with no open prompt");
            return false;
        };
        // The requester may have gone away; the prompt closes either way.
        let _ = open.responder.send(decision);
        true
    }

    /// Escape closes the prompt as if Cancel was picked.
    pub fn cancel_on_escape(&self) -> bool {
        self.resolve(Decision::Cancel)
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.lock().as_ref().map(|open| open.prompt.clone())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenPrompt>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
enum HandleState {
    Ready(Decision),
    Waiting(oneshot::Receiver<Decision>),
}

/// Resolves to the user's decision. A gate dropped before answering
/// resolves as `Cancel`.
#[derive(Debug)]
#[must_use = "a decision handle does nothing unless awaited"]
pub struct DecisionHandle {
    state: HandleState,
}

impl DecisionHandle {
    const fn ready(decision: Decision) -> Self {
        Self {
            state: HandleState::Ready(decision),
        }
    }
}

impl Future for DecisionHandle {
    type Output = Decision;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Decision> {
        match &mut self.get_mut().state {
            HandleState::Ready(decision) => Poll::Ready(*decision),
            HandleState::Waiting(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|result| result.unwrap_or(Decision::Cancel)),
        }
    }
}
