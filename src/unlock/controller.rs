//! Lead-gated unlock state machine.
//!
//! ```text
//! Locked --(timer | open_prompt)--> PromptShown --(both sinks ok)--> Unlocked
//!    ^                                   |
//!    +------------(dismiss)--------------+
//! ```
//!
//! Unlocked is terminal for the session and is persisted in the session
//! store, so a reload keeps the full itinerary visible.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{ItineraryDocument, LeadContact, LeadContactError};
use crate::reveal::{RevealFraction, RevealState, visible_text_len};

use super::session::{
    DESTINATION_KEY, ITINERARY_KEY, PROVIDER_KEY, SessionError, SessionSnapshot, SessionStore,
    UNLOCKED_KEY,
};
use super::sinks::{LeadSinks, LeadSubmission};

/// Default delay before the prompt opens on its own
pub const DEFAULT_AUTO_PROMPT_DELAY: Duration = Duration::from_millis(9_000);

/// Characters of hidden text per placeholder line
const PLACEHOLDER_LINE_CHARS: usize = 80;
const PLACEHOLDER_MAX_LINES: usize = 12;

const UNLOCK_NOT_SAVED: &str = "We couldn't save your unlock. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    Locked,
    PromptShown,
    Unlocked,
}

#[derive(Debug, Error)]
pub enum UnlockError {
    #[error("{0}")]
    InvalidContact(#[from] LeadContactError),

    /// Either sink failed; nothing counts as submitted
    #[error("We couldn't save your details. Please try again.")]
    LeadSubmissionPartialFailure {
        email: Option<String>,
        store: Option<String>,
    },

    #[error("The unlock form is not open")]
    PromptNotShown,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result of a submission that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Unlocked,
    /// The prompt was closed while the submission was in flight
    Discarded,
}

/// One in-flight submission, tied to the prompt that started it
#[derive(Debug, Clone)]
pub struct SubmissionTicket {
    generation: u64,
    lead: LeadSubmission,
}

impl SubmissionTicket {
    pub fn lead(&self) -> &LeadSubmission {
        &self.lead
    }
}

/// What the page shows for the current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItinerary {
    pub state: UnlockState,
    pub html: String,
    /// Provider attribution
    pub provider_name: String,
    /// Error shown inside the open prompt
    pub prompt_error: Option<String>,
}

struct Inner {
    state: UnlockState,
    reveal: RevealState,
    /// Set once the prompt has been opened by any trigger
    prompt_triggered: bool,
    timer_armed: bool,
    /// Bumped on dismiss so late submission results are dropped
    generation: u64,
    last_error: Option<String>,
    state_tx: watch::Sender<UnlockState>,
}

impl Inner {
    fn set_state(&mut self, state: UnlockState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn open(&mut self, by_timer: bool) -> bool {
        if self.state != UnlockState::Locked || !self.reveal.requires_unlock() {
            return false;
        }
        if by_timer && self.prompt_triggered {
            return false;
        }
        self.prompt_triggered = true;
        self.set_state(UnlockState::PromptShown);
        true
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one itinerary from partially visible to unlocked
pub struct UnlockController {
    inner: Arc<Mutex<Inner>>,
    raw_text: String,
    provider_name: String,
    destination: String,
    sinks: LeadSinks,
    store: Arc<dyn SessionStore>,
    timer: CancellationToken,
}

impl UnlockController {
    /// Take over a freshly generated itinerary.
    ///
    /// The itinerary is written to the session store. If the session was
    /// already unlocked it stays unlocked.
    pub fn new(
        document: &ItineraryDocument,
        destination: impl Into<String>,
        fraction: RevealFraction,
        sinks: LeadSinks,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, UnlockError> {
        let destination = destination.into();
        store.set(ITINERARY_KEY, &document.raw_text)?;
        store.set(PROVIDER_KEY, &document.provider_name)?;
        store.set(DESTINATION_KEY, &destination)?;
        let unlocked = SessionSnapshot::load(store.as_ref())?.unlocked;

        Ok(Self::from_parts(
            document.raw_text.clone(),
            document.provider_name.clone(),
            destination,
            unlocked,
            fraction,
            sinks,
            store,
        ))
    }

    /// Rebuild the controller from a session, if it holds an itinerary
    pub fn restore(
        fraction: RevealFraction,
        sinks: LeadSinks,
        store: Arc<dyn SessionStore>,
    ) -> Result<Option<Self>, UnlockError> {
        let snapshot = SessionSnapshot::load(store.as_ref())?;
        let Some(raw_text) = snapshot.itinerary else {
            return Ok(None);
        };
        debug!(unlocked = snapshot.unlocked, "Restoring itinerary from session");

        Ok(Some(Self::from_parts(
            raw_text,
            snapshot.provider.unwrap_or_default(),
            snapshot.destination.unwrap_or_default(),
            snapshot.unlocked,
            fraction,
            sinks,
            store,
        )))
    }

    fn from_parts(
        raw_text: String,
        provider_name: String,
        destination: String,
        unlocked: bool,
        fraction: RevealFraction,
        sinks: LeadSinks,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let mut reveal = RevealState::from_raw_text(&raw_text, fraction);
        let state = if unlocked {
            reveal.mark_unlocked();
            UnlockState::Unlocked
        } else {
            UnlockState::Locked
        };

        let (state_tx, _) = watch::channel(state);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                reveal,
                prompt_triggered: false,
                timer_armed: false,
                generation: 0,
                last_error: None,
                state_tx,
            })),
            raw_text,
            provider_name,
            destination,
            sinks,
            store,
            timer: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> UnlockState {
        lock(&self.inner).state
    }

    /// Follow state changes as they happen
    pub fn subscribe(&self) -> watch::Receiver<UnlockState> {
        lock(&self.inner).state_tx.subscribe()
    }

    /// Resolve once the prompt is open, by the timer or a click
    pub async fn wait_for_prompt(&self) {
        let mut states = self.subscribe();
        // The sender lives as long as `self`, so this only ends on a match
        let _ = states
            .wait_for(|state| *state == UnlockState::PromptShown)
            .await;
    }

    /// Whether any content sits behind the paywall
    pub fn requires_unlock(&self) -> bool {
        lock(&self.inner).reveal.requires_unlock()
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn prompt_error(&self) -> Option<String> {
        lock(&self.inner).last_error.clone()
    }

    /// Full itinerary HTML, once unlocked
    pub fn unlocked_html(&self) -> Option<String> {
        let inner = lock(&self.inner);
        (inner.state == UnlockState::Unlocked || !inner.reveal.requires_unlock())
            .then(|| inner.reveal.full_html())
    }

    /// Open the prompt after `delay`, unless something opened it first.
    ///
    /// Does nothing when there is nothing to unlock, the session is already
    /// unlocked, or the timer was armed before. Must be called inside a
    /// tokio runtime.
    pub fn arm_auto_prompt(&self, delay: Duration) -> bool {
        {
            let mut inner = lock(&self.inner);
            if inner.timer_armed
                || inner.prompt_triggered
                || inner.state != UnlockState::Locked
                || !inner.reveal.requires_unlock()
            {
                return false;
            }
            inner.timer_armed = true;
        }

        let inner = Arc::clone(&self.inner);
        let cancelled = self.timer.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => debug!("Auto-prompt timer cancelled"),
                _ = tokio::time::sleep(delay) => {
                    if lock(&inner).open(true) {
                        info!("Unlock prompt opened after {:?}", delay);
                    }
                }
            }
        });
        debug!("Auto-prompt armed for {:?}", delay);
        true
    }

    /// Timer trigger. Only fires if nothing opened the prompt before.
    pub fn timer_elapsed(&self) -> bool {
        lock(&self.inner).open(true)
    }

    /// Explicit "unlock" click
    pub fn open_prompt(&self) -> bool {
        let opened = lock(&self.inner).open(false);
        if opened {
            self.timer.cancel();
            debug!("Unlock prompt opened by user");
        }
        opened
    }

    /// Close the prompt without submitting. Any in-flight submission is
    /// left to finish, and its result is ignored.
    pub fn dismiss(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state != UnlockState::PromptShown {
            return false;
        }
        inner.set_state(UnlockState::Locked);
        inner.generation += 1;
        inner.last_error = None;
        debug!("Unlock prompt dismissed");
        true
    }

    /// Validate `contact` and start a submission from the open prompt
    pub fn begin_submission(&self, contact: LeadContact) -> Result<SubmissionTicket, UnlockError> {
        let mut inner = lock(&self.inner);
        if inner.state != UnlockState::PromptShown {
            return Err(UnlockError::PromptNotShown);
        }
        if let Err(e) = contact.validate() {
            inner.last_error = Some(e.to_string());
            return Err(e.into());
        }
        inner.last_error = None;

        Ok(SubmissionTicket {
            generation: inner.generation,
            lead: LeadSubmission::new(contact, self.destination.clone()),
        })
    }

    /// Apply the sinks' verdict for `ticket`
    pub fn finish_submission(
        &self,
        ticket: SubmissionTicket,
        result: Result<(), UnlockError>,
    ) -> Result<SubmissionOutcome, UnlockError> {
        let mut inner = lock(&self.inner);
        if ticket.generation != inner.generation || inner.state != UnlockState::PromptShown {
            debug!("Discarding result of an abandoned submission");
            return Ok(SubmissionOutcome::Discarded);
        }

        if let Err(e) = result {
            inner.last_error = Some(e.to_string());
            return Err(e);
        }

        // Persist first: the page must never show an unlock a reload loses
        if let Err(e) = self.store.set(UNLOCKED_KEY, "true") {
            warn!("Failed to persist unlock flag: {}", e);
            inner.last_error = Some(UNLOCK_NOT_SAVED.to_string());
            return Err(e.into());
        }

        inner.set_state(UnlockState::Unlocked);
        inner.reveal.mark_unlocked();
        inner.last_error = None;
        drop(inner);

        self.timer.cancel();
        info!(destination = %self.destination, "Itinerary unlocked");
        Ok(SubmissionOutcome::Unlocked)
    }

    /// Submit `contact` to both sinks and unlock on success
    pub async fn submit(&self, contact: LeadContact) -> Result<SubmissionOutcome, UnlockError> {
        let ticket = self.begin_submission(contact)?;
        let result = self.sinks.submit(ticket.lead()).await;
        self.finish_submission(ticket, result)
    }

    /// HTML for the current state: the visible part plus either a blurred
    /// placeholder or the revealed remainder
    pub fn render(&self) -> RenderedItinerary {
        let inner = lock(&self.inner);
        let html = if inner.state == UnlockState::Unlocked || !inner.reveal.requires_unlock() {
            inner.reveal.full_html()
        } else {
            format!(
                "{}{}",
                inner.reveal.visible_html,
                blurred_placeholder(&inner.reveal.locked_html)
            )
        };

        RenderedItinerary {
            state: inner.state,
            html,
            provider_name: self.provider_name.clone(),
            prompt_error: inner.last_error.clone(),
        }
    }
}

impl Drop for UnlockController {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}

/// Stand-in for locked content, sized roughly like it
fn blurred_placeholder(locked_html: &str) -> String {
    let lines = visible_text_len(locked_html)
        .div_ceil(PLACEHOLDER_LINE_CHARS)
        .clamp(1, PLACEHOLDER_MAX_LINES);
    let mut html = String::from(r#"<div class="itinerary-locked" aria-hidden="true">"#);
    for _ in 0..lines {
        html.push_str(r#"<p class="blur-line"></p>"#);
    }
    html.push_str("</div>");
    html
}
