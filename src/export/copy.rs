use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::ExportError;

/// Default time the "Copied" label stays up
pub const DEFAULT_COPY_FEEDBACK: Duration = Duration::from_secs(2);

/// System clipboard
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<(), ExportError>;
}

/// The desktop clipboard.
///
/// The handle stays open for the life of the value: on X11 the copied text
/// is served by this process until a clipboard manager takes it over.
pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ExportError> {
        let inner = arboard::Clipboard::new().map_err(|e| ExportError::Clipboard(e.to_string()))?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn write_text(&self, text: &str) -> Result<(), ExportError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_text(text)
            .map_err(|e| ExportError::Clipboard(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Idle,
    /// Shown for the feedback period after a successful copy
    Copied,
}

/// Copies the raw itinerary text and briefly reports success
pub struct CopyButton {
    clipboard: Arc<dyn Clipboard>,
    feedback: Duration,
    copied_at: Mutex<Option<Instant>>,
}

impl CopyButton {
    pub fn new(clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            clipboard,
            feedback: DEFAULT_COPY_FEEDBACK,
            copied_at: Mutex::new(None),
        }
    }

    pub fn with_feedback(mut self, feedback: Duration) -> Self {
        self.feedback = feedback;
        self
    }

    /// Copy `raw_text` (the provider's source text, not the HTML)
    pub async fn copy(&self, raw_text: &str) -> Result<(), ExportError> {
        self.clipboard.write_text(raw_text).await?;
        *self.copied_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        debug!("Copied {} bytes to clipboard", raw_text.len());
        Ok(())
    }

    pub fn status(&self) -> CopyStatus {
        let copied_at = *self.copied_at.lock().unwrap_or_else(PoisonError::into_inner);
        match copied_at {
            Some(at) if at.elapsed() < self.feedback => CopyStatus::Copied,
            _ => CopyStatus::Idle,
        }
    }
}
