use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::ExportError;
use super::copy::CopyButton;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub title: String,
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("Sharing is not supported on this platform")]
    Unavailable,

    #[error("Share cancelled")]
    Cancelled,

    #[error("Share failed: {0}")]
    Failed(String),
}

/// Platform share sheet
#[async_trait]
pub trait ShareSheet: Send + Sync {
    async fn share(&self, request: &ShareRequest) -> Result<(), ShareError>;
}

/// Shares through the desktop mail client with a `mailto:` link
pub struct MailtoShareSheet;

/// `mailto:` link carrying the request title as subject and text plus URL
/// as body
pub fn mailto_link(request: &ShareRequest) -> String {
    let body = format!("{}\n\n{}", request.text, request.url);
    format!(
        "mailto:?subject={}&body={}",
        percent_encode(&request.title),
        percent_encode(&body)
    )
}

fn percent_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[async_trait]
impl ShareSheet for MailtoShareSheet {
    async fn share(&self, request: &ShareRequest) -> Result<(), ShareError> {
        let link = mailto_link(request);
        tokio::task::spawn_blocking(move || open::that(link))
            .await
            .map_err(|e| ShareError::Failed(e.to_string()))?
            .map_err(|e| {
                debug!("No mail handler: {}", e);
                ShareError::Unavailable
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    /// No usable share sheet; the text went to the clipboard instead
    Copied,
    Cancelled,
}

/// Share button with a clipboard fallback
pub struct ShareAction {
    sheet: Option<Arc<dyn ShareSheet>>,
    copy: Arc<CopyButton>,
    url: String,
}

impl ShareAction {
    pub fn new(
        sheet: Option<Arc<dyn ShareSheet>>,
        copy: Arc<CopyButton>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            sheet,
            copy,
            url: url.into(),
        }
    }

    /// Share the itinerary for `destination`. Cancelling is not an error.
    pub async fn share(
        &self,
        destination: &str,
        raw_text: &str,
    ) -> Result<ShareOutcome, ExportError> {
        let request = ShareRequest {
            title: format!("My trip to {}", destination),
            text: raw_text.to_string(),
            url: self.url.clone(),
        };

        if let Some(sheet) = &self.sheet {
            match sheet.share(&request).await {
                Ok(()) => return Ok(ShareOutcome::Shared),
                Err(ShareError::Cancelled) => {
                    debug!("Share cancelled by user");
                    return Ok(ShareOutcome::Cancelled);
                }
                Err(ShareError::Unavailable) => debug!("Share sheet unavailable, copying instead"),
                Err(e) => warn!("{}, copying instead", e),
            }
        }

        self.copy.copy(raw_text).await?;
        Ok(ShareOutcome::Copied)
    }
}
