use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::TripRequestError;
use crate::prompts::PromptError;

/// Failure of a single provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key not configured ({0})")]
    MissingApiKey(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Failure of a whole generation request
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Too many itinerary requests, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Invalid trip request: {0}")]
    InvalidRequest(#[from] TripRequestError),

    /// Rejected by a remote gateway with a 4xx other than 429
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Provider {provider} returned an empty itinerary")]
    EmptyResponse { provider: String },

    #[error("All providers failed (primary: {primary}; fallback: {fallback})")]
    AllProvidersFailed { primary: String, fallback: String },

    /// Remote gateway unreachable or answered with a server error
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl GenerationError {
    /// Whether a caller-side retry can help
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GenerationError::RateLimited { .. }
                | GenerationError::InvalidRequest(_)
                | GenerationError::Rejected(_)
        )
    }
}

/// Why the gateway switched to the fallback provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackReason {
    Timeout,
    ProviderError,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::Timeout => write!(f, "TIMEOUT"),
            FallbackReason::ProviderError => write!(f, "PROVIDER_ERROR"),
        }
    }
}

/// Logged whenever the primary provider is abandoned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    /// Primary provider that failed
    pub provider: String,
    pub reason: FallbackReason,
    /// Error text for PROVIDER_ERROR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub destination: String,
    pub timestamp: DateTime<Utc>,
}
