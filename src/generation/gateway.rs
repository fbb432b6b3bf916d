use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::models::{ItineraryDocument, ProviderRole, TripRequest};
use crate::prompts::{PromptBuilder, PromptStyle};
use crate::rate_limit::{RateDecision, RateLimiter};

use super::TextProvider;
use super::error::{FallbackEvent, FallbackReason, GenerationError};

/// Default bound on the primary provider call
pub const DEFAULT_PRIMARY_TIMEOUT: Duration = Duration::from_secs(10);

/// A generated itinerary plus the fallback event, if one happened
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub document: ItineraryDocument,
    pub fallback: Option<FallbackEvent>,
}

/// Rate-limited proxy in front of a primary and a fallback provider.
///
/// Nothing is persisted: each call is request in, itinerary out, with the
/// fallback decision logged.
pub struct GenerationGateway {
    primary: Arc<dyn TextProvider>,
    fallback: Arc<dyn TextProvider>,
    limiter: Arc<dyn RateLimiter>,
    prompts: PromptBuilder,
    primary_timeout: Duration,
}

impl GenerationGateway {
    pub fn new(
        primary: Arc<dyn TextProvider>,
        fallback: Arc<dyn TextProvider>,
        limiter: Arc<dyn RateLimiter>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            primary,
            fallback,
            limiter,
            prompts,
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
        }
    }

    pub fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    /// Generate an itinerary for `request` on behalf of `client_key`
    pub async fn generate(
        &self,
        client_key: &str,
        request: &TripRequest,
    ) -> Result<ItineraryDocument, GenerationError> {
        self.generate_with_report(client_key, request)
            .await
            .map(|report| report.document)
    }

    /// Like [`generate`](Self::generate), also returning the fallback event
    pub async fn generate_with_report(
        &self,
        client_key: &str,
        request: &TripRequest,
    ) -> Result<GenerationReport, GenerationError> {
        request.validate()?;

        if let RateDecision::Denied { retry_after } =
            self.limiter.check_and_increment(client_key).await
        {
            warn!(client = client_key, "Itinerary request rate limited");
            return Err(GenerationError::RateLimited { retry_after });
        }

        let destination = request.destination.display_name().to_string();
        info!(
            destination = %destination,
            days = request.days,
            budget = %request.budget,
            "Generating itinerary"
        );

        let prompt = self.prompts.render(PromptStyle::Detailed, request)?;
        let (reason, detail) =
            match tokio::time::timeout(self.primary_timeout, self.primary.complete(&prompt)).await
            {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    info!(provider = self.primary.name(), "Primary provider succeeded");
                    return Ok(GenerationReport {
                        document: ItineraryDocument::new(
                            text,
                            ProviderRole::Primary,
                            self.primary.name().to_string(),
                        ),
                        fallback: None,
                    });
                }
                Ok(Ok(_)) => (
                    FallbackReason::ProviderError,
                    Some("empty response".to_string()),
                ),
                Ok(Err(e)) => (FallbackReason::ProviderError, Some(e.to_string())),
                // Dropping the timed-out future aborts the in-flight request
                Err(_) => (FallbackReason::Timeout, None),
            };

        let event = FallbackEvent {
            provider: self.primary.name().to_string(),
            reason,
            detail,
            destination,
            timestamp: Utc::now(),
        };
        warn!(
            provider = %event.provider,
            reason = %event.reason,
            detail = event.detail.as_deref().unwrap_or(""),
            destination = %event.destination,
            timestamp = %event.timestamp.to_rfc3339(),
            "Primary provider failed, using fallback"
        );

        let dense_prompt = self.prompts.render(PromptStyle::Dense, request)?;
        match self.fallback.complete(&dense_prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(provider = self.fallback.name(), "Fallback provider succeeded");
                Ok(GenerationReport {
                    document: ItineraryDocument::new(
                        text,
                        ProviderRole::Fallback,
                        self.fallback.name().to_string(),
                    ),
                    fallback: Some(event),
                })
            }
            Ok(_) => {
                warn!(provider = self.fallback.name(), "Fallback provider returned empty output");
                Err(GenerationError::EmptyResponse {
                    provider: self.fallback.name().to_string(),
                })
            }
            Err(e) => {
                warn!(provider = self.fallback.name(), error = %e, "Fallback provider failed");
                let primary = match &event.detail {
                    Some(detail) => format!("{}: {}", event.reason, detail),
                    None => event.reason.to_string(),
                };
                Err(GenerationError::AllProvidersFailed {
                    primary,
                    fallback: e.to_string(),
                })
            }
        }
    }
}
