//! Caller-side retry around itinerary generation.
//!
//! Attempts run strictly one after another with a fixed pause between
//! them. Users only ever see a throttling notice or a vague "high traffic"
//! message; provider details stay in the logs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::models::{ItineraryDocument, TripRequest};

use super::error::GenerationError;
use super::gateway::GenerationGateway;

/// Anything that can turn a trip request into an itinerary
#[async_trait]
pub trait ItineraryBackend: Send + Sync {
    async fn request_itinerary(
        &self,
        request: &TripRequest,
    ) -> Result<ItineraryDocument, GenerationError>;
}

/// In-process gateway bound to one client identity
pub struct LocalBackend {
    gateway: Arc<GenerationGateway>,
    client_key: String,
}

impl LocalBackend {
    pub fn new(gateway: Arc<GenerationGateway>, client_key: impl Into<String>) -> Self {
        Self {
            gateway,
            client_key: client_key.into(),
        }
    }
}

#[async_trait]
impl ItineraryBackend for LocalBackend {
    async fn request_itinerary(
        &self,
        request: &TripRequest,
    ) -> Result<ItineraryDocument, GenerationError> {
        self.gateway.generate(&self.client_key, request).await
    }
}

/// What the traveller is told when generation does not succeed
#[derive(Debug, Error, PartialEq)]
pub enum UserFacingError {
    #[error(
        "You've generated several itineraries in a short time. Please wait {} minute(s) and try again.",
        .retry_after.as_secs().div_ceil(60).max(1)
    )]
    Throttled { retry_after: Duration },

    #[error("We're experiencing high traffic right now. Please try again in a few moments.")]
    HighTraffic,

    #[error("Please check your trip details: {0}")]
    InvalidRequest(String),
}

impl From<GenerationError> for UserFacingError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::RateLimited { retry_after } => UserFacingError::Throttled { retry_after },
            GenerationError::InvalidRequest(e) => UserFacingError::InvalidRequest(e.to_string()),
            GenerationError::Rejected(message) => UserFacingError::InvalidRequest(message),
            _ => UserFacingError::HighTraffic,
        }
    }
}

/// Fixed-backoff retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1_200),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
        }
    }

    /// Request an itinerary, retrying failures that a retry can fix.
    pub async fn generate(
        &self,
        backend: &dyn ItineraryBackend,
        request: &TripRequest,
    ) -> Result<ItineraryDocument, UserFacingError> {
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match backend.request_itinerary(request).await {
                Ok(document) => {
                    if attempt > 1 {
                        info!("Itinerary generated on attempt {}", attempt);
                    }
                    return Ok(document);
                }
                Err(e) if !e.is_retryable() => return Err(e.into()),
                Err(e) => {
                    warn!("Generation attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(UserFacingError::HighTraffic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BudgetTier, Destination, ProviderRole};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a scripted list of outcomes, recording call times
    struct ScriptedBackend {
        outcomes: Mutex<Vec<Result<String, GenerationError>>>,
        call_times: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(mut outcomes: Vec<Result<String, GenerationError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                call_times: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.call_times.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ItineraryBackend for ScriptedBackend {
        async fn request_itinerary(
            &self,
            _request: &TripRequest,
        ) -> Result<ItineraryDocument, GenerationError> {
            self.call_times.lock().unwrap().push(Instant::now());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop()
                .expect("backend called more often than scripted");
            outcome.map(|text| ItineraryDocument::new(text, ProviderRole::Primary, "p".to_string()))
        }
    }

    fn failure() -> GenerationError {
        GenerationError::AllProvidersFailed {
            primary: "TIMEOUT".to_string(),
            fallback: "HTTP 500".to_string(),
        }
    }

    fn request() -> TripRequest {
        TripRequest::new(Destination::named("Lisbon"), BudgetTier::MidRange, "Solo", 2)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let backend = ScriptedBackend::new(vec![Err(failure()), Err(failure()), Ok("Day 1".to_string())]);
        let policy = RetryPolicy::default();

        let document = policy.generate(&backend, &request()).await.unwrap();
        assert_eq!(document.raw_text, "Day 1");

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(1_200));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_high_traffic() {
        let backend = ScriptedBackend::new(vec![
            Err(failure()),
            Err(GenerationError::EmptyResponse {
                provider: "fallback".to_string(),
            }),
            Err(failure()),
        ]);
        let policy = RetryPolicy::default();

        let err = policy.generate(&backend, &request()).await.unwrap_err();
        assert_eq!(err, UserFacingError::HighTraffic);
        assert!(!err.to_string().contains("TIMEOUT"));
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(GenerationError::RateLimited {
            retry_after: Duration::from_secs(90),
        })]);
        let policy = RetryPolicy::default();

        let err = policy.generate(&backend, &request()).await.unwrap_err();
        assert_eq!(
            err,
            UserFacingError::Throttled {
                retry_after: Duration::from_secs(90)
            }
        );
        assert!(err.to_string().contains("wait 2 minute(s)"));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(GenerationError::Rejected(
            "Trip must last at least one day".to_string(),
        ))]);

        let err = RetryPolicy::default()
            .generate(&backend, &request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UserFacingError::InvalidRequest("Trip must last at least one day".to_string())
        );
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_user_facing_mapping_matches_retryability() {
        let errors = [
            GenerationError::RateLimited {
                retry_after: Duration::from_secs(60),
            },
            GenerationError::Rejected("bad".to_string()),
            failure(),
            GenerationError::Unavailable("connection refused".to_string()),
        ];
        for err in errors {
            let retryable = err.is_retryable();
            let shown = UserFacingError::from(err);
            assert_eq!(retryable, shown == UserFacingError::HighTraffic);
        }
    }

    #[test]
    fn test_policy_from_config_never_zero_attempts() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            backoff_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
    }
}
