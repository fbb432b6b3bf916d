//! HTTP client for a remote generation gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ItineraryDocument, ProviderRole, TripRequest};

use super::error::GenerationError;
use super::retry::ItineraryBackend;

/// Path of the generation endpoint served by [`crate::server`]
pub const GENERATE_PATH: &str = "/api/generate-itinerary";

/// Success body of the generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub output: String,
    pub provider: String,
    pub provider_role: ProviderRole,
    pub generated_at: DateTime<Utc>,
}

impl From<ItineraryDocument> for GenerateResponse {
    fn from(document: ItineraryDocument) -> Self {
        Self {
            output: document.raw_text,
            provider: document.provider_name,
            provider_role: document.provider_used,
            generated_at: document.generated_at,
        }
    }
}

impl From<GenerateResponse> for ItineraryDocument {
    fn from(response: GenerateResponse) -> Self {
        Self {
            raw_text: response.output,
            provider_used: response.provider_role,
            provider_name: response.provider,
            generated_at: response.generated_at,
        }
    }
}

/// Error body of the generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Calls `POST /api/generate-itinerary` on a running gateway
pub struct HttpGenerationClient {
    client: reqwest::Client,
    url: String,
}

impl HttpGenerationClient {
    pub fn new(base_url: &str) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("itinerary-forge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), GENERATE_PATH),
        })
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_default()
}

#[async_trait]
impl ItineraryBackend for HttpGenerationClient {
    async fn request_itinerary(
        &self,
        request: &TripRequest,
    ) -> Result<ItineraryDocument, GenerationError> {
        debug!("POST {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: GenerateResponse = response
                .json()
                .await
                .map_err(|e| GenerationError::Unavailable(format!("Malformed response: {}", e)))?;
            return Ok(body.into());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };

        if status.is_client_error() {
            Err(GenerationError::Rejected(message))
        } else {
            Err(GenerationError::Unavailable(message))
        }
    }
}
