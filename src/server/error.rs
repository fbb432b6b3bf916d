use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::generation::{ErrorResponse, GenerationError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error(
        "You've generated several itineraries in a short time. Please try again in {} minute(s).",
        .retry_after.as_secs().div_ceil(60).max(1)
    )]
    RateLimited { retry_after: Duration },

    #[error("Itinerary generation is unavailable right now. Please try again.")]
    Upstream(String),

    #[error("Internal error")]
    Internal(String),
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::RateLimited { retry_after } => ApiError::RateLimited { retry_after },
            GenerationError::InvalidRequest(e) => ApiError::InvalidRequest(e.to_string()),
            GenerationError::Rejected(message) => ApiError::InvalidRequest(message),
            GenerationError::Prompt(e) => ApiError::Internal(e.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MalformedPayload(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(detail) => {
                error!("Generation failed: {}", detail);
                StatusCode::BAD_GATEWAY
            }
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let retry_after = match &self {
            ApiError::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
