use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{HeaderMap, header::USER_AGENT},
};
use tracing::debug;

use crate::generation::GenerateResponse;
use crate::models::TripRequest;
use crate::rate_limit::client_key;

use super::AppState;
use super::error::ApiError;

/// Rate-limit key for a request.
///
/// Forwarding headers are only read when a trusted proxy sets them; the
/// peer address comes next and the user agent is the last resort.
pub fn request_client_key(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded: bool,
) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let forwarded = if trust_forwarded {
        header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"))
    } else {
        None
    };
    let peer = peer.map(|ip| ip.to_string());
    let agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());

    client_key(forwarded.or(peer.as_deref()), agent)
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::MalformedPayload(e.body_text()))?;
    let key = request_client_key(&headers, Some(peer.ip()), state.trust_forwarded_headers);
    debug!(client = %key, "Itinerary request");

    let document = state.gateway.generate(&key, &request).await?;
    Ok(Json(document.into()))
}

pub async fn health_handler() -> &'static str {
    "ok"
}
