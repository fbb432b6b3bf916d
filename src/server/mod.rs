//! HTTP front for the generation gateway.
//!
//! `POST /api/generate-itinerary` takes a trip request and returns the
//! itinerary text with the provider that produced it. `GET /health` is a
//! liveness check.

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::request_client_key;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::generation::{GENERATE_PATH, GenerationGateway};

use routes::{generate_handler, health_handler};

pub struct AppState {
    pub gateway: Arc<GenerationGateway>,
    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    pub trust_forwarded_headers: bool,
}

impl AppState {
    pub fn new(gateway: Arc<GenerationGateway>, trust_forwarded_headers: bool) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            trust_forwarded_headers,
        })
    }
}

/// Routes without middleware.
///
/// The generate route reads the peer address, so serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(GENERATE_PATH, post(generate_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// CORS for the configured origins; any origin when none are listed
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {}", o))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60)))
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> Result<()> {
    let app = router(state).layer(cors_layer(&config.allowed_origins)?);

    let address = format!("{}:{}", config.bind, config.port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
