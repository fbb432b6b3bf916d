//! Per-client request limits for itinerary generation.
//!
//! The limit is a hard stop: a denied request fails fast and is never
//! retried by the gateway. The counter store sits behind [`RateLimiter`] so
//! a single instance can keep it in memory while a multi-instance
//! deployment plugs in a shared store.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Outcome of a check-and-increment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RateDecision {
    /// Request counted; `remaining` more fit in the current window
    Allowed { remaining: u32 },
    /// Window is full; the oldest counted request expires after `retry_after`
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Check-and-increment counter keyed by client identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `client_key` if the window has room.
    async fn check_and_increment(&self, client_key: &str) -> RateDecision;
}

/// Derive the limiter key: client IP first, user agent as fallback
pub fn client_key(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let ip = ip.map(str::trim).filter(|s| !s.is_empty());
    let agent = user_agent.map(str::trim).filter(|s| !s.is_empty());
    match (ip, agent) {
        (Some(ip), _) => format!("ip:{ip}"),
        (None, Some(agent)) => format!("ua:{agent}"),
        (None, None) => "anonymous".to_string(),
    }
}

/// Entries kept before the limiter sweeps idle clients
const SWEEP_THRESHOLD: usize = 10_000;

/// Sliding-window limiter holding request timestamps in process memory.
///
/// Guarded by a mutex since the server handles requests on several threads.
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// Number of clients currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }

    fn prune(window: Duration, now: Instant, hits: &mut VecDeque<Instant>) {
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_increment(&self, client_key: &str) -> RateDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, hits| {
                Self::prune(window, now, hits);
                !hits.is_empty()
            });
        }

        let hits = windows.entry(client_key.to_string()).or_default();
        Self::prune(self.window, now, hits);

        if hits.len() >= self.max_requests as usize {
            let retry_after = hits
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            debug!(client = client_key, ?retry_after, "Rate limit exceeded");
            return RateDecision::Denied { retry_after };
        }

        hits.push_back(now);
        RateDecision::Allowed {
            remaining: self.max_requests - hits.len() as u32,
        }
    }
}
