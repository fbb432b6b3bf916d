use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which provider slot produced an itinerary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Primary,
    Fallback,
}

impl std::fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderRole::Primary => write!(f, "primary"),
            ProviderRole::Fallback => write!(f, "fallback"),
        }
    }
}

/// Raw itinerary text as returned by a provider.
///
/// Held client-side only (session store); the gateway never persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDocument {
    pub raw_text: String,
    pub provider_used: ProviderRole,
    /// Provider name for attribution display (e.g., "openai", "gemini")
    pub provider_name: String,
    pub generated_at: DateTime<Utc>,
}

impl ItineraryDocument {
    pub fn new(raw_text: String, provider_used: ProviderRole, provider_name: String) -> Self {
        Self {
            raw_text,
            provider_used,
            provider_name,
            generated_at: Utc::now(),
        }
    }
}
