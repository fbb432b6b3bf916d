use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::reveal::{RevealFraction, RevealFractionError};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub reveal: RevealConfig,
    pub leads: LeadsConfig,
    pub export: ExportConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP gateway binds to
    pub bind: String,
    pub port: u16,
    /// Origins allowed by CORS (empty allows any)
    pub allowed_origins: Vec<String>,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a proxy that sets them; otherwise clients can
    /// pick their own rate-limit key.
    pub trust_forwarded_headers: bool,
}

/// Wire protocol spoken by a provider endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions`
    OpenAiCompatible,
    /// Google Gemini `generateContent`
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Name used in logs and attribution (e.g., "openai", "gemini")
    pub name: String,
    pub kind: ProviderKind,
    /// Base URL of the API
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub primary: ProviderSettings,
    pub fallback: ProviderSettings,
    /// Abort the primary call after this many milliseconds
    pub primary_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window
    pub max_requests: u32,
    /// Sliding window length in seconds
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts made by the caller, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    /// Share of visible text shown before the paywall (0.0-1.0, exclusive)
    pub fraction: f64,
    /// Delay before the unlock prompt opens on its own
    pub auto_prompt_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadsConfig {
    /// Transactional email relay submit URL
    pub email_relay_url: String,
    /// Environment variable holding the relay access key
    pub access_key_env: String,
    /// Subject line of the relay email
    pub email_subject: String,
    /// Sender name shown in the relay email
    pub from_name: String,
    /// Lead store API URL
    pub lead_store_url: String,
    /// Environment variable holding an admin session token (optional)
    pub lead_store_token_env: Option<String>,
    /// Source tag attached to every captured lead
    pub source_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// How long the "Copied" state stays visible
    pub copy_feedback_ms: u64,
    /// Page width in pixels at render scale
    pub page_width_px: u32,
    /// Page height in pixels at render scale
    pub page_height_px: u32,
    /// Public URL used when sharing an itinerary
    pub share_url: String,
    /// Chromium-family binary used to render print pages
    pub browser: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory for file-backed session stores.
    /// Defaults to the platform data dir under `itinerary-forge/sessions`.
    pub dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
            trust_forwarded_headers: false,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            primary: ProviderSettings {
                name: "openai".to_string(),
                kind: ProviderKind::OpenAiCompatible,
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                temperature: 0.7,
                max_tokens: 4096,
            },
            fallback: ProviderSettings {
                name: "gemini".to_string(),
                kind: ProviderKind::Gemini,
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-1.5-flash".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                temperature: 0.7,
                max_tokens: 4096,
            },
            primary_timeout_ms: 10_000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window_secs: 5 * 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1_200,
        }
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            fraction: 0.3,
            auto_prompt_delay_ms: 9_000,
        }
    }
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            email_relay_url: "https://api.web3forms.com/submit".to_string(),
            access_key_env: "WEB3FORMS_ACCESS_KEY".to_string(),
            email_subject: "New itinerary unlock lead".to_string(),
            from_name: "Itinerary Planner".to_string(),
            lead_store_url: "http://localhost:3000/api/leads".to_string(),
            lead_store_token_env: None,
            source_tag: "itinerary-unlock".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            copy_feedback_ms: 2_000,
            // A4 at 96 dpi
            page_width_px: 794,
            page_height_px: 1123,
            share_url: "https://example.com/itinerary".to_string(),
            browser: "chromium".to_string(),
        }
    }
}

impl GenerationConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl RevealConfig {
    pub fn auto_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.auto_prompt_delay_ms)
    }

    pub fn reveal_fraction(&self) -> Result<RevealFraction, RevealFractionError> {
        RevealFraction::new(self.fraction)
    }
}

impl ExportConfig {
    pub fn copy_feedback(&self) -> Duration {
        Duration::from_millis(self.copy_feedback_ms)
    }
}

impl SessionConfig {
    /// Resolve the session directory, falling back to the platform data dir
    pub fn resolve_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("itinerary-forge/sessions")
        })
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, falling back to defaults if file doesn't exist
    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            Some(p) => {
                warn!("Config file {:?} not found, using defaults", p);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}

/// Read a secret from the environment variable named in config
pub fn read_env_secret(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            warn!("Environment variable {var} not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_workflow_constants() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(300));
        assert_eq!(config.generation.primary_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff(), Duration::from_millis(1200));
        assert_eq!(config.reveal.auto_prompt_delay(), Duration::from_secs(9));
        assert_eq!(config.export.copy_feedback(), Duration::from_secs(2));
        assert_eq!(config.export.browser, "chromium");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
rate_limit:
  max_requests: 10
reveal:
  fraction: 0.5
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_secs, 300);
        assert_eq!(config.reveal.fraction, 0.5);
        assert_eq!(config.reveal.auto_prompt_delay_ms, 9_000);
        assert_eq!(config.generation.primary.kind, ProviderKind::OpenAiCompatible);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let missing = PathBuf::from("/nonexistent/itinerary-forge.yaml");
        let config = AppConfig::load_or_default(Some(&missing)).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.trust_forwarded_headers);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: 9090\n").unwrap();

        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_reveal_fraction_checked() {
        let mut reveal = RevealConfig::default();
        assert_eq!(reveal.reveal_fraction().unwrap().value(), 0.3);
        reveal.fraction = 1.0;
        assert!(reveal.reveal_fraction().is_err());
    }

    #[test]
    fn test_session_dir_override() {
        let config = SessionConfig {
            dir: Some(PathBuf::from("/tmp/sessions")),
        };
        assert_eq!(config.resolve_dir(), PathBuf::from("/tmp/sessions"));
    }
}
