//! HTTP adapters for AI text-generation providers.
//!
//! Each adapter turns one prompt into one completion. Neither sets a request
//! timeout: the gateway bounds the primary call and lets the fallback run to
//! completion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ProviderKind, ProviderSettings, read_env_secret};

use super::TextProvider;
use super::error::ProviderError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(ProviderError::from)
}

async fn read_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(text) => text,
        Err(e) => format!("body unreadable: {}", e),
    };
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Provider speaking the OpenAI `/chat/completions` protocol
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: ProviderSettings, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            settings,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.settings.endpoint.trim_end_matches('/'))
    }
}

/// Pull the completion text out of a chat-completions body
fn chat_text(body: ChatResponse) -> Result<String, ProviderError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".to_string()))
}

#[async_trait]
impl TextProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey(self.settings.api_key_env.clone()))?;

        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(provider = %self.settings.name, model = %self.settings.model, "Sending chat completion");
        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let body: ChatResponse = read_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        chat_text(body)
    }
}

// ============================================================================
// Gemini generateContent
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Provider speaking Google's `models/{model}:generateContent` protocol
pub struct GeminiProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(settings: ProviderSettings, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            settings,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }
}

/// Concatenate the text parts of the first candidate
fn gemini_text(body: GeminiResponse) -> Result<String, ProviderError> {
    let content = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| ProviderError::MalformedResponse("no candidates in response".to_string()))?;

    Ok(content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey(self.settings.api_key_env.clone()))?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_tokens,
            },
        };

        debug!(provider = %self.settings.name, model = %self.settings.model, "Sending generateContent");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let body: GeminiResponse = read_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        gemini_text(body)
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Create a provider from settings, reading its API key from the environment.
///
/// A missing key is not fatal here: the provider fails its calls instead,
/// which lets the gateway fall back.
pub fn create_provider(
    settings: &ProviderSettings,
    role: &'static str,
) -> Result<Arc<dyn TextProvider>, ProviderError> {
    let api_key = read_env_secret(&settings.api_key_env);
    if api_key.is_none() {
        warn!(
            "{} provider {} has no API key; its calls will fail",
            role, settings.name
        );
    }

    info!(
        "Creating {} provider: {} with model: {}",
        role, settings.name, settings.model
    );

    let provider: Arc<dyn TextProvider> = match settings.kind {
        ProviderKind::OpenAiCompatible => {
            Arc::new(OpenAiCompatibleProvider::new(settings.clone(), api_key)?)
        }
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(settings.clone(), api_key)?),
    };
    Ok(provider)
}
