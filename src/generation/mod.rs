pub mod client;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ErrorResponse, GENERATE_PATH, GenerateResponse, HttpGenerationClient};
pub use error::{FallbackEvent, FallbackReason, GenerationError, ProviderError};
pub use gateway::{DEFAULT_PRIMARY_TIMEOUT, GenerationGateway, GenerationReport};
pub use providers::{GeminiProvider, OpenAiCompatibleProvider, create_provider};
pub use retry::{ItineraryBackend, LocalBackend, RetryPolicy, UserFacingError};

use async_trait::async_trait;

/// A single AI text-generation service
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Name used in logs and attribution
    fn name(&self) -> &str;

    /// Produce one completion for `prompt`
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}
