pub mod config;
pub mod export;
pub mod generation;
pub mod models;
pub mod output;
pub mod prompts;
pub mod rate_limit;
pub mod reveal;
pub mod server;
pub mod unlock;

// Re-export main types
pub use config::AppConfig;
pub use models::{BudgetTier, Destination, ItineraryDocument, LeadContact, Place, TripRequest};
pub use output::{FileOutputWriter, ItineraryExport, OutputWriter};

// Generation pipeline
pub use generation::{
    GenerationError, GenerationGateway, HttpGenerationClient, ItineraryBackend, LocalBackend,
    RetryPolicy, TextProvider, UserFacingError,
};
pub use rate_limit::{InMemoryRateLimiter, RateDecision, RateLimiter};

// Display and unlock
pub use reveal::{RevealFraction, RevealState, format_itinerary, split_html};
pub use unlock::{LeadSinks, SessionStore, UnlockController, UnlockState};
