pub mod files;

pub use files::*;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

/// An unlocked itinerary ready to leave the app
#[derive(Debug, Clone, Copy)]
pub struct ItineraryExport<'a> {
    pub destination: &'a str,
    /// Provider source text
    pub raw_text: &'a str,
    /// Full formatted HTML
    pub html: &'a str,
    pub provider_name: &'a str,
}

/// Trait for writing itinerary exports
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Write all export files, returning the directory they were written to
    async fn write_itinerary(&self, export: &ItineraryExport<'_>) -> Result<PathBuf>;
}
