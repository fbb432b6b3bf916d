use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use minijinja::{Environment, context};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::export::PagedDocument;

use super::{ItineraryExport, OutputWriter};

const HTML_TEMPLATE: &str = include_str!("../../templates/itinerary.html.j2");

pub const HTML_FILE: &str = "itinerary.html";
pub const TEXT_FILE: &str = "itinerary.txt";
pub const METADATA_FILE: &str = "itinerary.json";
pub const PAGES_DIR: &str = "pages";

/// Maximum length of the destination part of an export directory name
const MAX_SLUG_LENGTH: usize = 40;

/// Lowercase, hyphen-separated form of `text` for directory names
pub fn slugify(text: &str) -> String {
    let slug = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.chars().count() <= MAX_SLUG_LENGTH {
        return slug;
    }

    // Cut at a word boundary when one exists inside the limit
    let truncated: String = slug.chars().take(MAX_SLUG_LENGTH).collect();
    match truncated.rfind('-') {
        Some(pos) => truncated[..pos].to_string(),
        None => truncated,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportMetadata<'a> {
    destination: &'a str,
    provider: &'a str,
    exported_at: DateTime<Utc>,
    files: [&'static str; 2],
}

/// Writes `itinerary.html`, `itinerary.txt` and `itinerary.json` into a
/// per-itinerary directory under `base_dir`
pub struct FileOutputWriter {
    base_dir: PathBuf,
}

impl FileOutputWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory for one export: `<destination-slug>-<timestamp>`
    pub fn export_dir(&self, export: &ItineraryExport<'_>, at: DateTime<Utc>) -> PathBuf {
        let mut name = slugify(export.destination);
        if name.is_empty() {
            name = "itinerary".to_string();
        }
        let stamp = at.format("%Y%m%d-%H%M%S");
        self.base_dir.join(format!("{}-{}", name, stamp))
    }

    fn render_html(&self, export: &ItineraryExport<'_>, at: DateTime<Utc>) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("itinerary.html", HTML_TEMPLATE)
            .context("Invalid export template")?;
        let template = env.get_template("itinerary.html")?;
        let html = template
            .render(context! {
                title => format!("Your trip to {}", export.destination),
                body => export.html,
                provider => export.provider_name,
                generated_at => at.format("%Y-%m-%d %H:%M UTC").to_string(),
            })
            .context("Failed to render export HTML")?;
        Ok(html)
    }

    async fn write_file(dir: &Path, name: &str, content: &str) -> Result<()> {
        let path = dir.join(name);
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", path))
    }
}

#[async_trait]
impl OutputWriter for FileOutputWriter {
    async fn write_itinerary(&self, export: &ItineraryExport<'_>) -> Result<PathBuf> {
        let now = Utc::now();
        let dir = self.export_dir(export, now);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;

        let html = self.render_html(export, now)?;
        Self::write_file(&dir, HTML_FILE, &html).await?;
        Self::write_file(&dir, TEXT_FILE, export.raw_text).await?;

        let metadata = ExportMetadata {
            destination: export.destination,
            provider: export.provider_name,
            exported_at: now,
            files: [HTML_FILE, TEXT_FILE],
        };
        let json =
            serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
        Self::write_file(&dir, METADATA_FILE, &json).await?;

        info!("Wrote itinerary export to {:?}", dir);
        Ok(dir)
    }
}

/// Write each rendered page as `page-001.png`, `page-002.png`, ... into `dir`
pub async fn write_pages(dir: &Path, document: &PagedDocument) -> Result<Vec<PathBuf>> {
    let pages_dir = dir.join(PAGES_DIR);
    fs::create_dir_all(&pages_dir)
        .await
        .with_context(|| format!("Failed to create pages directory {:?}", pages_dir))?;

    let mut written = Vec::with_capacity(document.page_count());
    for page in &document.pages {
        let path = pages_dir.join(format!("page-{:03}.png", page.tile.index + 1));
        fs::write(&path, &page.image)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        written.push(path);
    }

    info!("Wrote {} page(s) to {:?}", written.len(), pages_dir);
    Ok(written)
}
