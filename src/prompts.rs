//! Bundled prompt templates for itinerary generation.
//!
//! Templates are embedded in the binary using include_str! and can be
//! overridden by placing `primary.j2` / `fallback.j2` in a template directory.

use std::path::{Path, PathBuf};

use minijinja::{Environment, context};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::models::TripRequest;

/// Bundled detailed prompt used with the primary provider
pub const DEFAULT_PRIMARY_TEMPLATE: &str = include_str!("../templates/primary.j2");

/// Bundled short prompt used with the fallback provider
pub const DEFAULT_FALLBACK_TEMPLATE: &str = include_str!("../templates/fallback.j2");

/// Which prompt variant to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Long, structured prompt for the primary provider
    Detailed,
    /// Shorter, denser prompt for the fallback provider
    Dense,
}

impl PromptStyle {
    fn template_name(&self) -> &'static str {
        match self {
            PromptStyle::Detailed => "primary",
            PromptStyle::Dense => "fallback",
        }
    }

    fn bundled(&self) -> &'static str {
        match self {
            PromptStyle::Detailed => DEFAULT_PRIMARY_TEMPLATE,
            PromptStyle::Dense => DEFAULT_FALLBACK_TEMPLATE,
        }
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read template {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Template resolution result
pub enum TemplateSource {
    /// Template loaded from a file path
    File(PathBuf),
    /// Template loaded from bundled default
    Bundled(&'static str),
}

impl TemplateSource {
    pub fn content(&self) -> Result<String, PromptError> {
        match self {
            TemplateSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| PromptError::Read {
                    path: path.clone(),
                    source,
                })
            }
            TemplateSource::Bundled(content) => Ok(content.to_string()),
        }
    }
}

/// Resolve a template, falling back to the bundled default if not found.
pub fn resolve_template(template_dir: Option<&Path>, style: PromptStyle) -> TemplateSource {
    if let Some(dir) = template_dir {
        let path = dir.join(format!("{}.j2", style.template_name()));
        if path.exists() {
            debug!("Using prompt template from {:?}", path);
            return TemplateSource::File(path);
        }
    }

    debug!("Using bundled prompt template: {}", style.template_name());
    TemplateSource::Bundled(style.bundled())
}

#[derive(Debug, Serialize)]
struct Coordinates {
    lat: f64,
    lon: f64,
}

/// Renders generation prompts from a [`TripRequest`]
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    /// Builder using only the bundled templates
    pub fn bundled() -> Result<Self, PromptError> {
        Self::load(None)
    }

    /// Builder preferring templates from `template_dir` when present
    pub fn load(template_dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut env = Environment::new();
        for style in [PromptStyle::Detailed, PromptStyle::Dense] {
            let source = resolve_template(template_dir, style).content()?;
            env.add_template_owned(style.template_name(), source)?;
        }
        Ok(Self { env })
    }

    /// Render the prompt for `request`.
    ///
    /// When the destination carries coordinates they lead the prompt, so the
    /// model plans for the picked place rather than a famous namesake.
    pub fn render(&self, style: PromptStyle, request: &TripRequest) -> Result<String, PromptError> {
        let template = self.env.get_template(style.template_name())?;
        let coordinates = request
            .destination
            .coordinates()
            .map(|(lat, lon)| Coordinates { lat, lon });
        let display_name = request.destination.display_name();

        let rendered = template.render(context! {
            label => request.destination.label.trim(),
            display_name => display_name,
            coordinates => coordinates,
            budget => request.budget.as_str(),
            trip_type => request.trip_type.trim(),
            days => request.days,
        })?;

        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BudgetTier, Destination, Place};

    fn paris_request() -> TripRequest {
        TripRequest::new(
            Destination::named("Paris"),
            BudgetTier::Luxury,
            "Honeymoon",
            5,
        )
    }

    #[test]
    fn test_bundled_templates_not_empty() {
        assert!(!DEFAULT_PRIMARY_TEMPLATE.is_empty());
        assert!(!DEFAULT_FALLBACK_TEMPLATE.is_empty());
    }

    #[test]
    fn test_detailed_prompt_embeds_preferences() {
        let prompt = PromptBuilder::bundled()
            .unwrap()
            .render(PromptStyle::Detailed, &paris_request())
            .unwrap();
        assert!(prompt.contains("5-day itinerary for a Honeymoon trip"));
        assert!(prompt.contains("Budget: Luxury"));
        assert!(prompt.contains("Paris"));
        assert!(!prompt.contains("latitude"));
    }

    #[test]
    fn test_coordinates_take_precedence() {
        let request = TripRequest::new(
            Destination::named("Springfield").with_place(Place {
                lat: 39.7817,
                lon: -89.6501,
                display_name: Some("Springfield, Illinois, USA".to_string()),
                place_id: Some("42".to_string()),
            }),
            BudgetTier::Economical,
            "Family",
            3,
        );

        let builder = PromptBuilder::bundled().unwrap();
        let detailed = builder.render(PromptStyle::Detailed, &request).unwrap();
        assert!(detailed.contains("latitude 39.7817, longitude -89.6501"));
        assert!(detailed.contains("Springfield, Illinois, USA"));
        assert!(detailed.contains("Do NOT substitute"));

        let dense = builder.render(PromptStyle::Dense, &request).unwrap();
        assert!(dense.contains("39.7817,-89.6501"));
    }

    #[test]
    fn test_dense_prompt_is_shorter() {
        let builder = PromptBuilder::bundled().unwrap();
        let detailed = builder.render(PromptStyle::Detailed, &paris_request()).unwrap();
        let dense = builder.render(PromptStyle::Dense, &paris_request()).unwrap();
        assert!(dense.len() < detailed.len() / 2);
        assert!(dense.starts_with("Write a 5-day Luxury Honeymoon itinerary for Paris."));
    }

    #[test]
    fn test_template_override_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fallback.j2"), "Plan {{ days }} days in {{ display_name }}").unwrap();

        let builder = PromptBuilder::load(Some(dir.path())).unwrap();
        let dense = builder.render(PromptStyle::Dense, &paris_request()).unwrap();
        assert_eq!(dense, "Plan 5 days in Paris");

        // primary.j2 absent from the dir, bundled default used
        assert!(matches!(
            resolve_template(Some(dir.path()), PromptStyle::Detailed),
            TemplateSource::Bundled(_)
        ));
    }
}
