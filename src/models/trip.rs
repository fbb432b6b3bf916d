use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Budget tier selected on the trip form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetTier {
    Economical,
    #[serde(rename = "Mid-range")]
    MidRange,
    Luxury,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetTier::Economical => "Economical",
            BudgetTier::MidRange => "Mid-range",
            BudgetTier::Luxury => "Luxury",
        }
    }
}

impl std::fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BudgetTier {
    type Err = TripRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "economical" | "budget" => Ok(BudgetTier::Economical),
            "mid-range" | "midrange" | "mid range" => Ok(BudgetTier::MidRange),
            "luxury" => Ok(BudgetTier::Luxury),
            other => Err(TripRequestError::UnknownBudget(other.to_string())),
        }
    }
}

/// A geocoded place picked from the destination autocomplete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

/// Destination as submitted by the form: free-text label plus optional geocode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub label: String,
    #[serde(default)]
    pub value: Option<Place>,
}

impl Destination {
    pub fn named(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
        }
    }

    pub fn with_place(mut self, place: Place) -> Self {
        self.value = Some(place);
        self
    }

    /// Display name from the geocoder, falling back to the typed label
    pub fn display_name(&self) -> &str {
        self.value
            .as_ref()
            .and_then(|p| p.display_name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.label)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.value.as_ref().map(|p| (p.lat, p.lon))
    }
}

/// Trip preferences submitted for itinerary generation.
///
/// Immutable once submitted; the gateway only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRequest {
    pub destination: Destination,
    pub budget: BudgetTier,
    pub trip_type: String,
    pub days: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum TripRequestError {
    #[error("Destination is required")]
    MissingDestination,

    #[error("Trip type is required")]
    MissingTripType,

    #[error("Trip must last at least one day")]
    InvalidDays,

    #[error("Unknown budget tier: {0}")]
    UnknownBudget(String),
}

impl TripRequest {
    pub fn new(
        destination: Destination,
        budget: BudgetTier,
        trip_type: impl Into<String>,
        days: u32,
    ) -> Self {
        Self {
            destination,
            budget,
            trip_type: trip_type.into(),
            days,
        }
    }

    /// Reject requests the form should never have sent
    pub fn validate(&self) -> Result<(), TripRequestError> {
        if self.destination.label.trim().is_empty() && self.destination.value.is_none() {
            return Err(TripRequestError::MissingDestination);
        }
        if self.trip_type.trim().is_empty() {
            return Err(TripRequestError::MissingTripType);
        }
        if self.days == 0 {
            return Err(TripRequestError::InvalidDays);
        }
        Ok(())
    }
}
