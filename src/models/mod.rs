pub mod itinerary;
pub mod lead;
pub mod trip;

pub use itinerary::{ItineraryDocument, ProviderRole};
pub use lead::{LeadContact, LeadContactError};
pub use trip::{BudgetTier, Destination, Place, TripRequest, TripRequestError};
