//! Visitor journeys — per-user touchpoint history, conversion records, and
//! the tracker that runs visits and conversions through attribution.

pub mod repository;
pub mod store;
pub mod tracker;

pub use repository::{InMemoryJourneyRepository, JourneyRepository};
pub use store::JourneyStore;
pub use tracker::AttributionTracker;
