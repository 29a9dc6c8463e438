//! Visit tracking — turns raw page-visit events into classified touchpoints.
//!
//! # Modules
//!
//! - [`events`] — Inbound page-visit payload and device detection
//! - [`utm`] — UTM tag extraction from landing URLs
//! - [`factory`] — Touchpoint factory wiring the above into the channel classifier

pub mod events;
pub mod factory;
pub mod utm;

pub use events::PageVisit;
pub use factory::TouchpointFactory;
pub use utm::UtmParams;
