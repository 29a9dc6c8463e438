pub mod channels;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use channels::{classify_channel, ChannelClassifier, MarketingChannel};
pub use config::AppConfig;
pub use error::{AttributionError, AttributionOutcome};
