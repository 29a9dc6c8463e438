//! Inbound page-visit payload and the user-agent sniffing applied to it.

use attribution_core::types::{DeviceType, GeoLocation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a page-visit handler supplies for one view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    /// When the visit happened. Defaults to the time of ingestion.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl PageVisit {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            referrer: None,
            user_agent: None,
            location: None,
            occurred_at: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// Coarse device class from a user-agent string.
pub fn detect_device(user_agent: Option<&str>) -> DeviceType {
    let ua = user_agent.unwrap_or_default().to_lowercase();
    if ua.contains("mobile") {
        DeviceType::Mobile
    } else if ua.contains("tablet") || ua.contains("ipad") {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    }
}
