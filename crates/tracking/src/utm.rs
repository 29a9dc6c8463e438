//! UTM tag extraction from landing-page URLs.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The five UTM-style attribution tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

impl UtmParams {
    /// Read `utm_*` query parameters. A malformed URL yields an empty set.
    pub fn from_url(raw: &str) -> Self {
        let parsed = match url::Url::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(url = %raw, error = %e, "Unparseable landing URL, no UTM tags");
                return Self::default();
            }
        };

        let mut params = Self::default();
        for (key, value) in parsed.query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "utm_source" => &mut params.source,
                "utm_medium" => &mut params.medium,
                "utm_campaign" => &mut params.campaign,
                "utm_term" => &mut params.term,
                "utm_content" => &mut params.content,
                _ => continue,
            };
            // First occurrence wins.
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }
}
