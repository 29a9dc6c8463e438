//! Journey & conversion store — per-user touchpoint history and conversion
//! records on top of a [`JourneyRepository`].
//!
//! `record_conversion` fills in first/last-touch attribution only. The
//! multi-touch models are left to the caller so the store stays independent
//! of model parameters.

use std::sync::Arc;

use attribution_core::types::{
    generate_id, ConversionAttribution, ConversionEvent, ConversionInput, Touchpoint, UserJourney,
};
use attribution_core::{AttributionOutcome, ChannelClassifier, MarketingChannel};
use attribution_reporting::attribution::{first_touch_attribution, last_touch_attribution};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::repository::{InMemoryJourneyRepository, JourneyRepository};

/// Path used for the placeholder touchpoint of a journey that converted
/// without any recorded visit.
pub const SYNTHETIC_TOUCHPOINT_URL: &str = "/";

#[derive(Clone)]
pub struct JourneyStore {
    repo: Arc<dyn JourneyRepository>,
    classifier: ChannelClassifier,
}

impl std::fmt::Debug for JourneyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyStore")
            .field("journeys", &self.repo.list_journeys().len())
            .finish()
    }
}

impl JourneyStore {
    pub fn new(repo: Arc<dyn JourneyRepository>, classifier: ChannelClassifier) -> Self {
        Self { repo, classifier }
    }

    /// Store backed by a fresh in-memory repository.
    pub fn in_memory() -> Self {
        Self::new(InMemoryJourneyRepository::shared(), ChannelClassifier::default())
    }

    pub fn repository(&self) -> &Arc<dyn JourneyRepository> {
        &self.repo
    }

    pub fn get_or_create_journey(&self, user_id: &str) -> UserJourney {
        let (journey, created) = self.repo.get_or_create(user_id, Utc::now());
        if created {
            info!(user_id = %user_id, "Journey created");
        }
        journey
    }

    pub fn get_journey(&self, user_id: &str) -> Option<UserJourney> {
        self.repo.get(user_id)
    }

    /// Append a touchpoint at its chronological position.
    pub fn add_touchpoint(&self, user_id: &str, touchpoint: Touchpoint) -> UserJourney {
        self.append_touchpoint(user_id, touchpoint).0
    }

    /// Like [`add_touchpoint`](Self::add_touchpoint), also reporting whether
    /// this was the journey's first touchpoint.
    pub(crate) fn append_touchpoint(
        &self,
        user_id: &str,
        touchpoint: Touchpoint,
    ) -> (UserJourney, bool) {
        let touchpoint_id = touchpoint.id.clone();
        let channel = touchpoint.channel();
        let (journey, first) = self.repo.append_touchpoint(user_id, touchpoint);
        info!(
            user_id = %user_id,
            touchpoint_id = %touchpoint_id,
            channel = %channel,
            touchpoint_count = journey.touchpoint_count(),
            "Touchpoint added"
        );
        (journey, first)
    }

    /// Update engagement signals on a recorded touchpoint, both in the
    /// journey and in the flat list. Returns false if it is not found.
    pub fn record_engagement(
        &self,
        user_id: &str,
        touchpoint_id: &str,
        time_on_page: Option<f64>,
        scroll_depth: Option<f64>,
    ) -> bool {
        let Some(existing) = self.repo.get(user_id) else {
            return false;
        };
        if !existing.touchpoints().iter().any(|t| t.id == touchpoint_id) {
            return false;
        }

        self.repo.modify(user_id, Utc::now(), &mut |journey: &mut UserJourney| {
            journey.record_engagement_for(touchpoint_id, time_on_page, scroll_depth);
        });
        self.repo.modify_touchpoint(touchpoint_id, &mut |tp: &mut Touchpoint| {
            tp.record_engagement(time_on_page, scroll_depth);
        });
        debug!(user_id = %user_id, touchpoint_id = %touchpoint_id, "Engagement recorded");
        true
    }

    /// Mark the journey converted and record a conversion event, stamped
    /// with the input's `occurred_at` or the current time.
    ///
    /// The first conversion pins the journey's conversion fields; later ones
    /// leave them untouched but still produce their own event with the next
    /// sequence number. A journey with no touchpoints gets a synthetic direct
    /// one first.
    pub fn record_conversion(
        &self,
        user_id: &str,
        input: ConversionInput,
    ) -> AttributionOutcome<ConversionEvent> {
        input.validate()?;
        let now = input.occurred_at.unwrap_or_else(Utc::now);

        let mut synthesized = false;
        let mut first_conversion = false;
        let journey = self.repo.modify(user_id, now, &mut |journey: &mut UserJourney| {
            if journey.is_empty() {
                journey.insert_touchpoint(self.synthetic_touchpoint(now));
                synthesized = true;
            }
            first_conversion =
                journey.mark_converted(now, input.value, input.conversion_type);
        });

        if synthesized {
            info!(user_id = %user_id, "No touchpoints before conversion, added synthetic direct touchpoint");
        }
        if !first_conversion {
            warn!(
                user_id = %user_id,
                value = input.value,
                "Repeat conversion, journey keeps its first conversion"
            );
            metrics::counter!("attribution.conversions.repeat").increment(1);
        }

        let snapshot = journey.snapshot_for_conversion(now, input.value, input.conversion_type);
        let attribution = ConversionAttribution {
            first_touch: first_touch_attribution(&snapshot),
            last_touch: last_touch_attribution(&snapshot),
            linear: Vec::new(),
            time_decay: Vec::new(),
            position_based: Vec::new(),
        };

        let event = ConversionEvent {
            id: generate_id("conv", now),
            timestamp: now,
            user_id: user_id.to_string(),
            journey: snapshot,
            conversion_type: input.conversion_type,
            value: input.value,
            lead_data: input.lead_data,
            attribution,
            sequence: 0,
        };
        let event = self.repo.save_conversion(event);

        info!(
            user_id = %user_id,
            conversion_id = %event.id,
            conversion_type = ?event.conversion_type,
            value = event.value,
            sequence = event.sequence,
            first_touch = %event.attribution.first_touch.channel,
            last_touch = %event.attribution.last_touch.channel,
            "Conversion recorded"
        );
        Ok(event)
    }

    /// Persist a conversion whose attribution was completed by the caller.
    pub fn update_conversion(&self, event: &ConversionEvent) -> bool {
        let replaced = self.repo.replace_conversion(event.clone());
        if !replaced {
            warn!(conversion_id = %event.id, "Conversion to update not found");
        }
        replaced
    }

    pub fn get_all_journeys(&self) -> Vec<UserJourney> {
        self.repo.list_journeys()
    }

    pub fn get_all_conversions(&self) -> Vec<ConversionEvent> {
        self.repo.list_conversions()
    }

    pub fn get_all_touchpoints(&self) -> Vec<Touchpoint> {
        self.repo.list_touchpoints()
    }

    pub fn get_journeys_by_channel(&self, channel: MarketingChannel) -> Vec<UserJourney> {
        self.repo.list_by_channel(channel)
    }

    pub fn get_conversions_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<ConversionEvent> {
        self.repo.list_by_date_range(start, end)
    }

    /// Wipe journeys, conversions and the flat touchpoint list.
    pub fn clear_all_data(&self) {
        self.repo.clear();
        info!("All attribution data cleared");
    }

    fn synthetic_touchpoint(&self, at: DateTime<Utc>) -> Touchpoint {
        Touchpoint::builder(SYNTHETIC_TOUCHPOINT_URL)
            .timestamp(at)
            .title("Direct")
            .source("direct")
            .medium("none")
            .build(&self.classifier)
    }
}
