//! Attribution tracker — the entry point page and form handlers call.
//!
//! page visit → touchpoint factory → store;
//! conversion → store → attribution engine → stored, fully attributed event.

use std::sync::Arc;

use attribution_core::config::AppConfig;
use attribution_core::event_bus::{make_event, EventSink};
use attribution_core::types::{
    ConversionEvent, ConversionInput, EventType, JourneySummary, Touchpoint,
};
use attribution_core::{AttributionOutcome, ChannelClassifier};
use attribution_reporting::attribution::AttributionEngine;
use attribution_reporting::performance::{
    calculate_channel_performance_with_limit, model_comparison, ChannelPerformance, ModelRevenue,
};
use attribution_tracking::{PageVisit, TouchpointFactory};
use chrono::Utc;
use tracing::info;

use crate::repository::{InMemoryJourneyRepository, JourneyRepository};
use crate::store::JourneyStore;

#[derive(Clone)]
pub struct AttributionTracker {
    store: JourneyStore,
    factory: TouchpointFactory,
    engine: AttributionEngine,
    top_sources_limit: usize,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for AttributionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionTracker")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .field("top_sources_limit", &self.top_sources_limit)
            .finish()
    }
}

impl AttributionTracker {
    /// Tracker over a fresh in-memory repository.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_repository(config, InMemoryJourneyRepository::shared())
    }

    pub fn with_repository(config: &AppConfig, repo: Arc<dyn JourneyRepository>) -> Self {
        let classifier = ChannelClassifier::new(&config.site.domains);
        Self {
            store: JourneyStore::new(repo, classifier.clone()),
            factory: TouchpointFactory::new(classifier),
            engine: AttributionEngine::new(&config.attribution),
            top_sources_limit: config.reporting.top_sources_limit,
            event_sink: attribution_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting analytics events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn store(&self) -> &JourneyStore {
        &self.store
    }

    pub fn engine(&self) -> &AttributionEngine {
        &self.engine
    }

    /// Record a page view for `user_id` and return the stored touchpoint.
    pub fn track_page_visit(&self, user_id: &str, visit: &PageVisit) -> Touchpoint {
        let touchpoint = self.factory.create_touchpoint(visit);
        let (_, first) = self.store.append_touchpoint(user_id, touchpoint.clone());

        if first {
            self.event_sink.emit(make_event(
                EventType::JourneyStarted,
                user_id,
                Some(touchpoint.channel()),
            ));
        }
        let mut event = make_event(
            EventType::TouchpointRecorded,
            user_id,
            Some(touchpoint.channel()),
        );
        event.touchpoint_id = Some(touchpoint.id.clone());
        self.event_sink.emit(event);
        metrics::counter!("attribution.touchpoints.recorded").increment(1);

        touchpoint
    }

    /// Record a conversion and attach all five attribution models to it.
    pub fn track_conversion(
        &self,
        user_id: &str,
        input: ConversionInput,
    ) -> AttributionOutcome<ConversionEvent> {
        let mut conversion = self.store.record_conversion(user_id, input)?;

        let mut recorded = make_event(EventType::ConversionRecorded, user_id, None);
        recorded.conversion_id = Some(conversion.id.clone());
        recorded.value = Some(conversion.value);
        self.event_sink.emit(recorded);

        self.engine.complete(&mut conversion);
        self.store.update_conversion(&conversion);

        let mut attributed = make_event(
            EventType::ConversionAttributed,
            user_id,
            Some(conversion.attribution.last_touch.channel),
        );
        attributed.conversion_id = Some(conversion.id.clone());
        attributed.value = Some(conversion.value);
        self.event_sink.emit(attributed);
        metrics::counter!("attribution.conversions.recorded").increment(1);

        info!(
            user_id = %user_id,
            conversion_id = %conversion.id,
            touchpoints = conversion.journey.touchpoint_count(),
            "Conversion attributed"
        );
        Ok(conversion)
    }

    /// Per-channel rollup over everything stored so far.
    pub fn channel_performance(&self) -> Vec<ChannelPerformance> {
        calculate_channel_performance_with_limit(
            &self.store.get_all_conversions(),
            &self.store.get_all_touchpoints(),
            self.top_sources_limit,
        )
    }

    pub fn model_comparison(&self) -> Vec<ModelRevenue> {
        model_comparison(&self.store.get_all_conversions())
    }

    pub fn journey_summaries(&self) -> Vec<JourneySummary> {
        let now = Utc::now();
        self.store
            .get_all_journeys()
            .iter()
            .map(|j| j.summary(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attribution_core::event_bus::capture_sink;
    use attribution_core::types::ConversionType;
    use attribution_core::MarketingChannel;

    #[test]
    fn test_full_flow_emits_events() {
        let sink = capture_sink();
        let tracker =
            AttributionTracker::new(&AppConfig::default()).with_event_sink(sink.clone());

        tracker.track_page_visit(
            "visitor",
            &PageVisit::new("https://example.com/?utm_source=newsletter&utm_medium=email", "Home"),
        );
        tracker.track_page_visit("visitor", &PageVisit::new("https://example.com/contact", "Contact"));
        let conversion = tracker
            .track_conversion("visitor", ConversionInput::new(ConversionType::ContactForm, 200.0))
            .unwrap();

        assert!(conversion.attribution.is_complete());
        assert_eq!(conversion.attribution.linear.len(), 2);
        assert_eq!(sink.count_type(EventType::JourneyStarted), 1);
        assert_eq!(sink.count_type(EventType::TouchpointRecorded), 2);
        assert_eq!(sink.count_type(EventType::ConversionRecorded), 1);
        assert_eq!(sink.count_type(EventType::ConversionAttributed), 1);

        // The stored copy carries the completed attribution too.
        let stored = tracker.store().get_all_conversions();
        assert_eq!(stored[0], conversion);

        let perf = tracker.channel_performance();
        let email = perf
            .iter()
            .find(|p| p.channel == MarketingChannel::Email)
            .unwrap();
        assert_eq!(email.visits, 1);
        assert_eq!(email.first_touch_revenue, 200.0);
        assert!((email.linear_revenue - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_journey_started_after_precreate() {
        let sink = capture_sink();
        let tracker =
            AttributionTracker::new(&AppConfig::default()).with_event_sink(sink.clone());

        tracker.store().get_or_create_journey("visitor");
        assert_eq!(sink.count_type(EventType::JourneyStarted), 0);

        tracker.track_page_visit("visitor", &PageVisit::new("https://example.com/", "Home"));
        tracker.track_page_visit("visitor", &PageVisit::new("https://example.com/a", "A"));
        assert_eq!(sink.count_type(EventType::JourneyStarted), 1);
        assert_eq!(sink.count_type(EventType::TouchpointRecorded), 2);
    }

    #[test]
    fn test_site_domains_from_config() {
        let mut config = AppConfig::default();
        config.site.domains = vec!["example.com".to_string()];
        let tracker = AttributionTracker::new(&config);
        let tp = tracker.track_page_visit(
            "v",
            &PageVisit::new("https://example.com/b", "B").with_referrer("https://example.com/a"),
        );
        assert_eq!(tp.channel(), MarketingChannel::Direct);
        assert_eq!(tracker.journey_summaries()[0].touchpoint_count, 1);
    }
}
