//! Attribution event bus — trait for emitting analytics events from the
//! tracker.
//!
//! Modules accept an `Arc<dyn EventSink>` so that journey and conversion
//! activity can be forwarded to whatever pipeline the host application runs.

use crate::channels::MarketingChannel;
use crate::types::{generate_id, AnalyticsEvent, EventType};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

/// Trait for emitting analytics events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// No-op sink for tests and hosts that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: AnalyticsEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: AnalyticsEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for creating `AnalyticsEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    user_id: impl Into<String>,
    channel: Option<MarketingChannel>,
) -> AnalyticsEvent {
    let now = Utc::now();
    AnalyticsEvent {
        event_id: generate_id("evt", now),
        event_type,
        user_id: user_id.into(),
        touchpoint_id: None,
        conversion_id: None,
        channel,
        value: None,
        timestamp: now,
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(
            EventType::TouchpointRecorded,
            "user-1",
            Some(MarketingChannel::Email),
        ));
        let mut conversion = make_event(EventType::ConversionRecorded, "user-1", None);
        conversion.conversion_id = Some("conv-1".into());
        sink.emit(conversion);

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::TouchpointRecorded), 1);
        assert_eq!(sink.count_type(EventType::ConversionRecorded), 1);

        let events = sink.events();
        assert_eq!(events[0].channel, Some(MarketingChannel::Email));
        assert_eq!(events[1].conversion_id, Some("conv-1".into()));

        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(EventType::JourneyStarted, "user-1", None));
    }
}
