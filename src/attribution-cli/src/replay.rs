//! JSON-lines event log: one page visit or conversion per line.
//!
//! ```text
//! {"kind":"page_visit","user_id":"v1","url":"https://site/?utm_source=x","title":"Home"}
//! {"kind":"conversion","user_id":"v1","type":"contact-form","value":300,"occurred_at":"2026-01-07T12:00:00Z"}
//! ```
//!
//! Visits and conversions without `occurred_at` are stamped at replay time.

use std::io::BufRead;

use attribution_core::types::ConversionInput;
use attribution_core::AttributionOutcome;
use attribution_journey::AttributionTracker;
use attribution_tracking::PageVisit;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    PageVisit {
        user_id: String,
        #[serde(flatten)]
        visit: PageVisit,
    },
    Conversion {
        user_id: String,
        #[serde(flatten)]
        input: ConversionInput,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayStats {
    pub visits: usize,
    pub conversions: usize,
    pub dropped: usize,
}

/// Decode a log. Blank lines are skipped; undecodable lines are logged and
/// counted as dropped.
pub fn read_events<R: BufRead>(reader: R) -> AttributionOutcome<(Vec<LogEvent>, usize)> {
    let mut events = Vec::new();
    let mut dropped = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping undecodable event");
                metrics::counter!("attribution.events.dropped").increment(1);
                dropped += 1;
            }
        }
    }
    Ok((events, dropped))
}

/// Feed decoded events through the tracker in log order.
pub fn replay(tracker: &AttributionTracker, events: Vec<LogEvent>, dropped: usize) -> ReplayStats {
    let mut stats = ReplayStats {
        dropped,
        ..Default::default()
    };
    for event in events {
        match event {
            LogEvent::PageVisit { user_id, visit } => {
                tracker.track_page_visit(&user_id, &visit);
                stats.visits += 1;
            }
            LogEvent::Conversion { user_id, input } => {
                match tracker.track_conversion(&user_id, input) {
                    Ok(_) => stats.conversions += 1,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Conversion rejected");
                        stats.dropped += 1;
                    }
                }
            }
        }
    }
    info!(
        visits = stats.visits,
        conversions = stats.conversions,
        dropped = stats.dropped,
        "Replay finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use attribution_core::config::AppConfig;
    use attribution_core::types::ConversionType;

    const LOG: &str = r#"
{"kind":"page_visit","user_id":"v1","url":"https://example.com/?utm_source=newsletter&utm_medium=email","title":"Home"}
{"kind":"page_visit","user_id":"v1","url":"https://example.com/contact","title":"Contact","referrer":"https://example.com/"}
not json
{"kind":"conversion","user_id":"v1","type":"contact-form","value":300,"lead_data":{"email":"a@b.co"}}
{"kind":"conversion","user_id":"v2","type":"purchase","value":-1}
"#;

    #[test]
    fn test_read_events() {
        let (events, dropped) = read_events(LOG.as_bytes()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(dropped, 1);
        match &events[2] {
            LogEvent::Conversion { user_id, input } => {
                assert_eq!(user_id, "v1");
                assert_eq!(input.conversion_type, ConversionType::ContactForm);
                assert_eq!(input.value, 300.0);
            }
            other => panic!("Expected conversion, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_keeps_historical_times() {
        let log = r#"
{"kind":"page_visit","user_id":"v1","url":"https://example.com/?utm_source=newsletter&utm_medium=email","title":"Home","occurred_at":"2026-01-01T12:00:00Z"}
{"kind":"page_visit","user_id":"v1","url":"https://example.com/contact","title":"Contact","occurred_at":"2026-01-07T12:00:00Z"}
{"kind":"conversion","user_id":"v1","type":"contact-form","value":300,"occurred_at":"2026-01-07T12:00:00Z"}
"#;
        let (events, dropped) = read_events(log.as_bytes()).unwrap();
        let tracker = AttributionTracker::new(&AppConfig::default());
        replay(&tracker, events, dropped);

        let conversions = tracker.store().get_all_conversions();
        assert_eq!(conversions.len(), 1);
        let conversion = &conversions[0];
        assert_eq!(
            conversion.timestamp.to_rfc3339(),
            "2026-01-07T12:00:00+00:00"
        );
        assert!((conversion.days_to_conversion() - 6.0).abs() < 1e-9);

        // The conversion happened at the last touch, so its decay weight is 1.
        let decay = &conversion.attribution.time_decay;
        let expected_first = 2f64.powf(-6.0 / 7.0) / (1.0 + 2f64.powf(-6.0 / 7.0));
        assert!((decay[0].credit - expected_first).abs() < 1e-9);

        let perf = tracker.channel_performance();
        let direct = perf
            .iter()
            .find(|p| p.channel == attribution_core::MarketingChannel::Direct)
            .unwrap();
        assert!((direct.average_time_to_conversion - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_replay_counts() {
        let (events, dropped) = read_events(LOG.as_bytes()).unwrap();
        let tracker = AttributionTracker::new(&AppConfig::default());
        let stats = replay(&tracker, events, dropped);
        assert_eq!(stats.visits, 2);
        assert_eq!(stats.conversions, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(tracker.store().get_all_conversions().len(), 1);
    }
}
