use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::channels::{ChannelClassifier, MarketingChannel};
use crate::error::{AttributionError, AttributionOutcome};

/// Tracking id built from the current time and a random suffix. Unique
/// enough for display and joins; not a security token.
pub fn generate_id(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_{}_{}", prefix, at.timestamp_millis(), suffix)
}

// ─── Touchpoints ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// One recorded visit. The traffic fields are private because `channel` is
/// derived from them; change them through [`Touchpoint::retag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub path: String,
    pub title: String,
    source: String,
    medium: String,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
    channel: MarketingChannel,
    referrer: Option<String>,
    referrer_domain: Option<String>,
    pub time_on_page: Option<f64>,
    pub scroll_depth: Option<f64>,
    pub engaged: Option<bool>,
    pub device: Option<DeviceType>,
    pub location: Option<GeoLocation>,
}

/// Seconds on page at which a visit counts as engaged.
pub const ENGAGED_TIME_SECS: f64 = 10.0;
/// Scroll percentage at which a visit counts as engaged.
pub const ENGAGED_SCROLL_PERCENT: f64 = 50.0;

impl Touchpoint {
    pub fn builder(url: impl Into<String>) -> TouchpointBuilder {
        TouchpointBuilder::new(url)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn medium(&self) -> &str {
        &self.medium
    }

    pub fn channel(&self) -> MarketingChannel {
        self.channel
    }

    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    pub fn referrer_domain(&self) -> Option<&str> {
        self.referrer_domain.as_deref()
    }

    /// Replace the source/medium tags and re-derive the channel.
    pub fn retag(
        &mut self,
        source: Option<&str>,
        medium: Option<&str>,
        classifier: &ChannelClassifier,
    ) {
        self.source = source.unwrap_or("direct").to_string();
        self.medium = medium.unwrap_or("none").to_string();
        self.reclassify(classifier);
    }

    /// Re-derive the channel from the current traffic fields.
    pub fn reclassify(&mut self, classifier: &ChannelClassifier) {
        self.channel = classifier.classify(
            Some(&self.source),
            Some(&self.medium),
            self.referrer.as_deref(),
            self.referrer_domain.as_deref(),
        );
    }

    /// Update the informational engagement signals.
    pub fn record_engagement(&mut self, time_on_page: Option<f64>, scroll_depth: Option<f64>) {
        if time_on_page.is_some() {
            self.time_on_page = time_on_page;
        }
        if scroll_depth.is_some() {
            self.scroll_depth = scroll_depth;
        }
        let engaged = self.time_on_page.is_some_and(|t| t >= ENGAGED_TIME_SECS)
            || self.scroll_depth.is_some_and(|s| s >= ENGAGED_SCROLL_PERCENT);
        self.engaged = Some(engaged);
    }
}

/// Builder for [`Touchpoint`]. `build` applies the `direct`/`none` defaults
/// and derives the channel.
#[derive(Debug, Clone)]
pub struct TouchpointBuilder {
    id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    url: String,
    path: Option<String>,
    title: String,
    source: Option<String>,
    medium: Option<String>,
    campaign: Option<String>,
    term: Option<String>,
    content: Option<String>,
    referrer: Option<String>,
    referrer_domain: Option<String>,
    device: Option<DeviceType>,
    location: Option<GeoLocation>,
}

impl TouchpointBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: None,
            url: url.into(),
            path: None,
            title: String::new(),
            source: None,
            medium: None,
            campaign: None,
            term: None,
            content: None,
            referrer: None,
            referrer_domain: None,
            device: None,
            location: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn medium(mut self, medium: impl Into<String>) -> Self {
        self.medium = Some(medium.into());
        self
    }

    pub fn campaign(mut self, campaign: Option<String>) -> Self {
        self.campaign = campaign;
        self
    }

    pub fn term(mut self, term: Option<String>) -> Self {
        self.term = term;
        self
    }

    pub fn content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn referrer_domain(mut self, domain: Option<String>) -> Self {
        self.referrer_domain = domain;
        self
    }

    pub fn device(mut self, device: DeviceType) -> Self {
        self.device = Some(device);
        self
    }

    pub fn location(mut self, location: Option<GeoLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn build(self, classifier: &ChannelClassifier) -> Touchpoint {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let path = self.path.unwrap_or_else(|| path_of(&self.url));
        let mut touchpoint = Touchpoint {
            id: self.id.unwrap_or_else(|| generate_id("tp", timestamp)),
            timestamp,
            url: self.url,
            path,
            title: self.title,
            source: String::new(),
            medium: String::new(),
            campaign: self.campaign,
            term: self.term,
            content: self.content,
            channel: MarketingChannel::Other,
            referrer: self.referrer.filter(|r| !r.trim().is_empty()),
            referrer_domain: self.referrer_domain,
            time_on_page: None,
            scroll_depth: None,
            engaged: None,
            device: self.device,
            location: self.location,
        };
        touchpoint.retag(
            self.source.as_deref().filter(|s| !s.is_empty()),
            self.medium.as_deref().filter(|m| !m.is_empty()),
            classifier,
        );
        touchpoint
    }
}

fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

// ─── Journeys ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionType {
    ContactForm,
    Purchase,
    Signup,
    DemoRequest,
}

/// One visitor's touchpoint history and conversion outcome.
///
/// Touchpoints are kept in timestamp order. Counts, first/last touch and
/// time-on-site figures are computed from them on demand rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJourney {
    pub user_id: String,
    touchpoints: Vec<Touchpoint>,
    pub created_at: DateTime<Utc>,
    converted: bool,
    conversion_at: Option<DateTime<Utc>>,
    conversion_value: Option<f64>,
    conversion_type: Option<ConversionType>,
}

impl UserJourney {
    pub fn new(user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            touchpoints: Vec::new(),
            created_at,
            converted: false,
            conversion_at: None,
            conversion_value: None,
            conversion_type: None,
        }
    }

    pub fn touchpoints(&self) -> &[Touchpoint] {
        &self.touchpoints
    }

    /// Update engagement signals on one touchpoint. Returns false if the
    /// journey has no touchpoint with that id.
    pub fn record_engagement_for(
        &mut self,
        touchpoint_id: &str,
        time_on_page: Option<f64>,
        scroll_depth: Option<f64>,
    ) -> bool {
        match self.touchpoints.iter_mut().find(|t| t.id == touchpoint_id) {
            Some(tp) => {
                tp.record_engagement(time_on_page, scroll_depth);
                true
            }
            None => false,
        }
    }

    /// Insert at the touchpoint's chronological position. Equal timestamps
    /// keep arrival order.
    pub fn insert_touchpoint(&mut self, touchpoint: Touchpoint) {
        let at = self
            .touchpoints
            .partition_point(|t| t.timestamp <= touchpoint.timestamp);
        self.touchpoints.insert(at, touchpoint);
    }

    pub fn touchpoint_count(&self) -> usize {
        self.touchpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touchpoints.is_empty()
    }

    pub fn first_touch_at(&self) -> DateTime<Utc> {
        self.touchpoints
            .first()
            .map_or(self.created_at, |t| t.timestamp)
    }

    pub fn last_touch_at(&self) -> DateTime<Utc> {
        self.touchpoints
            .last()
            .map_or(self.created_at, |t| t.timestamp)
    }

    /// Whole days between the first touch and `now`.
    pub fn days_since_first_touch(&self, now: DateTime<Utc>) -> i64 {
        (now - self.first_touch_at()).num_days().max(0)
    }

    /// Sum of `time_on_page` over touchpoints that report it.
    pub fn total_time_spent(&self) -> f64 {
        self.touchpoints.iter().filter_map(|t| t.time_on_page).sum()
    }

    pub fn average_time_per_page(&self) -> f64 {
        let timed = self
            .touchpoints
            .iter()
            .filter(|t| t.time_on_page.is_some())
            .count();
        if timed > 0 {
            self.total_time_spent() / timed as f64
        } else {
            0.0
        }
    }

    pub fn has_channel(&self, channel: MarketingChannel) -> bool {
        self.touchpoints.iter().any(|t| t.channel() == channel)
    }

    pub fn converted(&self) -> bool {
        self.converted
    }

    pub fn conversion_at(&self) -> Option<DateTime<Utc>> {
        self.conversion_at
    }

    pub fn conversion_value(&self) -> Option<f64> {
        self.conversion_value
    }

    pub fn conversion_type(&self) -> Option<ConversionType> {
        self.conversion_type
    }

    /// Set the conversion outcome. Only the first call takes effect; returns
    /// whether this call set it.
    pub fn mark_converted(
        &mut self,
        at: DateTime<Utc>,
        value: f64,
        conversion_type: ConversionType,
    ) -> bool {
        if self.converted {
            return false;
        }
        self.converted = true;
        self.conversion_at = Some(at);
        self.conversion_value = Some(value);
        self.conversion_type = Some(conversion_type);
        true
    }

    /// Copy of the journey as seen by one particular conversion. Repeat
    /// conversions get their own time and value here while the stored
    /// journey keeps the first outcome.
    pub fn snapshot_for_conversion(
        &self,
        at: DateTime<Utc>,
        value: f64,
        conversion_type: ConversionType,
    ) -> UserJourney {
        let mut snapshot = self.clone();
        snapshot.converted = true;
        snapshot.conversion_at = Some(at);
        snapshot.conversion_value = Some(value);
        snapshot.conversion_type = Some(conversion_type);
        snapshot
    }

    pub fn summary(&self, now: DateTime<Utc>) -> JourneySummary {
        JourneySummary {
            user_id: self.user_id.clone(),
            touchpoint_count: self.touchpoint_count(),
            first_touch_at: self.first_touch_at(),
            last_touch_at: self.last_touch_at(),
            days_since_first_touch: self.days_since_first_touch(now),
            total_time_spent: self.total_time_spent(),
            average_time_per_page: self.average_time_per_page(),
            channels: self.touchpoints.iter().map(|t| t.channel()).collect(),
            converted: self.converted,
            conversion_at: self.conversion_at,
            conversion_value: self.conversion_value,
            conversion_type: self.conversion_type,
        }
    }
}

/// Flattened journey snapshot for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneySummary {
    pub user_id: String,
    pub touchpoint_count: usize,
    pub first_touch_at: DateTime<Utc>,
    pub last_touch_at: DateTime<Utc>,
    pub days_since_first_touch: i64,
    pub total_time_spent: f64,
    pub average_time_per_page: f64,
    pub channels: Vec<MarketingChannel>,
    pub converted: bool,
    pub conversion_at: Option<DateTime<Utc>>,
    pub conversion_value: Option<f64>,
    pub conversion_type: Option<ConversionType>,
}

// ─── Conversions ────────────────────────────────────────────────────────────

/// Contact details captured by a lead form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub service: Option<String>,
    pub budget: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// What a conversion handler supplies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionInput {
    #[serde(rename = "type")]
    pub conversion_type: ConversionType,
    pub value: f64,
    #[serde(default)]
    pub lead_data: Option<LeadData>,
    /// When the conversion happened. Defaults to the time of recording.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ConversionInput {
    pub fn new(conversion_type: ConversionType, value: f64) -> Self {
        Self {
            conversion_type,
            value,
            lead_data: None,
            occurred_at: None,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn with_lead_data(mut self, lead_data: LeadData) -> Self {
        self.lead_data = Some(lead_data);
        self
    }

    pub fn validate(&self) -> AttributionOutcome<()> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(AttributionError::Validation(format!(
                "conversion value must be a non-negative amount, got {}",
                self.value
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    FirstTouch,
    LastTouch,
    Linear,
    TimeDecay,
    PositionBased,
}

impl AttributionModel {
    pub const ALL: [AttributionModel; 5] = [
        AttributionModel::FirstTouch,
        AttributionModel::LastTouch,
        AttributionModel::Linear,
        AttributionModel::TimeDecay,
        AttributionModel::PositionBased,
    ];
}

/// Credit assigned to one touchpoint by one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub touchpoint: Touchpoint,
    pub credit: f64,
    pub value: f64,
    pub channel: MarketingChannel,
}

impl AttributionResult {
    pub fn new(touchpoint: &Touchpoint, credit: f64, conversion_value: f64) -> Self {
        Self {
            touchpoint: touchpoint.clone(),
            credit,
            value: credit * conversion_value,
            channel: touchpoint.channel(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionAttribution {
    pub first_touch: AttributionResult,
    pub last_touch: AttributionResult,
    #[serde(default)]
    pub linear: Vec<AttributionResult>,
    #[serde(default)]
    pub time_decay: Vec<AttributionResult>,
    #[serde(default)]
    pub position_based: Vec<AttributionResult>,
}

impl ConversionAttribution {
    pub fn for_model(&self, model: AttributionModel) -> &[AttributionResult] {
        match model {
            AttributionModel::FirstTouch => std::slice::from_ref(&self.first_touch),
            AttributionModel::LastTouch => std::slice::from_ref(&self.last_touch),
            AttributionModel::Linear => &self.linear,
            AttributionModel::TimeDecay => &self.time_decay,
            AttributionModel::PositionBased => &self.position_based,
        }
    }

    /// True once the multi-touch models have been filled in.
    pub fn is_complete(&self) -> bool {
        !self.linear.is_empty() && !self.time_decay.is_empty() && !self.position_based.is_empty()
    }
}

/// One completed conversion tied to a journey snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub journey: UserJourney,
    #[serde(rename = "type")]
    pub conversion_type: ConversionType,
    pub value: f64,
    pub lead_data: Option<LeadData>,
    pub attribution: ConversionAttribution,
    /// 1-based position of this conversion among the user's conversions.
    pub sequence: u32,
}

impl ConversionEvent {
    pub fn first_touchpoint(&self) -> Option<&Touchpoint> {
        self.journey.touchpoints().first()
    }

    pub fn last_touchpoint(&self) -> Option<&Touchpoint> {
        self.journey.touchpoints().last()
    }

    /// Days from the journey's first touch to this conversion.
    pub fn days_to_conversion(&self) -> f64 {
        let at = self.journey.conversion_at().unwrap_or(self.timestamp);
        (at - self.journey.first_touch_at()).num_milliseconds() as f64 / MILLIS_PER_DAY
    }
}

pub const MILLIS_PER_DAY: f64 = 86_400_000.0;

// ─── Analytics events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub user_id: String,
    pub touchpoint_id: Option<String>,
    pub conversion_id: Option<String>,
    pub channel: Option<MarketingChannel>,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JourneyStarted,
    TouchpointRecorded,
    ConversionRecorded,
    ConversionAttributed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn touch(at: DateTime<Utc>, source: &str) -> Touchpoint {
        Touchpoint::builder("https://example.com/")
            .timestamp(at)
            .source(source)
            .medium("email")
            .build(&ChannelClassifier::default())
    }

    #[test]
    fn test_builder_defaults() {
        let tp = Touchpoint::builder("https://example.com/pricing?plan=pro")
            .title("Pricing")
            .build(&ChannelClassifier::default());
        assert_eq!(tp.source(), "direct");
        assert_eq!(tp.medium(), "none");
        assert_eq!(tp.channel(), MarketingChannel::Direct);
        assert_eq!(tp.path, "/pricing");
        assert!(tp.id.starts_with("tp_"));
    }

    #[test]
    fn test_retag_reclassifies() {
        let classifier = ChannelClassifier::default();
        let mut tp = Touchpoint::builder("https://example.com/").build(&classifier);
        assert_eq!(tp.channel(), MarketingChannel::Direct);
        tp.retag(Some("google"), Some("cpc"), &classifier);
        assert_eq!(tp.channel(), MarketingChannel::PaidSearch);
    }

    #[test]
    fn test_insert_keeps_chronological_order() {
        let now = Utc::now();
        let mut journey = UserJourney::new("u1", now);
        journey.insert_touchpoint(touch(now, "b"));
        journey.insert_touchpoint(touch(now - Duration::hours(2), "a"));
        journey.insert_touchpoint(touch(now + Duration::hours(1), "c"));
        journey.insert_touchpoint(touch(now, "b2"));

        let sources: Vec<_> = journey.touchpoints().iter().map(|t| t.source()).collect();
        assert_eq!(sources, vec!["a", "b", "b2", "c"]);
        assert_eq!(journey.first_touch_at(), now - Duration::hours(2));
        assert_eq!(journey.last_touch_at(), now + Duration::hours(1));
        assert_eq!(journey.touchpoint_count(), 4);
    }

    #[test]
    fn test_time_accessors() {
        let now = Utc::now();
        let mut journey = UserJourney::new("u1", now);
        assert_eq!(journey.average_time_per_page(), 0.0);

        let mut a = touch(now - Duration::days(3), "a");
        a.record_engagement(Some(30.0), None);
        let mut b = touch(now - Duration::days(1), "b");
        b.record_engagement(Some(5.0), Some(20.0));
        journey.insert_touchpoint(a);
        journey.insert_touchpoint(b);
        journey.insert_touchpoint(touch(now, "c"));

        assert_eq!(journey.total_time_spent(), 35.0);
        assert_eq!(journey.average_time_per_page(), 17.5);
        assert_eq!(journey.days_since_first_touch(now), 3);
        assert_eq!(journey.touchpoints()[0].engaged, Some(true));
        assert_eq!(journey.touchpoints()[1].engaged, Some(false));
    }

    #[test]
    fn test_record_engagement_for() {
        let now = Utc::now();
        let mut journey = UserJourney::new("u1", now);
        let early = touch(now - Duration::hours(1), "a");
        let late = touch(now, "b");
        let late_id = late.id.clone();
        journey.insert_touchpoint(late);
        journey.insert_touchpoint(early);

        assert!(journey.record_engagement_for(&late_id, Some(12.0), None));
        assert!(!journey.record_engagement_for("missing", Some(1.0), None));

        assert_eq!(journey.touchpoints()[1].id, late_id);
        assert_eq!(journey.touchpoints()[1].engaged, Some(true));
        assert_eq!(journey.touchpoints()[0].engaged, None);
        assert_eq!(journey.total_time_spent(), 12.0);
    }

    #[test]
    fn test_conversion_input_timestamp() {
        let input: ConversionInput = serde_json::from_str(
            r#"{"type":"purchase","value":10,"occurred_at":"2026-01-07T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            input.occurred_at.map(|t| t.to_rfc3339()),
            Some("2026-01-07T12:00:00+00:00".to_string())
        );
        let input: ConversionInput =
            serde_json::from_str(r#"{"type":"signup","value":0}"#).unwrap();
        assert!(input.occurred_at.is_none());
    }

    #[test]
    fn test_conversion_set_once() {
        let now = Utc::now();
        let mut journey = UserJourney::new("u1", now);
        assert!(journey.mark_converted(now, 100.0, ConversionType::Purchase));
        assert!(!journey.mark_converted(now + Duration::hours(1), 5.0, ConversionType::Signup));
        assert_eq!(journey.conversion_value(), Some(100.0));
        assert_eq!(journey.conversion_type(), Some(ConversionType::Purchase));
        assert_eq!(journey.conversion_at(), Some(now));
    }

    #[test]
    fn test_conversion_input_validation() {
        assert!(ConversionInput::new(ConversionType::ContactForm, 0.0)
            .validate()
            .is_ok());
        assert!(ConversionInput::new(ConversionType::Purchase, -1.0)
            .validate()
            .is_err());
        assert!(ConversionInput::new(ConversionType::Purchase, f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_generate_id_shape() {
        let now = Utc::now();
        let a = generate_id("conv", now);
        let b = generate_id("conv", now);
        assert!(a.starts_with(&format!("conv_{}_", now.timestamp_millis())));
        assert_ne!(a, b);
    }
}
