//! Journey storage seam. The store and tracker only talk to
//! [`JourneyRepository`]; [`InMemoryJourneyRepository`] is the process-local
//! implementation used in development and tests.

use std::sync::Arc;

use attribution_core::types::{ConversionEvent, Touchpoint, UserJourney};
use attribution_core::MarketingChannel;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

/// Keyed journey/conversion storage. Every per-user mutation is atomic with
/// respect to other mutations of the same user.
pub trait JourneyRepository: Send + Sync {
    fn get(&self, user_id: &str) -> Option<UserJourney>;

    /// Existing journey, or a new empty one created at `now`. The flag is
    /// true when this call created it.
    fn get_or_create(&self, user_id: &str, now: DateTime<Utc>) -> (UserJourney, bool);

    fn upsert(&self, journey: UserJourney);

    /// Insert into the user's journey (creating it if needed) and into the
    /// flat reporting list. Returns the updated journey and whether this was
    /// its first touchpoint.
    fn append_touchpoint(&self, user_id: &str, touchpoint: Touchpoint) -> (UserJourney, bool);

    /// Apply `f` to the user's journey under its lock, creating the journey
    /// first if needed. Returns the updated journey.
    fn modify(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        f: &mut dyn FnMut(&mut UserJourney),
    ) -> UserJourney;

    /// Apply `f` to the matching touchpoint in the flat reporting list.
    fn modify_touchpoint(&self, touchpoint_id: &str, f: &mut dyn FnMut(&mut Touchpoint)) -> bool;

    /// Store a conversion, assigning its 1-based `sequence` among the
    /// user's conversions under the same lock. Returns the stored event.
    fn save_conversion(&self, conversion: ConversionEvent) -> ConversionEvent;

    /// Replace a stored conversion with the same id. Returns false if none.
    fn replace_conversion(&self, conversion: ConversionEvent) -> bool;

    fn conversion_count(&self, user_id: &str) -> usize;

    fn list_journeys(&self) -> Vec<UserJourney>;

    /// Journeys with at least one touchpoint on `channel`.
    fn list_by_channel(&self, channel: MarketingChannel) -> Vec<UserJourney>;

    /// All conversions, oldest first.
    fn list_conversions(&self) -> Vec<ConversionEvent>;

    /// Conversions with `start <= timestamp <= end`, oldest first.
    fn list_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Vec<ConversionEvent>;

    /// Every touchpoint in arrival order.
    fn list_touchpoints(&self) -> Vec<Touchpoint>;

    fn clear(&self);
}

/// DashMap-backed repository. Per-key locking comes from the map's shards;
/// the flat touchpoint list sits behind its own lock.
#[derive(Default)]
pub struct InMemoryJourneyRepository {
    journeys: DashMap<String, UserJourney>,
    conversions: DashMap<String, Vec<ConversionEvent>>,
    touchpoints: RwLock<Vec<Touchpoint>>,
}

impl std::fmt::Debug for InMemoryJourneyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryJourneyRepository")
            .field("journeys", &self.journeys.len())
            .field("conversions", &self.conversions.len())
            .field("touchpoints", &self.touchpoints.read().len())
            .finish()
    }
}

impl InMemoryJourneyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn JourneyRepository> {
        Arc::new(Self::new())
    }

    fn sorted(mut conversions: Vec<ConversionEvent>) -> Vec<ConversionEvent> {
        conversions.sort_by_key(|c| c.timestamp);
        conversions
    }
}

impl JourneyRepository for InMemoryJourneyRepository {
    fn get(&self, user_id: &str) -> Option<UserJourney> {
        self.journeys.get(user_id).map(|j| j.clone())
    }

    fn get_or_create(&self, user_id: &str, now: DateTime<Utc>) -> (UserJourney, bool) {
        let mut created = false;
        let journey = self
            .journeys
            .entry(user_id.to_string())
            .or_insert_with(|| {
                created = true;
                UserJourney::new(user_id, now)
            })
            .clone();
        (journey, created)
    }

    fn upsert(&self, journey: UserJourney) {
        self.journeys.insert(journey.user_id.clone(), journey);
    }

    fn append_touchpoint(&self, user_id: &str, touchpoint: Touchpoint) -> (UserJourney, bool) {
        let created_at = touchpoint.timestamp;
        self.touchpoints.write().push(touchpoint.clone());
        let mut entry = self
            .journeys
            .entry(user_id.to_string())
            .or_insert_with(|| UserJourney::new(user_id, created_at));
        let first = entry.is_empty();
        entry.insert_touchpoint(touchpoint);
        (entry.clone(), first)
    }

    fn modify(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        f: &mut dyn FnMut(&mut UserJourney),
    ) -> UserJourney {
        let mut entry = self
            .journeys
            .entry(user_id.to_string())
            .or_insert_with(|| UserJourney::new(user_id, now));
        f(&mut entry);
        entry.clone()
    }

    fn modify_touchpoint(&self, touchpoint_id: &str, f: &mut dyn FnMut(&mut Touchpoint)) -> bool {
        let mut touchpoints = self.touchpoints.write();
        match touchpoints.iter_mut().find(|t| t.id == touchpoint_id) {
            Some(tp) => {
                f(tp);
                true
            }
            None => false,
        }
    }

    fn save_conversion(&self, mut conversion: ConversionEvent) -> ConversionEvent {
        let mut list = self
            .conversions
            .entry(conversion.user_id.clone())
            .or_default();
        conversion.sequence = list.len() as u32 + 1;
        list.push(conversion.clone());
        conversion
    }

    fn replace_conversion(&self, conversion: ConversionEvent) -> bool {
        let Some(mut list) = self.conversions.get_mut(&conversion.user_id) else {
            return false;
        };
        match list.iter_mut().find(|c| c.id == conversion.id) {
            Some(slot) => {
                *slot = conversion;
                true
            }
            None => false,
        }
    }

    fn conversion_count(&self, user_id: &str) -> usize {
        self.conversions.get(user_id).map_or(0, |c| c.len())
    }

    fn list_journeys(&self) -> Vec<UserJourney> {
        let mut journeys: Vec<UserJourney> =
            self.journeys.iter().map(|j| j.value().clone()).collect();
        journeys.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        journeys
    }

    fn list_by_channel(&self, channel: MarketingChannel) -> Vec<UserJourney> {
        self.list_journeys()
            .into_iter()
            .filter(|j| j.has_channel(channel))
            .collect()
    }

    fn list_conversions(&self) -> Vec<ConversionEvent> {
        Self::sorted(
            self.conversions
                .iter()
                .flat_map(|c| c.value().clone())
                .collect(),
        )
    }

    fn list_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<ConversionEvent> {
        Self::sorted(
            self.conversions
                .iter()
                .flat_map(|c| {
                    c.value()
                        .iter()
                        .filter(|e| e.timestamp >= start && e.timestamp <= end)
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect(),
        )
    }

    fn list_touchpoints(&self) -> Vec<Touchpoint> {
        self.touchpoints.read().clone()
    }

    fn clear(&self) {
        self.journeys.clear();
        self.conversions.clear();
        self.touchpoints.write().clear();
    }
}
