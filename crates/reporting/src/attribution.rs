//! Multi-touch revenue attribution — splits a conversion's value across the
//! touchpoints of the journey that led to it.
//!
//! Every model works on a timestamp-sorted copy of the journey, so the
//! result does not depend on the order in which touchpoints arrived.
//! Array-valued models return one result per touchpoint whose credits sum
//! to 1.0 and whose values sum to the conversion value.

use attribution_core::config::AttributionConfig;
use attribution_core::types::{
    AttributionModel, AttributionResult, ConversionAttribution, ConversionEvent, Touchpoint,
    UserJourney, MILLIS_PER_DAY,
};
use tracing::debug;

pub const DEFAULT_HALF_LIFE_DAYS: f64 = 7.0;
pub const DEFAULT_POSITION_FIRST_WEIGHT: f64 = 0.4;
pub const DEFAULT_POSITION_LAST_WEIGHT: f64 = 0.4;

fn chronological(journey: &UserJourney) -> Vec<&Touchpoint> {
    let mut touches: Vec<&Touchpoint> = journey.touchpoints().iter().collect();
    touches.sort_by_key(|t| t.timestamp);
    touches
}

fn conversion_value(journey: &UserJourney) -> f64 {
    journey.conversion_value().unwrap_or(0.0)
}

fn from_weights(touches: &[&Touchpoint], weights: &[f64], value: f64) -> Vec<AttributionResult> {
    let total: f64 = weights.iter().sum();
    touches
        .iter()
        .zip(weights)
        .map(|(t, w)| AttributionResult::new(t, w / total, value))
        .collect()
}

/// Full credit to the earliest touchpoint.
///
/// # Panics
///
/// The journey must have at least one touchpoint; the journey store
/// guarantees this for every recorded conversion.
pub fn first_touch_attribution(journey: &UserJourney) -> AttributionResult {
    debug_assert!(!journey.is_empty(), "attribution on an empty journey");
    let touches = chronological(journey);
    AttributionResult::new(touches[0], 1.0, conversion_value(journey))
}

/// Full credit to the touchpoint immediately preceding conversion.
///
/// # Panics
///
/// The journey must have at least one touchpoint.
pub fn last_touch_attribution(journey: &UserJourney) -> AttributionResult {
    debug_assert!(!journey.is_empty(), "attribution on an empty journey");
    let touches = chronological(journey);
    AttributionResult::new(touches[touches.len() - 1], 1.0, conversion_value(journey))
}

/// Equal `1/N` credit to each of the N touchpoints.
pub fn linear_attribution(journey: &UserJourney) -> Vec<AttributionResult> {
    let touches = chronological(journey);
    let value = conversion_value(journey);
    let credit = 1.0 / touches.len() as f64;
    touches
        .iter()
        .map(|t| AttributionResult::new(t, credit, value))
        .collect()
}

/// Exponential recency weighting with the default 7-day half-life.
pub fn time_decay_attribution(journey: &UserJourney) -> Vec<AttributionResult> {
    time_decay_attribution_with_half_life(journey, DEFAULT_HALF_LIFE_DAYS)
}

/// `weight = 2^(-days_before_conversion / half_life)`, normalised. Falls back
/// to linear when there is no conversion time to decay from, or when every
/// weight underflows.
pub fn time_decay_attribution_with_half_life(
    journey: &UserJourney,
    half_life_days: f64,
) -> Vec<AttributionResult> {
    let Some(anchor) = journey.conversion_at() else {
        debug!(user_id = %journey.user_id, "No conversion time, time decay falls back to linear");
        return linear_attribution(journey);
    };

    let touches = chronological(journey);
    let weights: Vec<f64> = touches
        .iter()
        .map(|t| {
            let days = (anchor - t.timestamp).num_milliseconds() as f64 / MILLIS_PER_DAY;
            2f64.powf(-days / half_life_days)
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        debug!(user_id = %journey.user_id, total, "Degenerate decay weights, falling back to linear");
        return linear_attribution(journey);
    }

    from_weights(&touches, &weights, conversion_value(journey))
}

/// U-shaped split with the default 40/20/40 weights.
pub fn position_based_attribution(journey: &UserJourney) -> Vec<AttributionResult> {
    position_based_attribution_with_weights(
        journey,
        DEFAULT_POSITION_FIRST_WEIGHT,
        DEFAULT_POSITION_LAST_WEIGHT,
    )
}

/// One touchpoint takes everything; two split by the end weights (50/50 by
/// default); three or more give `first`/`last` to the ends and share the
/// remainder evenly across the interior.
pub fn position_based_attribution_with_weights(
    journey: &UserJourney,
    first: f64,
    last: f64,
) -> Vec<AttributionResult> {
    let touches = chronological(journey);
    let value = conversion_value(journey);
    let n = touches.len();

    match n {
        0 => Vec::new(),
        1 => vec![AttributionResult::new(touches[0], 1.0, value)],
        2 => {
            let ends = first + last;
            let (a, b) = if ends > 0.0 {
                (first / ends, last / ends)
            } else {
                (0.5, 0.5)
            };
            vec![
                AttributionResult::new(touches[0], a, value),
                AttributionResult::new(touches[1], b, value),
            ]
        }
        _ => {
            let middle = (1.0 - first - last).max(0.0) / (n - 2) as f64;
            let mut weights = vec![middle; n];
            weights[0] = first;
            weights[n - 1] = last;
            if weights.iter().sum::<f64>() > 0.0 {
                from_weights(&touches, &weights, value)
            } else {
                linear_attribution(journey)
            }
        }
    }
}

/// Runs all five models with configured parameters.
#[derive(Debug, Clone)]
pub struct AttributionEngine {
    half_life_days: f64,
    position_first_weight: f64,
    position_last_weight: f64,
}

impl AttributionEngine {
    pub fn new(config: &AttributionConfig) -> Self {
        Self {
            half_life_days: config.time_decay_half_life_days,
            position_first_weight: config.position_first_weight,
            position_last_weight: config.position_last_weight,
        }
    }

    pub fn half_life_days(&self) -> f64 {
        self.half_life_days
    }

    /// Results for a single model. First/last-touch yield one entry.
    pub fn attribute_model(
        &self,
        journey: &UserJourney,
        model: AttributionModel,
    ) -> Vec<AttributionResult> {
        match model {
            AttributionModel::FirstTouch => vec![first_touch_attribution(journey)],
            AttributionModel::LastTouch => vec![last_touch_attribution(journey)],
            AttributionModel::Linear => linear_attribution(journey),
            AttributionModel::TimeDecay => {
                time_decay_attribution_with_half_life(journey, self.half_life_days)
            }
            AttributionModel::PositionBased => position_based_attribution_with_weights(
                journey,
                self.position_first_weight,
                self.position_last_weight,
            ),
        }
    }

    /// All five models. Same precondition as [`first_touch_attribution`].
    pub fn attribute(&self, journey: &UserJourney) -> ConversionAttribution {
        ConversionAttribution {
            first_touch: first_touch_attribution(journey),
            last_touch: last_touch_attribution(journey),
            linear: self.attribute_model(journey, AttributionModel::Linear),
            time_decay: self.attribute_model(journey, AttributionModel::TimeDecay),
            position_based: self.attribute_model(journey, AttributionModel::PositionBased),
        }
    }

    /// Fill in the multi-touch models of a conversion recorded by the store.
    pub fn complete(&self, event: &mut ConversionEvent) {
        event.attribution.linear = self.attribute_model(&event.journey, AttributionModel::Linear);
        event.attribution.time_decay =
            self.attribute_model(&event.journey, AttributionModel::TimeDecay);
        event.attribution.position_based =
            self.attribute_model(&event.journey, AttributionModel::PositionBased);
        debug!(
            conversion_id = %event.id,
            touchpoints = event.journey.touchpoint_count(),
            "Multi-touch attribution computed"
        );
    }
}

impl Default for AttributionEngine {
    fn default() -> Self {
        Self::new(&AttributionConfig::default())
    }
}
