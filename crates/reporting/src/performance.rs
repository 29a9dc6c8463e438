//! Channel performance rollup — visits, conversions and per-model revenue
//! for each marketing channel, recomputed on demand from stored data.
//!
//! Conversions, total revenue and order value belong to the last-touch
//! channel. The per-model revenue fields give the multi-touch breakdown.

use std::collections::{BTreeMap, HashMap};

use attribution_core::types::{AttributionModel, ConversionEvent, Touchpoint};
use attribution_core::MarketingChannel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_SOURCES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePerformance {
    pub source: String,
    pub visits: u64,
    /// Revenue credited to this source by the linear model.
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPerformance {
    pub channel: MarketingChannel,
    pub visits: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub total_revenue: f64,
    pub first_touch_revenue: f64,
    pub last_touch_revenue: f64,
    pub linear_revenue: f64,
    pub time_decay_revenue: f64,
    pub position_based_revenue: f64,
    /// Mean days from first touch to conversion.
    pub average_time_to_conversion: f64,
    pub average_order_value: f64,
    pub revenue_per_visit: f64,
    pub top_sources: Vec<SourcePerformance>,
}

#[derive(Debug, Default)]
struct ChannelAccumulator {
    visits: u64,
    conversions: u64,
    total_revenue: f64,
    first_touch_revenue: f64,
    last_touch_revenue: f64,
    linear_revenue: f64,
    time_decay_revenue: f64,
    position_based_revenue: f64,
    conversion_days: Vec<f64>,
    sources: HashMap<String, (u64, f64)>,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Per-channel metrics with the default top-five source list.
pub fn calculate_channel_performance(
    conversions: &[ConversionEvent],
    touchpoints: &[Touchpoint],
) -> Vec<ChannelPerformance> {
    calculate_channel_performance_with_limit(conversions, touchpoints, DEFAULT_TOP_SOURCES)
}

/// Channels with neither visits nor conversions are left out. Output follows
/// [`MarketingChannel::ALL`] order.
pub fn calculate_channel_performance_with_limit(
    conversions: &[ConversionEvent],
    touchpoints: &[Touchpoint],
    top_sources_limit: usize,
) -> Vec<ChannelPerformance> {
    let mut acc: HashMap<MarketingChannel, ChannelAccumulator> = MarketingChannel::ALL
        .iter()
        .map(|c| (*c, ChannelAccumulator::default()))
        .collect();

    for tp in touchpoints {
        let entry = acc.entry(tp.channel()).or_default();
        entry.visits += 1;
        entry.sources.entry(tp.source().to_string()).or_default().0 += 1;
    }

    for conversion in conversions {
        let attribution = &conversion.attribution;

        let first = acc.entry(attribution.first_touch.channel).or_default();
        first.first_touch_revenue += attribution.first_touch.value;

        let last = acc.entry(attribution.last_touch.channel).or_default();
        last.last_touch_revenue += attribution.last_touch.value;
        last.conversions += 1;
        last.total_revenue += conversion.value;
        last.conversion_days.push(conversion.days_to_conversion());

        for result in &attribution.linear {
            let entry = acc.entry(result.channel).or_default();
            entry.linear_revenue += result.value;
            entry
                .sources
                .entry(result.touchpoint.source().to_string())
                .or_default()
                .1 += result.value;
        }
        for result in &attribution.time_decay {
            acc.entry(result.channel).or_default().time_decay_revenue += result.value;
        }
        for result in &attribution.position_based {
            acc.entry(result.channel).or_default().position_based_revenue += result.value;
        }
    }

    MarketingChannel::ALL
        .iter()
        .filter_map(|channel| {
            let a = acc.remove(channel)?;
            if a.visits == 0 && a.conversions == 0 {
                return None;
            }

            let mut top_sources: Vec<SourcePerformance> = a
                .sources
                .into_iter()
                .map(|(source, (visits, revenue))| SourcePerformance {
                    source,
                    visits,
                    revenue,
                })
                .collect();
            top_sources.sort_by(|x, y| {
                y.revenue
                    .total_cmp(&x.revenue)
                    .then(y.visits.cmp(&x.visits))
                    .then_with(|| x.source.cmp(&y.source))
            });
            top_sources.truncate(top_sources_limit);

            let visits = a.visits as f64;
            let conversions = a.conversions as f64;
            Some(ChannelPerformance {
                channel: *channel,
                visits: a.visits,
                conversions: a.conversions,
                conversion_rate: ratio(conversions, visits),
                total_revenue: a.total_revenue,
                first_touch_revenue: a.first_touch_revenue,
                last_touch_revenue: a.last_touch_revenue,
                linear_revenue: a.linear_revenue,
                time_decay_revenue: a.time_decay_revenue,
                position_based_revenue: a.position_based_revenue,
                average_time_to_conversion: ratio(
                    a.conversion_days.iter().sum(),
                    a.conversion_days.len() as f64,
                ),
                average_order_value: ratio(a.total_revenue, conversions),
                revenue_per_visit: ratio(a.total_revenue, visits),
                top_sources,
            })
        })
        .collect()
}

/// Revenue per channel under one attribution model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRevenue {
    pub model: AttributionModel,
    pub channel_revenue: BTreeMap<MarketingChannel, f64>,
    pub total_revenue: f64,
}

/// Side-by-side channel revenue for all five models.
pub fn model_comparison(conversions: &[ConversionEvent]) -> Vec<ModelRevenue> {
    AttributionModel::ALL
        .iter()
        .map(|model| {
            let mut channel_revenue: BTreeMap<MarketingChannel, f64> = BTreeMap::new();
            for conversion in conversions {
                for result in conversion.attribution.for_model(*model) {
                    *channel_revenue.entry(result.channel).or_insert(0.0) += result.value;
                }
            }
            ModelRevenue {
                model: *model,
                total_revenue: channel_revenue.values().sum(),
                channel_revenue,
            }
        })
        .collect()
}

/// Conversions whose timestamp falls in `[start, end]`.
pub fn conversions_between<'a>(
    conversions: &'a [ConversionEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Iterator<Item = &'a ConversionEvent> {
    conversions
        .iter()
        .filter(move |c| c.timestamp >= start && c.timestamp <= end)
}
