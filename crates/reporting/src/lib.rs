//! Attribution reporting — multi-touch revenue attribution models and
//! per-channel performance rollups.

pub mod attribution;
pub mod performance;

pub use attribution::{
    first_touch_attribution, last_touch_attribution, linear_attribution,
    position_based_attribution, time_decay_attribution, AttributionEngine,
};
pub use performance::{
    calculate_channel_performance, model_comparison, ChannelPerformance, ModelRevenue,
    SourcePerformance,
};
