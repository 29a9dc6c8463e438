use serde::Deserialize;

use crate::error::AttributionOutcome;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ATTRIBUTION__` layered over an optional TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

/// The site's own identity. Referrers on these domains are self-referrals.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_half_life_days")]
    pub time_decay_half_life_days: f64,
    #[serde(default = "default_position_weight")]
    pub position_first_weight: f64,
    #[serde(default = "default_position_weight")]
    pub position_last_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_top_sources_limit")]
    pub top_sources_limit: usize,
}

// Default functions
fn default_half_life_days() -> f64 {
    7.0
}
fn default_position_weight() -> f64 {
    0.4
}
fn default_top_sources_limit() -> usize {
    5
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            time_decay_half_life_days: default_half_life_days(),
            position_first_weight: default_position_weight(),
            position_last_weight: default_position_weight(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_sources_limit: default_top_sources_limit(),
        }
    }
}

impl AttributionConfig {
    /// Share left for interior touchpoints in the position-based model.
    pub fn position_middle_weight(&self) -> f64 {
        (1.0 - self.position_first_weight - self.position_last_weight).max(0.0)
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> AttributionOutcome<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, then environment
    /// variables on top of it.
    pub fn load_from(path: Option<&str>) -> AttributionOutcome<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("ATTRIBUTION")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("site.domains"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        tracing::debug!(
            file = ?path,
            site_domains = config.site.domains.len(),
            half_life_days = config.attribution.time_decay_half_life_days,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Reject weights that cannot form a credit split summing to one.
    pub fn validate(&self) -> AttributionOutcome<()> {
        let attr = &self.attribution;
        if !(attr.time_decay_half_life_days.is_finite() && attr.time_decay_half_life_days > 0.0) {
            return Err(crate::AttributionError::Config(format!(
                "time_decay_half_life_days must be positive, got {}",
                attr.time_decay_half_life_days
            )));
        }
        let ends = attr.position_first_weight + attr.position_last_weight;
        if attr.position_first_weight < 0.0 || attr.position_last_weight < 0.0 || ends > 1.0 {
            return Err(crate::AttributionError::Config(format!(
                "position weights must be non-negative and sum to at most 1.0, got {} + {}",
                attr.position_first_weight, attr.position_last_weight
            )));
        }
        Ok(())
    }
}
