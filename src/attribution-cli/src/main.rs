//! Attribution CLI — replays a page-visit/conversion log through the
//! attribution tracker and prints journeys or channel reports as JSON.

mod replay;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use attribution_core::config::AppConfig;
use attribution_journey::AttributionTracker;
use attribution_reporting::performance::{
    calculate_channel_performance_with_limit, conversions_between, model_comparison,
};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "attribution-cli")]
#[command(about = "Multi-touch marketing attribution over recorded page visits")]
#[command(version)]
struct Cli {
    /// TOML config file layered under ATTRIBUTION__* environment variables
    #[arg(long, env = "ATTRIBUTION_CONFIG")]
    config: Option<String>,

    /// The site's own domain; referrals from it count as direct (repeatable)
    #[arg(long = "site-domain")]
    site_domains: Vec<String>,

    /// Time-decay half-life in days (overrides config)
    #[arg(long, env = "ATTRIBUTION__ATTRIBUTION__TIME_DECAY_HALF_LIFE_DAYS")]
    half_life_days: Option<f64>,

    /// Number of top sources per channel (overrides config)
    #[arg(long, env = "ATTRIBUTION__REPORTING__TOP_SOURCES_LIMIT")]
    top_sources: Option<usize>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON-lines event log and print journeys with their conversions
    Replay { input: PathBuf },
    /// Replay a JSON-lines event log and print channel performance
    Report {
        input: PathBuf,
        /// Only count conversions and visits from the last N days
        #[arg(long)]
        since_days: Option<i64>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "attribution_cli=info,attribution_journey=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // A file named on the command line must load; environment-only config
    // falls back to defaults.
    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path))
            .with_context(|| format!("loading config file {}", path))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    // Apply CLI overrides
    if !cli.site_domains.is_empty() {
        config.site.domains = cli.site_domains.clone();
    }
    if let Some(days) = cli.half_life_days {
        config.attribution.time_decay_half_life_days = days;
    }
    if let Some(limit) = cli.top_sources {
        config.reporting.top_sources_limit = limit;
    }
    config.validate().context("invalid configuration")?;

    info!(
        site_domains = ?config.site.domains,
        half_life_days = config.attribution.time_decay_half_life_days,
        top_sources = config.reporting.top_sources_limit,
        "Configuration loaded"
    );
    Ok(config)
}

fn replay_file(tracker: &AttributionTracker, input: &PathBuf) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let (events, dropped) = replay::read_events(BufReader::new(file))?;
    replay::replay(tracker, events, dropped);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli)?;
    let tracker = AttributionTracker::new(&config);

    let output = match &cli.command {
        Command::Replay { input } => {
            replay_file(&tracker, input)?;
            json!({
                "journeys": tracker.journey_summaries(),
                "conversions": tracker.store().get_all_conversions(),
            })
        }
        Command::Report { input, since_days } => {
            replay_file(&tracker, input)?;
            let mut conversions = tracker.store().get_all_conversions();
            let mut touchpoints = tracker.store().get_all_touchpoints();
            if let Some(days) = since_days {
                let end = Utc::now();
                let start = end - Duration::days(*days);
                conversions = conversions_between(&conversions, start, end)
                    .cloned()
                    .collect();
                touchpoints.retain(|t| t.timestamp >= start && t.timestamp <= end);
            }
            json!({
                "channels": calculate_channel_performance_with_limit(
                    &conversions,
                    &touchpoints,
                    config.reporting.top_sources_limit,
                ),
                "models": model_comparison(&conversions),
            })
        }
    };

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output)?;
    writeln!(stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_config_file_must_exist() {
        let cli = Cli::try_parse_from([
            "attribution-cli",
            "--config",
            "/nonexistent/attribution-config.toml",
            "replay",
            "events.jsonl",
        ])
        .unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "attribution-cli",
            "--site-domain",
            "example.com",
            "--half-life-days",
            "3.5",
            "report",
            "events.jsonl",
            "--since-days",
            "30",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.site.domains, vec!["example.com".to_string()]);
        assert_eq!(config.attribution.time_decay_half_life_days, 3.5);
        assert!(matches!(
            cli.command,
            Command::Report {
                since_days: Some(30),
                ..
            }
        ));
    }
}
