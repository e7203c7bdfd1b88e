//! Configuration management for the analytics service

use crate::analytics::forecast::{ForecastMetric, ForecastOptions, HistorySource};
use crate::analytics::report::AnalyticsOptions;
use crate::types::alert::{AlertRules, TierScheme};
use anyhow::{bail, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    #[serde(default)]
    pub analytics: AnalyticsOptions,
    #[serde(default)]
    pub alerts: AlertsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject carrying scored prediction batches
    pub prediction_subject: String,
    /// Subject for outgoing analytics reports
    pub report_subject: String,
}

/// Alert rules and feed persistence
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub rules: AlertRules,
    /// Entries kept in the alert feed
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    /// JSON file holding the feed; in-memory when unset
    #[serde(default)]
    pub store_path: Option<String>,
}

fn default_feed_capacity() -> usize {
    20
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules: AlertRules::default(),
            feed_capacity: default_feed_capacity(),
            store_path: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Batches derived concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings the derivations cannot work with
    pub fn validate(&self) -> Result<()> {
        if let TierScheme::Custom(thresholds) = self.analytics.scheme {
            if !thresholds.is_valid() {
                bail!(
                    "Custom tier thresholds must satisfy 0 <= medium < high < critical <= 1, got {:?}",
                    thresholds
                );
            }
        }
        let t = &self.alerts.rules.thresholds;
        if t.high_probability > t.critical_probability {
            bail!(
                "High alert probability {} exceeds critical probability {}",
                t.high_probability,
                t.critical_probability
            );
        }
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        if self.analytics.graph.max_nodes == 0 {
            bail!("analytics.graph.max_nodes must be at least 1");
        }
        let f = &self.analytics.filter;
        if let (Some(min), Some(max)) = (f.amount_min, f.amount_max) {
            if min > max {
                bail!("analytics.filter amount_min {} exceeds amount_max {}", min, max);
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                prediction_subject: "predictions".to_string(),
                report_subject: "analytics.reports".to_string(),
            },
            analytics: AnalyticsOptions {
                scheme: TierScheme::Standard,
                forecast: ForecastOptions {
                    metric: ForecastMetric::FraudCases,
                    history: HistorySource::Auto,
                    ..ForecastOptions::default()
                },
                ..AnalyticsOptions::default()
            },
            alerts: AlertsConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                report_interval_secs: default_report_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
