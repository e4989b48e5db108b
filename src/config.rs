//! Configuration management for the measurement engine
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults. Every field can be
//! omitted from the file; the defaults reproduce the device message
//! measurement as dashboards expect it.
//!
//! ```toml
//! [realtime]
//! topic_pattern = "/device/**"
//! default_interval_ms = 1000
//!
//! [aggregate]
//! series_name = "message-count"
//! default_bucket = "1h"
//! utc_offset_secs = 28800
//! ```

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::aggregation::BucketFormat;
use crate::error::{Error, Result};
use crate::types::{Interval, TimeRange};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Real-time dimension settings
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Aggregate dimension settings
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// Logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Real-time dimension configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RealtimeConfig {
    /// Topic pattern counted by the window counter
    #[serde(default = "default_topic_pattern")]
    pub topic_pattern: String,

    /// Window length when the caller supplies none
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// Shortest window a caller may request
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

/// Aggregate dimension configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregateConfig {
    /// Series queried by the aggregate dimension
    #[serde(default = "default_series_name")]
    pub series_name: String,

    /// Bucket size when the caller supplies none
    #[serde(default = "default_bucket")]
    pub default_bucket: String,

    /// Bucket label format when the caller supplies none
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Bucket limit when the caller supplies none
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper bound on any requested limit
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// How far back `from` reaches when the caller supplies none
    #[serde(default = "default_lookback_hours")]
    pub default_lookback_hours: u32,

    /// Zone for bucket alignment, labels and zone-less dates
    #[serde(default)]
    pub utc_offset_secs: i32,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_topic_pattern() -> String { crate::bus::DEVICE_TOPIC_PATTERN.to_string() }
fn default_interval_ms() -> u64 { 1000 }
fn default_min_interval_ms() -> u64 { 10 }
fn default_series_name() -> String { "message-count".to_string() }
fn default_bucket() -> String { "1h".to_string() }
fn default_format() -> String { crate::aggregation::DEFAULT_BUCKET_FORMAT.to_string() }
fn default_limit() -> usize { 1 }
fn default_max_limit() -> usize { 10_000 }
fn default_lookback_hours() -> u32 { 24 }
fn default_log_level() -> String { "info".to_string() }

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            topic_pattern: default_topic_pattern(),
            default_interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            series_name: default_series_name(),
            default_bucket: default_bucket(),
            default_format: default_format(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_lookback_hours: default_lookback_hours(),
            utc_offset_secs: 0,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl RealtimeConfig {
    /// Default window length
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    /// Minimum window length
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl AggregateConfig {
    /// Default bucket size, `1h` if the configured value does not parse
    pub fn bucket(&self) -> Interval {
        self.default_bucket.parse().unwrap_or(Interval::hours(1))
    }

    /// Default label format, the built-in one if the configured value does not parse
    pub fn bucket_format(&self) -> BucketFormat {
        BucketFormat::parse(&self.default_format).unwrap_or_default()
    }

    /// Configured zone, UTC if out of range
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or(crate::params::utc_offset())
    }

    /// Default range ending at `now`
    pub fn default_range(&self, now_ms: i64) -> TimeRange {
        TimeRange::last_hours(now_ms, self.default_lookback_hours)
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Real-time
        if let Ok(pattern) = std::env::var("MEASURE_TOPIC_PATTERN") {
            self.realtime.topic_pattern = pattern;
        }

        // Aggregate
        if let Ok(series) = std::env::var("MEASURE_SERIES_NAME") {
            self.aggregate.series_name = series;
        }
        if let Ok(offset) = std::env::var("MEASURE_UTC_OFFSET_SECS") {
            if let Ok(o) = offset.parse() {
                self.aggregate.utc_offset_secs = o;
            }
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Configuration(msg.to_string()));

        if self.realtime.topic_pattern.trim().is_empty() {
            return invalid("Topic pattern cannot be empty");
        }
        if self.realtime.min_interval_ms == 0 {
            return invalid("Min interval must be > 0");
        }
        if self.realtime.default_interval_ms < self.realtime.min_interval_ms {
            return invalid("Default interval cannot be below min interval");
        }

        if self.aggregate.series_name.trim().is_empty() {
            return invalid("Series name cannot be empty");
        }
        if self.aggregate.default_bucket.parse::<Interval>().is_err() {
            return Err(Error::Configuration(format!(
                "Invalid default bucket '{}'",
                self.aggregate.default_bucket
            )));
        }
        if let Err(e) = BucketFormat::parse(&self.aggregate.default_format) {
            return Err(Error::Configuration(e));
        }
        if self.aggregate.max_limit == 0 {
            return invalid("Max limit must be > 0");
        }
        if self.aggregate.default_limit == 0 || self.aggregate.default_limit > self.aggregate.max_limit {
            return invalid("Default limit must be between 1 and max limit");
        }
        if FixedOffset::east_opt(self.aggregate.utc_offset_secs).is_none() {
            return invalid("UTC offset must be within +/- 24 hours");
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Install a global `tracing` subscriber at the configured level
    ///
    /// `RUST_LOG` wins over the configured level when set. Fails if a global
    /// subscriber is already installed.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.monitoring.log_level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .map_err(|e| Error::Configuration(format!("Failed to initialise tracing: {}", e)))
    }
}
