use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::resilience::retry::RECONNECT_BACKOFF;
use crate::resilience::timeout::REDIS_OPERATION_TIMEOUT;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub channels: ChannelsConfig,
    pub emitter: EmitterConfig,
    pub relay: RelayConfig,
    pub aggregator: AggregatorConfig,
    pub logging: LoggingConfig,
}

/// Which channel service implementation backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    /// Redis Pub/Sub (multi-process deployments)
    #[default]
    Redis,
    /// In-process broker (only meaningful inside a single process)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    pub url: String,
    pub operation_timeout_seconds: u64,
    pub reconnect_backoff_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            operation_timeout_seconds: REDIS_OPERATION_TIMEOUT.as_secs(),
            reconnect_backoff_ms: u64::try_from(RECONNECT_BACKOFF.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    #[must_use]
    pub const fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Emitter -> ingest
    pub raw: String,
    /// Ingest -> forward
    pub mid: String,
    /// Forward -> receiver
    pub out: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            raw: "locations_raw".to_string(),
            mid: "locations_mid".to_string(),
            out: "locations_out".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub period_ms: u64,
    pub step: f64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            period_ms: 5000,
            step: 0.1,
        }
    }
}

impl EmitterConfig {
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Stop payloads that are not valid location updates at this hop
    pub drop_malformed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub population: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { population: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // FMF_BROKER__URL, FMF_AGGREGATOR__POPULATION, ...
        builder = builder.add_source(
            Environment::with_prefix("FMF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every section, collecting all problems instead of stopping at the first
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.broker.kind == BrokerKind::Redis && self.broker.url.trim().is_empty() {
            errors.push("broker.url must be set when broker.kind is redis".to_string());
        }
        if self.broker.operation_timeout_seconds == 0 {
            errors.push("broker.operation_timeout_seconds must be greater than 0".to_string());
        }
        if self.broker.reconnect_backoff_ms == 0 {
            errors.push("broker.reconnect_backoff_ms must be greater than 0".to_string());
        }

        for (name, channel) in [
            ("channels.raw", &self.channels.raw),
            ("channels.mid", &self.channels.mid),
            ("channels.out", &self.channels.out),
        ] {
            if channel.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }
        if self.channels.raw == self.channels.mid
            || self.channels.mid == self.channels.out
            || self.channels.raw == self.channels.out
        {
            errors.push("channels.raw, channels.mid and channels.out must be distinct".to_string());
        }

        if self.emitter.period_ms == 0 {
            errors.push("emitter.period_ms must be greater than 0".to_string());
        }
        if !self.emitter.step.is_finite() {
            errors.push("emitter.step must be a finite number".to_string());
        }

        if self.aggregator.population == 0 {
            errors.push("aggregator.population must be greater than 0".to_string());
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
