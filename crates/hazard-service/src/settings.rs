//! Service settings
//!
//! Defaults, then an optional `hazard-service.toml`, then `HAZARD__*`
//! environment variables (`HAZARD__SERVER__BIND_ADDR=0.0.0.0:9000`).

use aggregation::{AggregationConfig, SchedulerConfig};
use alerting::{AlertEngineConfig, CooldownConfig};
use config::{Config, ConfigError, Environment, File, FileFormat};
use hazard_scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use spatial_clustering::ClusteringConfig;

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address (default: 0.0.0.0:8080)
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Max level: trace, debug, info, warn, error (default: info)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Everything the service reads at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub clustering: ClusteringConfig,
    pub scoring: ScoringConfig,
    pub aggregation: AggregationConfig,
    pub scheduler: SchedulerConfig,
    pub alerts: AlertEngineConfig,
    pub cooldown: CooldownConfig,
}

impl Settings {
    /// Load from `hazard-service.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("hazard-service")
    }

    /// Load from `<basename>.{toml,json,yaml,...}` (if present) and the environment
    pub fn load_from(basename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(basename).required(false))
            .add_source(
                Environment::with_prefix("HAZARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse settings from TOML text, defaults filling the gaps
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
