//! Configuration management for windowgate.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! environment variables prefixed `WINDOWGATE__` with `__` as the section
//! separator (`WINDOWGATE__SWEEPER__INTERVAL_SECS=60`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{RateLimitError, Result};
use crate::ratelimit::{PresetTable, RateLimitSpec};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for the windowgate binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identifies this process in logs; counters are never shared between instances
    #[serde(default = "default_instance_id")]
    pub instance_id: Uuid,

    /// Background sweep configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Preset overrides by name
    #[serde(default)]
    pub presets: HashMap<String, RateLimitSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            sweeper: SweeperConfig::default(),
            logging: LoggingConfig::default(),
            presets: HashMap::new(),
        }
    }
}

fn default_instance_id() -> Uuid {
    Uuid::new_v4()
}

/// Sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps of expired windows
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RateLimitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RateLimitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints and that every preset resolves.
    pub fn validate(&self) -> Result<()> {
        if self.sweeper.interval_secs == 0 {
            return Err(RateLimitError::Config(
                "sweeper.interval_secs must be greater than zero".to_string(),
            ));
        }
        self.preset_table().map(|_| ())
    }

    /// The preset table with this configuration's overrides applied.
    pub fn preset_table(&self) -> Result<PresetTable> {
        PresetTable::with_overrides(&self.presets)
    }

    /// Period between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper.interval_secs)
    }
}
