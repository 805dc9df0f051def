//! Rate limit configurations and the named preset table.
//!
//! A [`RateLimitConfig`] is always valid: the only way to obtain one is through
//! a constructor that rejects a zero window or a zero budget. Configuration
//! files deserialize into the looser [`RateLimitSpec`], where every field is
//! optional, and are resolved against defaults when loaded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{RateLimitError, Result};

/// Window applied when none is configured (15 minutes).
pub const DEFAULT_WINDOW_MS: u64 = 900_000;
/// Budget applied when none is configured.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;

/// A validated fixed-window limit for one protected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    window_ms: u64,
    max_requests: u32,
    key_prefix: Option<String>,
}

impl RateLimitConfig {
    /// Create a config without a key prefix.
    ///
    /// Fails fast on a zero window or zero budget so that a misconfigured
    /// route never silently limits everything or nothing.
    pub fn new(window_ms: u64, max_requests: u32) -> Result<Self> {
        if window_ms == 0 {
            return Err(RateLimitError::InvalidWindow);
        }
        if max_requests == 0 {
            return Err(RateLimitError::InvalidMaxRequests);
        }
        Ok(Self {
            window_ms,
            max_requests,
            key_prefix: None,
        })
    }

    /// Set the namespace this config's keys live under.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.key_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    /// Window duration in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Maximum admitted requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Key namespace, if any.
    pub fn key_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
            key_prefix: None,
        }
    }
}

/// A possibly partial limit as written in configuration.
///
/// Signed integers are used so that negative values written by an operator
/// surface as configuration errors rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Window duration in milliseconds
    #[serde(default)]
    pub window_ms: Option<i64>,
    /// Maximum requests per window
    #[serde(default)]
    pub max_requests: Option<i64>,
    /// Key namespace
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl RateLimitSpec {
    /// Resolve against the global defaults.
    pub fn resolve(&self) -> Result<RateLimitConfig> {
        self.resolve_over(&RateLimitConfig::default())
    }

    /// Resolve, taking unspecified fields from `base`.
    pub fn resolve_over(&self, base: &RateLimitConfig) -> Result<RateLimitConfig> {
        let window_ms = match self.window_ms {
            Some(ms) if ms <= 0 => return Err(RateLimitError::InvalidWindow),
            Some(ms) => ms as u64,
            None => base.window_ms,
        };
        let max_requests = match self.max_requests {
            Some(max) if max <= 0 => return Err(RateLimitError::InvalidMaxRequests),
            Some(max) => u32::try_from(max).map_err(|_| {
                RateLimitError::Config(format!("max_requests {} does not fit in u32", max))
            })?,
            None => base.max_requests,
        };

        if self.key_prefix.as_deref() == Some("") {
            return Err(RateLimitError::Config(
                "key_prefix must not be empty; omit it to keep the default".to_string(),
            ));
        }

        let config = RateLimitConfig::new(window_ms, max_requests)?;
        Ok(match self.key_prefix.as_ref().or(base.key_prefix.as_ref()) {
            Some(prefix) => config.with_prefix(prefix.clone()),
            None => config,
        })
    }
}

impl TryFrom<RateLimitSpec> for RateLimitConfig {
    type Error = RateLimitError;

    fn try_from(spec: RateLimitSpec) -> Result<Self> {
        spec.resolve()
    }
}

/// The built-in protected operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Account registration
    Registration,
    /// Credential login
    Login,
    /// Feedback submission
    Feedback,
    /// Generic API traffic
    Api,
}

impl Preset {
    /// Every built-in preset.
    pub const ALL: [Preset; 4] = [
        Preset::Registration,
        Preset::Login,
        Preset::Feedback,
        Preset::Api,
    ];

    /// The preset's lookup name.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Registration => "registration",
            Preset::Login => "login",
            Preset::Feedback => "feedback",
            Preset::Api => "api",
        }
    }

    /// The preset's built-in limit.
    pub fn config(&self) -> RateLimitConfig {
        let (window_ms, max_requests, prefix) = match self {
            Preset::Registration => (3_600_000, 5, "register"),
            Preset::Login => (900_000, 5, "login"),
            Preset::Feedback => (3_600_000, 10, "feedback"),
            Preset::Api => (900_000, 100, "api"),
        };
        RateLimitConfig {
            window_ms,
            max_requests,
            key_prefix: Some(prefix.to_string()),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| RateLimitError::UnknownPreset(s.to_string()))
    }
}

/// Named limits available to request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetTable {
    presets: HashMap<String, RateLimitConfig>,
}

impl PresetTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            presets: HashMap::new(),
        }
    }

    /// A table holding the four built-in presets.
    pub fn builtin() -> Self {
        let presets = Preset::ALL
            .into_iter()
            .map(|preset| (preset.name().to_string(), preset.config()))
            .collect();
        Self { presets }
    }

    /// Apply overrides on top of the built-in presets.
    ///
    /// An override for a built-in name inherits that preset's unspecified
    /// fields; a new name inherits the global defaults.
    pub fn with_overrides(overrides: &HashMap<String, RateLimitSpec>) -> Result<Self> {
        let mut table = Self::builtin();
        for (name, spec) in overrides {
            if name.is_empty() {
                return Err(RateLimitError::Config("preset name must not be empty".to_string()));
            }
            let config = match table.presets.get(name) {
                Some(base) => spec.resolve_over(base)?,
                None => spec.resolve()?,
            };
            debug!(
                preset = %name,
                window_ms = config.window_ms(),
                max_requests = config.max_requests(),
                "Applied preset override"
            );
            table.presets.insert(name.clone(), config);
        }
        Ok(table)
    }

    /// Load overrides from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit presets");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load overrides from a YAML mapping of name to spec.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: HashMap<String, RateLimitSpec> = serde_yaml::from_str(yaml)
            .map_err(|e| RateLimitError::Config(format!("Failed to parse presets: {}", e)))?;
        Self::with_overrides(&overrides)
    }

    /// Register or replace a named limit.
    pub fn insert(&mut self, name: impl Into<String>, config: RateLimitConfig) {
        self.presets.insert(name.into(), config);
    }

    /// Look up a named limit.
    pub fn get(&self, name: &str) -> Result<&RateLimitConfig> {
        self.presets
            .get(name)
            .ok_or_else(|| RateLimitError::UnknownPreset(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered limits.
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}
