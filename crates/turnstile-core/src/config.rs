//! Admission policy configuration.
//!
//! Loaded from YAML (durations as humantime strings such as `"90s"` or `"5m"`),
//! optionally overlaid with `TURNSTILE_*` environment variables, and validated
//! before an engine accepts it.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

pub const ENV_MAX_PER_WINDOW: &str = "TURNSTILE_MAX_PER_WINDOW";
pub const ENV_WINDOW: &str = "TURNSTILE_WINDOW";
pub const ENV_MAX_VIOLATIONS: &str = "TURNSTILE_MAX_VIOLATIONS";
pub const ENV_BLOCK_DURATION: &str = "TURNSTILE_BLOCK_DURATION";
pub const ENV_MAX_CAPACITY: &str = "TURNSTILE_MAX_CAPACITY";
pub const ENV_SWEEP_INTERVAL: &str = "TURNSTILE_SWEEP_INTERVAL";
pub const ENV_STALE_THRESHOLD: &str = "TURNSTILE_STALE_THRESHOLD";
pub const ENV_ENFORCE: &str = "TURNSTILE_ENFORCE";

/// Idle ledgers are reclaimed after this many windows unless overridden.
const STALE_WINDOWS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Accepted submissions per actor per `window`.
    pub max_per_window: u32,
    #[serde(with = "duration_str")]
    pub window: Duration,
    /// Consecutive over-limit attempts before a hard block.
    pub max_violations: u32,
    #[serde(with = "duration_str")]
    pub block_duration: Duration,
    /// Distinct members per session.
    pub max_capacity: u32,
    #[serde(with = "duration_str")]
    pub sweep_interval: Duration,
    /// Idle age after which a ledger is reclaimed. `None` means 10x `window`.
    #[serde(
        with = "duration_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub stale_threshold: Option<Duration>,
    /// Master switch. When off, every check is allowed and nothing is recorded.
    pub enforce: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_per_window: 6,
            window: Duration::from_secs(60),
            max_violations: 3,
            block_duration: Duration::from_secs(5 * 60),
            max_capacity: 50,
            sweep_interval: Duration::from_secs(5 * 60),
            stale_threshold: None,
            enforce: true,
        }
    }
}

impl AdmissionConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: AdmissionConfig = serde_yaml::from_str(s)?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Defaults overlaid with the environment, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = Self::default().apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay any `TURNSTILE_*` variables that are set. Malformed values are
    /// an error rather than being skipped.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_value(ENV_MAX_PER_WINDOW, parse_count)? {
            self.max_per_window = v;
        }
        if let Some(v) = env_value(ENV_WINDOW, parse_duration)? {
            self.window = v;
        }
        if let Some(v) = env_value(ENV_MAX_VIOLATIONS, parse_count)? {
            self.max_violations = v;
        }
        if let Some(v) = env_value(ENV_BLOCK_DURATION, parse_duration)? {
            self.block_duration = v;
        }
        if let Some(v) = env_value(ENV_MAX_CAPACITY, parse_count)? {
            self.max_capacity = v;
        }
        if let Some(v) = env_value(ENV_SWEEP_INTERVAL, parse_duration)? {
            self.sweep_interval = v;
        }
        if let Some(v) = env_value(ENV_STALE_THRESHOLD, parse_duration)? {
            self.stale_threshold = Some(v);
        }
        if let Some(v) = env_value(ENV_ENFORCE, parse_bool)? {
            self.enforce = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero_counts = [
            ("max_per_window", self.max_per_window),
            ("max_violations", self.max_violations),
            ("max_capacity", self.max_capacity),
        ];
        for (field, value) in non_zero_counts {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }

        let non_zero_durations = [
            ("window", self.window),
            ("block_duration", self.block_duration),
            ("sweep_interval", self.sweep_interval),
        ];
        for (field, value) in non_zero_durations {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }

        if self.stale_threshold() < self.window {
            return Err(ConfigError::Invalid {
                field: "stale_threshold",
                reason: format!(
                    "must be at least the window ({})",
                    humantime::format_duration(self.window)
                ),
            });
        }

        Ok(())
    }

    /// Resolved idle threshold for the reclamation sweep.
    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
            .unwrap_or_else(|| self.window.saturating_mul(STALE_WINDOWS))
    }

    /// Copy with every derived default filled in, for display.
    pub fn effective(&self) -> Self {
        Self {
            stale_threshold: Some(self.stale_threshold()),
            ..self.clone()
        }
    }

    pub fn with_max_per_window(mut self, max: u32) -> Self {
        self.max_per_window = max;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_violations(mut self, max: u32) -> Self {
        self.max_violations = max;
        self
    }

    pub fn with_block_duration(mut self, block: Duration) -> Self {
        self.block_duration = block;
        self
    }

    pub fn with_max_capacity(mut self, max: u32) -> Self {
        self.max_capacity = max;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = Some(threshold);
        self
    }

    pub fn with_enforce(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }
}

fn env_value<T>(
    var: &'static str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => parse(raw.trim())
            .map(Some)
            .map_err(|reason| ConfigError::InvalidEnv {
                var,
                value: raw,
                reason,
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnv {
            var,
            value: String::new(),
            reason: "not valid unicode".into(),
        }),
    }
}

fn parse_count(s: &str) -> Result<u32, String> {
    s.parse::<u32>().map_err(|e| e.to_string())
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

/// Serde adapter for humantime duration strings.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            raw.map(|r| humantime::parse_duration(r.trim()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
