//! Run configuration for the fetcher and the breadth engine.
//!
//! One value object per component, grouped in [`AppConfig`] so a single TOML
//! file can drive a whole run. Every field has a default, so partial files
//! are fine:
//!
//! ```toml
//! [breadth]
//! lookback_rows = 50
//!
//! [fetch]
//! batch_size = 40
//! pause_secs = 2.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Breadth engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreadthConfig {
    /// Lookback window in rows (trading days), not calendar days.
    pub lookback_rows: usize,
    /// Minimum fraction of the universe with both prices present, in [0, 1].
    pub min_coverage: f64,
}

impl Default for BreadthConfig {
    fn default() -> Self {
        Self {
            lookback_rows: 20,
            min_coverage: 0.80,
        }
    }
}

impl BreadthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_rows == 0 {
            return Err(ConfigError::Invalid("lookback_rows must be at least 1".into()));
        }
        if !self.min_coverage.is_finite() || !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(ConfigError::Invalid(format!(
                "min_coverage must be within [0, 1], got {}",
                self.min_coverage
            )));
        }
        Ok(())
    }
}

/// Price panel fetcher parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// History span to download, in years.
    pub years: u32,
    /// Provider symbols per batch request.
    pub batch_size: usize,
    /// Pause after every batch, in seconds.
    pub pause_secs: f64,
    /// Minimum pause after a failed batch, in seconds.
    pub failure_backoff_secs: f64,
    /// Suffix appended to symbols without a recognised exchange suffix.
    pub exchange_suffix: String,
    /// Suffixes that mark a symbol as already provider-qualified.
    pub known_suffixes: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            years: 2,
            batch_size: 80,
            pause_secs: 1.0,
            failure_backoff_secs: 2.0,
            exchange_suffix: ".NS".into(),
            known_suffixes: vec![".NS".into(), ".BO".into()],
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.years == 0 {
            return Err(ConfigError::Invalid("years must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        for (name, secs) in [
            ("pause_secs", self.pause_secs),
            ("failure_backoff_secs", self.failure_backoff_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number of seconds, got {secs}"
                )));
            }
        }
        if self.exchange_suffix.trim().is_empty() {
            return Err(ConfigError::Invalid("exchange_suffix must not be empty".into()));
        }
        Ok(())
    }

    /// Pause between batch requests.
    pub fn pause(&self) -> Duration {
        Duration::from_secs_f64(self.pause_secs)
    }

    /// Pause after a failed batch: the failure backoff, never shorter than the regular pause.
    pub fn failure_pause(&self) -> Duration {
        Duration::from_secs_f64(self.failure_backoff_secs.max(self.pause_secs))
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub breadth: BreadthConfig,
    pub fetch: FetchConfig,
}

impl AppConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.breadth.validate()?;
        self.fetch.validate()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = AppConfig::default();
        assert_eq!(c.breadth.lookback_rows, 20);
        assert_eq!(c.breadth.min_coverage, 0.80);
        assert_eq!(c.fetch.years, 2);
        assert_eq!(c.fetch.batch_size, 80);
        assert_eq!(c.fetch.pause_secs, 1.0);
        assert_eq!(c.fetch.exchange_suffix, ".NS");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = AppConfig::from_toml("[breadth]\nlookback_rows = 50\n").unwrap();
        assert_eq!(c.breadth.lookback_rows, 50);
        assert_eq!(c.breadth.min_coverage, 0.80);
        assert_eq!(c.fetch, FetchConfig::default());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn rejects_out_of_range_coverage() {
        let err = AppConfig::from_toml("[breadth]\nmin_coverage = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_lookback_and_batch() {
        assert!(AppConfig::from_toml("[breadth]\nlookback_rows = 0\n").is_err());
        assert!(AppConfig::from_toml("[fetch]\nbatch_size = 0\n").is_err());
    }

    #[test]
    fn rejects_negative_pause() {
        let err = AppConfig::from_toml("[fetch]\npause_secs = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("pause_secs"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = AppConfig::from_toml("[breadth\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn failure_pause_never_shorter_than_pause() {
        let fetch = FetchConfig {
            pause_secs: 3.0,
            failure_backoff_secs: 2.0,
            ..FetchConfig::default()
        };
        assert_eq!(fetch.failure_pause(), Duration::from_secs(3));
        assert_eq!(FetchConfig::default().failure_pause(), Duration::from_secs(2));
    }

    #[test]
    fn shipped_nifty500_config_is_the_default() {
        let c = AppConfig::from_toml(include_str!("../../configs/nifty500.toml")).unwrap();
        assert_eq!(c, AppConfig::default());
    }

    #[test]
    fn toml_roundtrip() {
        let c = AppConfig::default();
        let parsed = AppConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(c, parsed);
    }
}
