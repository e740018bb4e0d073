//! # Rewind Configuration
//!
//! Loaded once at startup from TOML. Missing keys fall back to the defaults
//! in [`hitrewind_shared::constants`].
//!
//! ```toml
//! history_depth = 60
//! tick_rate = 60
//! time_error_margin = 0.001
//! default_sampling_interval = 1
//! ```

use std::path::Path;

use hitrewind_shared::constants::{
    DEFAULT_HISTORY_DEPTH, DEFAULT_SAMPLING_INTERVAL, DEFAULT_TICK_RATE, MAX_TICK_RATE,
    MIN_TICK_RATE, TIME_ERROR_MARGIN,
};
use serde::{Deserialize, Serialize};

use crate::error::{RewindError, RewindResult};

/// Global rewind settings shared by the coordinator and every entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewindConfig {
    /// Frames of history per entity (ring capacity).
    pub history_depth: usize,
    /// Fixed simulation steps per second.
    pub tick_rate: u32,
    /// Snap window for seconds-based targets, as a fraction of a frame.
    pub time_error_margin: f64,
    /// Sampling interval given to entities that do not pick their own.
    pub default_sampling_interval: usize,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            tick_rate: DEFAULT_TICK_RATE,
            time_error_margin: TIME_ERROR_MARGIN,
            default_sampling_interval: DEFAULT_SAMPLING_INTERVAL,
        }
    }
}

impl RewindConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::InvalidConfig`] on malformed TOML or values
    /// that fail [`RewindConfig::validate`].
    pub fn from_toml_str(source: &str) -> RewindResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RewindError::InvalidConfig(format!("{e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::ConfigIo`] when the file cannot be read, or
    /// [`RewindError::InvalidConfig`] when its content is rejected.
    pub fn load(path: impl AsRef<Path>) -> RewindResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| RewindError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> RewindResult<()> {
        if self.history_depth < 2 {
            return Err(RewindError::InvalidConfig(format!(
                "history_depth must be at least 2, got {}",
                self.history_depth
            )));
        }
        if !(MIN_TICK_RATE..=MAX_TICK_RATE).contains(&self.tick_rate) {
            return Err(RewindError::InvalidConfig(format!(
                "tick_rate must be within {MIN_TICK_RATE}..={MAX_TICK_RATE}, got {}",
                self.tick_rate
            )));
        }
        if !(0.0..0.5).contains(&self.time_error_margin) {
            return Err(RewindError::InvalidConfig(format!(
                "time_error_margin must be within [0, 0.5), got {}",
                self.time_error_margin
            )));
        }
        if self.default_sampling_interval == 0
            || self.default_sampling_interval > self.history_depth
        {
            return Err(RewindError::InvalidConfig(format!(
                "default_sampling_interval must be within 1..={}, got {}",
                self.history_depth, self.default_sampling_interval
            )));
        }
        Ok(())
    }

    /// Length of one simulation step in seconds.
    #[must_use]
    pub fn fixed_step(&self) -> f64 {
        1.0 / f64::from(self.tick_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RewindConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_depth, 60);
        assert!((config.fixed_step() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RewindConfig::from_toml_str("history_depth = 120\n").unwrap();
        assert_eq!(config.history_depth, 120);
        assert_eq!(config.tick_rate, 60);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            RewindConfig::from_toml_str("tick_rate = 0"),
            Err(RewindError::InvalidConfig(_))
        ));
        assert!(matches!(
            RewindConfig::from_toml_str("history_depth = 1"),
            Err(RewindError::InvalidConfig(_))
        ));
        assert!(matches!(
            RewindConfig::from_toml_str("time_error_margin = 0.7"),
            Err(RewindError::InvalidConfig(_))
        ));
        assert!(matches!(
            RewindConfig::from_toml_str("unknown_key = 1"),
            Err(RewindError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RewindConfig::load("/nonexistent/hitrewind.toml"),
            Err(RewindError::ConfigIo(_))
        ));
    }
}
