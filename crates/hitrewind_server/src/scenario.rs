//! # Scenario Configuration
//!
//! One TOML file describes a demo run. The `[rewind]` table is handed to
//! the engine untouched.
//!
//! ```toml
//! bot_count = 32
//! latency_ms = 100
//! duration_secs = 30
//! seed = 7
//!
//! [rewind]
//! history_depth = 60
//! tick_rate = 60
//! ```

use std::path::Path;

use hitrewind_core::RewindConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Settings for one demo run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Engine settings.
    pub rewind: RewindConfig,
    /// Number of simulated bots.
    pub bot_count: usize,
    /// One-way delay between the server and every client view.
    pub latency_ms: u32,
    /// Wall-clock length of the run (0 = until interrupted).
    pub duration_secs: u32,
    /// Side length of the square arena.
    pub arena_size: f32,
    /// Bot walking speed in units per second.
    pub bot_speed: f32,
    /// Chance per bot per step of firing.
    pub fire_chance: f32,
    /// Resolve shots against the rewound world (false = live world).
    pub lag_compensation: bool,
    /// RNG seed for movement and firing.
    pub seed: u64,
    /// Capacity of the shot channel.
    pub shot_queue_capacity: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            rewind: RewindConfig::default(),
            bot_count: 32,
            latency_ms: 100,
            duration_secs: 30,
            arena_size: 100.0,
            bot_speed: 6.0,
            fire_chance: 0.01,
            lag_compensation: true,
            seed: 0x5EED,
            shot_queue_capacity: 1024,
        }
    }
}

impl ScenarioConfig {
    /// Parses and validates a scenario document.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidScenario`] on malformed TOML or bad
    /// values, or the engine's own error for a bad `[rewind]` table.
    pub fn from_toml_str(source: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ServerError::InvalidScenario(format!("{e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a scenario file.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ScenarioIo`] when the file cannot be read,
    /// otherwise the errors of [`ScenarioConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ServerError::ScenarioIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> ServerResult<()> {
        self.rewind.validate()?;
        if self.bot_count < 2 {
            return Err(ServerError::InvalidScenario(format!(
                "bot_count must be at least 2, got {}",
                self.bot_count
            )));
        }
        let arena_ok = self.arena_size.is_finite() && self.arena_size > 0.0;
        let speed_ok = self.bot_speed.is_finite() && self.bot_speed >= 0.0;
        if !arena_ok || !speed_ok {
            return Err(ServerError::InvalidScenario(
                "arena_size must be positive and bot_speed non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fire_chance) {
            return Err(ServerError::InvalidScenario(format!(
                "fire_chance must be within [0, 1], got {}",
                self.fire_chance
            )));
        }
        if self.shot_queue_capacity == 0 {
            return Err(ServerError::InvalidScenario(
                "shot_queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Client view delay in whole simulation steps.
    #[must_use]
    pub fn latency_frames(&self) -> u64 {
        let frames = f64::from(self.latency_ms) / 1000.0 / self.rewind.fixed_step();
        frames.round() as u64
    }
}
