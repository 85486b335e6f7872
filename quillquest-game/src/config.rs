use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants;

/// Errors raised when tuning invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: u64,
        value: u64,
    },
    #[error("at least one rest marker is required")]
    NoRestMarkers,
    #[error("config is not valid JSON: {0}")]
    Parse(String),
}

/// Phase lengths for the dungeon traversal variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonTiming {
    #[serde(default = "DungeonTiming::default_work_secs")]
    pub work_secs: u32,
    #[serde(default = "DungeonTiming::default_rest_secs")]
    pub rest_secs: u32,
}

impl DungeonTiming {
    const fn default_work_secs() -> u32 {
        constants::DUNGEON_WORK_SECS
    }

    const fn default_rest_secs() -> u32 {
        constants::DUNGEON_REST_SECS
    }
}

impl Default for DungeonTiming {
    fn default() -> Self {
        Self {
            work_secs: Self::default_work_secs(),
            rest_secs: Self::default_rest_secs(),
        }
    }
}

/// Engine tuning shared by the stage sequencer, persistence and dungeon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "TimerConfig::default_damage_per_stage")]
    pub damage_per_stage: u32,
    #[serde(default = "TimerConfig::default_rest_markers")]
    pub rest_markers: Vec<String>,
    #[serde(default = "TimerConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "TimerConfig::default_save_quiet_ms")]
    pub save_quiet_ms: u64,
    #[serde(default = "TimerConfig::default_daily_flush_every")]
    pub daily_flush_every: u64,
    #[serde(default = "TimerConfig::default_namespace_prefix")]
    pub namespace_prefix: String,
    #[serde(default)]
    pub dungeon: DungeonTiming,
}

impl TimerConfig {
    const fn default_damage_per_stage() -> u32 {
        constants::DAMAGE_PER_STAGE
    }

    fn default_rest_markers() -> Vec<String> {
        constants::REST_MARKERS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    const fn default_tick_interval_ms() -> u64 {
        constants::TICK_INTERVAL_MS
    }

    const fn default_save_quiet_ms() -> u64 {
        constants::SAVE_QUIET_MS
    }

    const fn default_daily_flush_every() -> u64 {
        constants::DAILY_FLUSH_EVERY
    }

    fn default_namespace_prefix() -> String {
        constants::NAMESPACE_PREFIX.to_string()
    }

    /// Parse a config document and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every tuning invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::ensure_min("tick_interval_ms", self.tick_interval_ms, 1)?;
        Self::ensure_min("save_quiet_ms", self.save_quiet_ms, 1)?;
        Self::ensure_min("daily_flush_every", self.daily_flush_every, 1)?;
        Self::ensure_min("dungeon.work_secs", u64::from(self.dungeon.work_secs), 1)?;
        Self::ensure_min("dungeon.rest_secs", u64::from(self.dungeon.rest_secs), 1)?;
        if self.rest_markers.iter().all(|marker| marker.trim().is_empty()) {
            return Err(ConfigError::NoRestMarkers);
        }
        Ok(())
    }

    fn ensure_min(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
        if value < min {
            return Err(ConfigError::MinViolation { field, min, value });
        }
        Ok(())
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn save_quiet_window(&self) -> Duration {
        Duration::from_millis(self.save_quiet_ms)
    }

    /// Whether a stage label denotes a rest/break phase.
    #[must_use]
    pub fn is_rest_label(&self, label: &str) -> bool {
        let lowered = label.to_lowercase();
        self.rest_markers
            .iter()
            .filter(|marker| !marker.is_empty())
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }

    /// Store namespace for a logged-in nickname.
    #[must_use]
    pub fn namespace_for(&self, nickname: &str) -> String {
        format!("{}{}", self.namespace_prefix, nickname.trim())
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            damage_per_stage: Self::default_damage_per_stage(),
            rest_markers: Self::default_rest_markers(),
            tick_interval_ms: Self::default_tick_interval_ms(),
            save_quiet_ms: Self::default_save_quiet_ms(),
            daily_flush_every: Self::default_daily_flush_every(),
            namespace_prefix: Self::default_namespace_prefix(),
            dungeon: DungeonTiming::default(),
        }
    }
}
