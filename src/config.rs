//! Engine configuration loaded from TOML

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ml::LabelDefaults;

/// Thresholds of the evaluator's "stupid prediction" penalty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StupidLossConfig {
    /// Penalty added per stupid prediction
    pub penalty: f64,
    /// Predictions below this count as zero
    pub zero_epsilon: f64,
    /// Expected values at or above this make a zero prediction stupid
    pub large_expected: f64,
    /// Multiple of the second-largest expected value a prediction may not exceed
    pub second_max_ratio: f64,
    /// Minimum absolute error before the ratio rule applies
    pub min_error: f64,
}

impl Default for StupidLossConfig {
    fn default() -> Self {
        Self {
            penalty: 10.0,
            zero_epsilon: 0.1,
            large_expected: 1.0,
            second_max_ratio: 2.0,
            min_error: 1.0,
        }
    }
}

/// Session engine settings; every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Insert the Setup state before exercising
    pub lab_mode: bool,
    pub ready_secs: f64,
    pub setup_secs: f64,
    pub done_secs: f64,
    /// Minimum classifier probability for a setup hint to start the exercise
    pub setup_probability_threshold: f64,
    /// Time since entering Setup before setup hints are accepted; hints only
    /// win the race against the setup countdown when this is below `setup_secs`
    pub setup_cooldown_secs: f64,
    /// Confirm the shown labels when the Done countdown runs out
    pub auto_confirm_on_timeout: bool,
    /// Number of coming-up candidates offered
    pub coming_up_limit: usize,
    /// Exercise countdown when no duration has been learned
    pub default_exercise_duration_secs: f64,
    /// Observations kept per scalar series
    pub max_history: usize,
    /// Recent states kept verbatim by plans
    pub plan_window: usize,
    pub label_defaults: LabelDefaults,
    pub stupid_loss: StupidLossConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lab_mode: false,
            ready_secs: 5.0,
            setup_secs: 5.0,
            done_secs: 15.0,
            setup_probability_threshold: 0.7,
            setup_cooldown_secs: 5.0,
            auto_confirm_on_timeout: true,
            coming_up_limit: 6,
            default_exercise_duration_secs: 30.0,
            max_history: 512,
            plan_window: 64,
            label_defaults: LabelDefaults::default(),
            stupid_loss: StupidLossConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads the config file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.lab_mode);
        assert_eq!(config.ready_secs, 5.0);
        assert_eq!(config.done_secs, 15.0);
        assert_eq!(config.setup_probability_threshold, 0.7);
        assert!(config.auto_confirm_on_timeout);
        assert_eq!(config.stupid_loss.penalty, 10.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            "lab_mode = true\ndone_secs = 20.0\n\n[stupid_loss]\npenalty = 3.0\n",
        )
        .unwrap();
        assert!(config.lab_mode);
        assert_eq!(config.done_secs, 20.0);
        assert_eq!(config.ready_secs, 5.0);
        assert_eq!(config.stupid_loss.penalty, 3.0);
        assert_eq!(config.stupid_loss.second_max_ratio, 2.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig { coming_up_limit: 3, ..Default::default() };
        let restored = EngineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "lab_mode = \"sometimes\"").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
