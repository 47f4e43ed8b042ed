// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Governor configuration.
//!
//! Every knob has a default, so a partial JSON document (or none at all) is a
//! valid configuration.

use crate::canvas::CanvasConfig;
use crate::layers::EffectPolicy;
use crate::performance::MonitorConfig;
use crate::policy_table::PolicyTable;
use crate::transition::TransitionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vesper_core::ConfigError;

/// Configuration for the whole governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Wait before the first step-down, in milliseconds.
    pub step_down_duration_ms: u64,
    /// Wait before the first step-up, in milliseconds.
    pub step_up_duration_ms: u64,
    /// Minimum gap between transitions, in milliseconds.
    pub cooldown_period_ms: u64,
    /// FPS below which the tier steps down. Applies to the built-in table; a
    /// custom table carries its own thresholds per tier.
    pub step_down_fps_threshold: f32,
    /// FPS above which the tier steps up. See `step_down_fps_threshold`.
    pub step_up_fps_threshold: f32,
    /// FPS below which the thin-film effect is disabled.
    pub thin_film_disable_fps_threshold: f32,
    /// Length of one FPS measurement window, in milliseconds.
    pub fps_window_ms: u64,
    /// Pixel and DPR ceilings.
    pub canvas: CanvasConfig,
    /// Maximum number of queued UI commands.
    pub command_buffer_size: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            step_down_duration_ms: 2000,
            step_up_duration_ms: 3000,
            cooldown_period_ms: 5000,
            step_down_fps_threshold: 25.0,
            step_up_fps_threshold: 50.0,
            thin_film_disable_fps_threshold: 45.0,
            fps_window_ms: 1000,
            canvas: CanvasConfig::default(),
            command_buffer_size: 64,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("expected a positive number, got {value}")))
    }
}

impl GovernorConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Checks every knob.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("step_down_fps_threshold", self.step_down_fps_threshold)?;
        positive("step_up_fps_threshold", self.step_up_fps_threshold)?;
        positive(
            "thin_film_disable_fps_threshold",
            self.thin_film_disable_fps_threshold,
        )?;
        if self.step_down_fps_threshold >= self.step_up_fps_threshold {
            return Err(invalid(
                "step_down_fps_threshold",
                "must be below step_up_fps_threshold",
            ));
        }
        if self.fps_window_ms == 0 {
            return Err(invalid("fps_window_ms", "must be non-zero"));
        }
        if self.command_buffer_size == 0 {
            return Err(invalid("command_buffer_size", "must be non-zero"));
        }
        positive("canvas.mobile_dpr_ceiling", self.canvas.mobile_dpr_ceiling)?;
        positive("canvas.desktop_dpr_ceiling", self.canvas.desktop_dpr_ceiling)?;
        for (field, ceiling) in [
            ("canvas.low_ceiling", self.canvas.low_ceiling),
            ("canvas.medium_ceiling", self.canvas.medium_ceiling),
            ("canvas.high_ceiling", self.canvas.high_ceiling),
        ] {
            if ceiling.width == 0 || ceiling.height == 0 {
                return Err(invalid(field, "width and height must be non-zero"));
            }
        }
        Ok(())
    }

    /// Tier state machine settings.
    pub fn transition(&self) -> TransitionConfig {
        TransitionConfig {
            step_down_duration: Duration::from_millis(self.step_down_duration_ms),
            step_up_duration: Duration::from_millis(self.step_up_duration_ms),
            cooldown_period: Duration::from_millis(self.cooldown_period_ms),
            step_down_fps_threshold: self.step_down_fps_threshold,
            step_up_fps_threshold: self.step_up_fps_threshold,
        }
    }

    /// The built-in policy table with this configuration's step thresholds.
    pub fn builtin_table(&self) -> PolicyTable {
        PolicyTable::builtin().with_fps_thresholds(self.transition().thresholds())
    }

    /// FPS monitor settings.
    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            window: Duration::from_millis(self.fps_window_ms),
        }
    }

    /// Effect gate settings.
    pub fn effect_policy(&self) -> EffectPolicy {
        EffectPolicy {
            thin_film_disable_fps: self.thin_film_disable_fps_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = GovernorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transition(), TransitionConfig::default());
        assert_eq!(config.monitor(), MonitorConfig::default());
        assert_eq!(config.effect_policy(), EffectPolicy::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GovernorConfig::from_json_str(
            r#"{ "cooldown_period_ms": 8000, "canvas": { "mobile_dpr_ceiling": 1.25 } }"#,
        )
        .unwrap();
        assert_eq!(config.cooldown_period_ms, 8000);
        assert_eq!(config.step_down_duration_ms, 2000);
        assert_eq!(config.canvas.mobile_dpr_ceiling, 1.25);
        assert_eq!(config.canvas.desktop_dpr_ceiling, 2.0);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = GovernorConfig::from_json_str(
            r#"{ "step_down_fps_threshold": 60, "step_up_fps_threshold": 50 }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "step_down_fps_threshold",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_and_io_errors() {
        assert!(matches!(
            GovernorConfig::from_json_str("[]"),
            Err(ConfigError::Parse(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GovernorConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_builtin_table_takes_configured_thresholds() {
        let config = GovernorConfig::from_json_str(
            r#"{ "step_down_fps_threshold": 30, "step_up_fps_threshold": 58 }"#,
        )
        .unwrap();
        let table = config.builtin_table();
        let limits = table.get(vesper_core::DeviceTier::Medium).limits;
        assert_eq!(limits.step_down_fps_threshold, 30.0);
        assert_eq!(limits.step_up_fps_threshold, 58.0);
        assert_eq!(GovernorConfig::default().builtin_table(), PolicyTable::builtin());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governor.json");
        std::fs::write(&path, r#"{ "fps_window_ms": 500 }"#).unwrap();
        let config = GovernorConfig::load(&path).unwrap();
        assert_eq!(config.monitor().window, Duration::from_millis(500));
    }
}
