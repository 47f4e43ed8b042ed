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

//! Static mapping from tier to layer set, quality parameters, and limits.
//!
//! The table is loaded and validated once at startup. Malformed tables are
//! rejected there with a [`PolicyTableError`]; lookups on the frame path never
//! fail.

use crate::transition::FpsThresholds;
use std::collections::BTreeSet;
use vesper_core::{
    DeviceTier, LayerName, PolicyLimits, PolicyTableError, QualityParams, TierPolicy,
};

/// Exactly one validated [`TierPolicy`] per [`DeviceTier`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTable {
    // Indexed by `DeviceTier as usize`.
    policies: [TierPolicy; 4],
}

fn layers(names: &[LayerName]) -> BTreeSet<LayerName> {
    names.iter().copied().collect()
}

fn limits(target_fps: f32, min_fps: f32, max_fps: f32, gpu_budget_ms: f32) -> PolicyLimits {
    PolicyLimits {
        target_fps,
        min_fps,
        max_fps,
        gpu_budget_ms,
        step_down_fps_threshold: 25.0,
        step_up_fps_threshold: 50.0,
    }
}

impl PolicyTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        use LayerName::*;

        Self {
            policies: [
                TierPolicy {
                    tier: DeviceTier::Low,
                    layers: layers(&[Ambient]),
                    quality: QualityParams {
                        sim_resolution: 32,
                        dye_resolution: 256,
                        pressure_iterations: 8,
                        curl: 10.0,
                        velocity_dissipation: 0.4,
                        density_dissipation: 2.0,
                    },
                    limits: limits(30.0, 20.0, 30.0, 20.0),
                },
                TierPolicy {
                    tier: DeviceTier::Medium,
                    layers: layers(&[Ambient, Fluid]),
                    quality: QualityParams {
                        sim_resolution: 64,
                        dye_resolution: 512,
                        pressure_iterations: 12,
                        curl: 20.0,
                        velocity_dissipation: 0.3,
                        density_dissipation: 1.5,
                    },
                    limits: limits(45.0, 30.0, 60.0, 14.0),
                },
                TierPolicy {
                    tier: DeviceTier::High,
                    layers: layers(&[Ambient, Fluid, Particles]),
                    quality: QualityParams {
                        sim_resolution: 128,
                        dye_resolution: 1024,
                        pressure_iterations: 20,
                        curl: 30.0,
                        velocity_dissipation: 0.2,
                        density_dissipation: 1.0,
                    },
                    limits: limits(60.0, 45.0, 60.0, 10.0),
                },
                TierPolicy {
                    tier: DeviceTier::Ultra,
                    layers: layers(&[Ambient, Fluid, ThinFilm, Particles]),
                    quality: QualityParams {
                        sim_resolution: 256,
                        dye_resolution: 2048,
                        pressure_iterations: 30,
                        curl: 35.0,
                        velocity_dissipation: 0.15,
                        density_dissipation: 0.8,
                    },
                    limits: limits(60.0, 50.0, 120.0, 8.0),
                },
            ],
        }
    }

    /// Replaces every tier's step thresholds with `thresholds`.
    pub fn with_fps_thresholds(mut self, thresholds: FpsThresholds) -> Self {
        for policy in &mut self.policies {
            policy.limits.step_down_fps_threshold = thresholds.step_down;
            policy.limits.step_up_fps_threshold = thresholds.step_up;
        }
        self
    }

    /// Builds a table from one policy per tier, in any order, and validates it.
    pub fn from_policies(policies: Vec<TierPolicy>) -> Result<Self, PolicyTableError> {
        let mut slots: [Option<TierPolicy>; 4] = [None, None, None, None];
        for policy in policies {
            let slot = &mut slots[policy.tier as usize];
            if slot.is_some() {
                return Err(PolicyTableError::DuplicateTier(policy.tier));
            }
            *slot = Some(policy);
        }

        let [low, medium, high, ultra] = slots;
        let table = Self {
            policies: [
                low.ok_or(PolicyTableError::MissingTier(DeviceTier::Low))?,
                medium.ok_or(PolicyTableError::MissingTier(DeviceTier::Medium))?,
                high.ok_or(PolicyTableError::MissingTier(DeviceTier::High))?,
                ultra.ok_or(PolicyTableError::MissingTier(DeviceTier::Ultra))?,
            ],
        };
        table.validate()?;
        Ok(table)
    }

    /// Parses a JSON array of policies and validates it.
    pub fn from_json(json: &str) -> Result<Self, PolicyTableError> {
        let policies: Vec<TierPolicy> =
            serde_json::from_str(json).map_err(|e| PolicyTableError::Parse(e.to_string()))?;
        Self::from_policies(policies)
    }

    /// Serializes the table as a JSON array, lowest tier first.
    pub fn to_json(&self) -> String {
        // A Vec of plain data with string keys cannot fail to serialize.
        serde_json::to_string_pretty(&self.policies).unwrap_or_default()
    }

    /// Checks every table invariant.
    pub fn validate(&self) -> Result<(), PolicyTableError> {
        for (index, policy) in self.policies.iter().enumerate() {
            let expected = DeviceTier::ALL[index];
            if policy.tier != expected {
                return Err(PolicyTableError::MissingTier(expected));
            }
            if !policy.allows(LayerName::Ambient) {
                return Err(PolicyTableError::MissingAmbient(policy.tier));
            }
            validate_limits(policy)?;
            validate_quality(policy)?;
        }

        // Higher tiers never drop a layer a lower tier enables.
        for pair in self.policies.windows(2) {
            let (lower, higher) = (&pair[0], &pair[1]);
            if let Some(layer) = lower.layers.difference(&higher.layers).next() {
                return Err(PolicyTableError::NonMonotonicLayers {
                    lower: lower.tier,
                    higher: higher.tier,
                    layer: *layer,
                });
            }
        }
        Ok(())
    }

    /// The policy for `tier`.
    pub fn get(&self, tier: DeviceTier) -> &TierPolicy {
        &self.policies[tier as usize]
    }

    /// Looks a policy up by tier name.
    ///
    /// Unknown names fall back to the `Low` policy, erring toward lower
    /// resource usage.
    pub fn lookup(&self, key: &str) -> &TierPolicy {
        match key.parse::<DeviceTier>() {
            Ok(tier) => self.get(tier),
            Err(e) => {
                log::warn!("PolicyTable: {}; falling back to the low policy.", e);
                self.get(DeviceTier::Low)
            }
        }
    }

    /// Iterates policies from `Low` to `Ultra`.
    pub fn iter(&self) -> impl Iterator<Item = &TierPolicy> {
        self.policies.iter()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate_limits(policy: &TierPolicy) -> Result<(), PolicyTableError> {
    let l = &policy.limits;
    let invalid = |reason: &str| PolicyTableError::InvalidLimits {
        tier: policy.tier,
        reason: reason.to_string(),
    };

    let values = [
        l.target_fps,
        l.min_fps,
        l.max_fps,
        l.gpu_budget_ms,
        l.step_down_fps_threshold,
        l.step_up_fps_threshold,
    ];
    if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(invalid("all limits must be finite and positive"));
    }
    if !(l.min_fps <= l.target_fps && l.target_fps <= l.max_fps) {
        return Err(invalid("expected min_fps <= target_fps <= max_fps"));
    }
    if l.step_down_fps_threshold >= l.step_up_fps_threshold {
        return Err(invalid(
            "step_down_fps_threshold must be below step_up_fps_threshold",
        ));
    }
    Ok(())
}

fn validate_quality(policy: &TierPolicy) -> Result<(), PolicyTableError> {
    let q = &policy.quality;
    let invalid = |reason: &str| PolicyTableError::InvalidQuality {
        tier: policy.tier,
        reason: reason.to_string(),
    };

    if q.sim_resolution == 0 || q.dye_resolution == 0 || q.pressure_iterations == 0 {
        return Err(invalid("resolutions and pressure iterations must be non-zero"));
    }
    let values = [q.curl, q.velocity_dissipation, q.density_dissipation];
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(invalid("curl and dissipation must be finite and non-negative"));
    }
    Ok(())
}
