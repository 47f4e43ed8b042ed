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

//! Policy data: what a tier permits the rendering pipeline to do.

use crate::error::UnknownEffectError;
use crate::tier::DeviceTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// An independently mountable rendering pass.
///
/// The declaration order is the fixed compositing order, bottom first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerName {
    /// The baseline gradient backdrop. Always mounted.
    Ambient,
    /// The fluid simulation.
    Fluid,
    /// The iridescent thin-film interference overlay.
    ThinFilm,
    /// The particle field.
    Particles,
}

impl LayerName {
    /// All layers in compositing order.
    pub const ALL: [LayerName; 4] = [
        LayerName::Ambient,
        LayerName::Fluid,
        LayerName::ThinFilm,
        LayerName::Particles,
    ];

    /// The effect toggle gating this layer. The ambient layer has none.
    pub fn effect(self) -> Option<EffectName> {
        match self {
            LayerName::Ambient => None,
            LayerName::Fluid => Some(EffectName::Fluid),
            LayerName::ThinFilm => Some(EffectName::ThinFilm),
            LayerName::Particles => Some(EffectName::Particles),
        }
    }
}

/// How a layer is composited over the layers below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Source-over.
    Normal,
    /// Inverse multiply; brightens.
    Screen,
    /// Contrast-preserving overlay.
    Overlay,
    /// Additive accumulation.
    Additive,
}

/// A resolved, per-layer mount decision. Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerConfig {
    /// Which layer this entry describes.
    pub name: LayerName,
    /// Whether the pipeline should mount the layer.
    pub enabled: bool,
    /// Stacking order; higher draws on top.
    pub z_index: i32,
    /// Compositing mode.
    pub blend_mode: BlendMode,
    /// Layer opacity in `0.0..=1.0`.
    pub opacity: f32,
}

/// Simulation quality parameters consumed by the fluid renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityParams {
    /// Velocity field grid resolution.
    pub sim_resolution: u32,
    /// Dye texture resolution.
    pub dye_resolution: u32,
    /// Jacobi iterations for the pressure solve.
    pub pressure_iterations: u32,
    /// Vorticity confinement strength.
    pub curl: f32,
    /// Velocity decay per second.
    pub velocity_dissipation: f32,
    /// Dye decay per second.
    pub density_dissipation: f32,
}

/// Frame-rate and GPU budget limits attached to a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyLimits {
    /// Frame rate the tier is expected to sustain.
    pub target_fps: f32,
    /// Lowest acceptable frame rate.
    pub min_fps: f32,
    /// Frame-rate cap for the tier.
    pub max_fps: f32,
    /// GPU time per frame the tier may spend, in milliseconds.
    pub gpu_budget_ms: f32,
    /// Below this FPS the tier is a step-down candidate.
    pub step_down_fps_threshold: f32,
    /// Above this FPS the tier is a step-up candidate.
    pub step_up_fps_threshold: f32,
}

/// The resolved bundle of layer set, quality parameters, and limits for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// The tier this policy belongs to.
    pub tier: DeviceTier,
    /// Layers the tier permits.
    pub layers: BTreeSet<LayerName>,
    /// Simulation quality.
    pub quality: QualityParams,
    /// Frame-rate and budget limits.
    pub limits: PolicyLimits,
}

impl TierPolicy {
    /// Returns `true` if the tier permits `layer`.
    pub fn allows(&self, layer: LayerName) -> bool {
        self.layers.contains(&layer)
    }
}

/// A per-effect toggle the UI or the safety gate may flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectName {
    /// The fluid simulation layer.
    Fluid,
    /// The thin-film overlay.
    ThinFilm,
    /// The particle field.
    Particles,
}

impl EffectName {
    /// Every toggleable effect.
    pub const ALL: [EffectName; 3] = [EffectName::Fluid, EffectName::ThinFilm, EffectName::Particles];

    /// Stable snake_case name used in persisted keys.
    pub fn as_str(self) -> &'static str {
        match self {
            EffectName::Fluid => "fluid",
            EffectName::ThinFilm => "thin_film",
            EffectName::Particles => "particles",
        }
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectName {
    type Err = UnknownEffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fluid" => Ok(EffectName::Fluid),
            "thin_film" => Ok(EffectName::ThinFilm),
            "particles" => Ok(EffectName::Particles),
            _ => Err(UnknownEffectError(s.to_string())),
        }
    }
}

/// Boolean per-effect flags delivered to effect-specific renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectToggles {
    /// Fluid simulation on/off.
    pub fluid_enabled: bool,
    /// Thin-film overlay on/off.
    pub thin_film_enabled: bool,
    /// Particle field on/off.
    pub particles_enabled: bool,
}

impl EffectToggles {
    /// Toggles matching exactly the layers `policy` permits.
    pub fn for_policy(policy: &TierPolicy) -> Self {
        Self {
            fluid_enabled: policy.allows(LayerName::Fluid),
            thin_film_enabled: policy.allows(LayerName::ThinFilm),
            particles_enabled: policy.allows(LayerName::Particles),
        }
    }

    /// Reads one flag.
    pub fn get(&self, effect: EffectName) -> bool {
        match effect {
            EffectName::Fluid => self.fluid_enabled,
            EffectName::ThinFilm => self.thin_film_enabled,
            EffectName::Particles => self.particles_enabled,
        }
    }

    /// Writes one flag.
    pub fn set(&mut self, effect: EffectName, enabled: bool) {
        match effect {
            EffectName::Fluid => self.fluid_enabled = enabled,
            EffectName::ThinFilm => self.thin_film_enabled = enabled,
            EffectName::Particles => self.particles_enabled = enabled,
        }
    }

    /// Applies a partial update; `None` fields are left untouched.
    pub fn apply(&mut self, update: &EffectUpdate) {
        if let Some(v) = update.fluid_enabled {
            self.fluid_enabled = v;
        }
        if let Some(v) = update.thin_film_enabled {
            self.thin_film_enabled = v;
        }
        if let Some(v) = update.particles_enabled {
            self.particles_enabled = v;
        }
    }
}

/// A partial change to [`EffectToggles`], emitted through policy-update callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectUpdate {
    /// New fluid flag, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluid_enabled: Option<bool>,
    /// New thin-film flag, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thin_film_enabled: Option<bool>,
    /// New particle flag, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particles_enabled: Option<bool>,
}

impl EffectUpdate {
    /// An update that changes a single effect.
    pub fn single(effect: EffectName, enabled: bool) -> Self {
        let mut update = Self::default();
        match effect {
            EffectName::Fluid => update.fluid_enabled = Some(enabled),
            EffectName::ThinFilm => update.thin_film_enabled = Some(enabled),
            EffectName::Particles => update.particles_enabled = Some(enabled),
        }
        update
    }

    /// Returns `true` if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.fluid_enabled.is_none()
            && self.thin_film_enabled.is_none()
            && self.particles_enabled.is_none()
    }
}
