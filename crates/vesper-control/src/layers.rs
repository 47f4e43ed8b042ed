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

//! Layer mount decisions and per-effect gates.

use vesper_core::{
    BlendMode, EffectName, EffectToggles, EffectUpdate, LayerConfig, LayerName, TierPolicy,
};

/// Below this FPS the thin-film effect is switched off.
pub const THIN_FILM_DISABLE_FPS: f32 = 45.0;

/// Static compositing attributes of a layer.
#[derive(Debug, Clone, Copy)]
struct LayerStyle {
    name: LayerName,
    z_index: i32,
    blend_mode: BlendMode,
    opacity: f32,
}

const LAYER_STYLES: [LayerStyle; 4] = [
    LayerStyle {
        name: LayerName::Ambient,
        z_index: 0,
        blend_mode: BlendMode::Normal,
        opacity: 1.0,
    },
    LayerStyle {
        name: LayerName::Fluid,
        z_index: 10,
        blend_mode: BlendMode::Screen,
        opacity: 0.9,
    },
    LayerStyle {
        name: LayerName::ThinFilm,
        z_index: 20,
        blend_mode: BlendMode::Overlay,
        opacity: 0.6,
    },
    LayerStyle {
        name: LayerName::Particles,
        z_index: 30,
        blend_mode: BlendMode::Additive,
        opacity: 0.8,
    },
];

/// `true` if the tier mounts `name`. The ambient layer is always mounted.
pub fn should_mount_layer(name: LayerName, policy: &TierPolicy) -> bool {
    name == LayerName::Ambient || policy.allows(name)
}

/// Every layer in fixed order, enabled per the tier's layer set.
pub fn get_layer_configs(policy: &TierPolicy) -> Vec<LayerConfig> {
    LAYER_STYLES
        .iter()
        .map(|style| LayerConfig {
            name: style.name,
            enabled: should_mount_layer(style.name, policy),
            z_index: style.z_index,
            blend_mode: style.blend_mode,
            opacity: style.opacity,
        })
        .collect()
}

/// Layer configs with the per-effect toggles applied on top of the tier.
///
/// An effect toggle can only remove a layer the tier permits, never add one.
pub fn resolve_layers(policy: &TierPolicy, effects: &EffectToggles) -> Vec<LayerConfig> {
    let mut configs = get_layer_configs(policy);
    for config in &mut configs {
        if let Some(effect) = config.name.effect() {
            config.enabled &= effects.get(effect);
        }
    }
    configs
}

/// Names of mounted layers, bottom first.
pub fn get_z_index_stack(policy: &TierPolicy) -> Vec<LayerName> {
    let mut enabled: Vec<LayerConfig> = get_layer_configs(policy)
        .into_iter()
        .filter(|c| c.enabled)
        .collect();
    enabled.sort_by_key(|c| c.z_index);
    enabled.into_iter().map(|c| c.name).collect()
}

/// The unconditional per-effect safety valve.
///
/// Runs after the tier decision each frame and is independent of tier
/// cooldowns. It only ever disables; re-enabling is left to a tier change or a
/// manual override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectPolicy {
    /// Below this FPS the thin-film effect is switched off.
    pub thin_film_disable_fps: f32,
}

impl Default for EffectPolicy {
    fn default() -> Self {
        Self {
            thin_film_disable_fps: THIN_FILM_DISABLE_FPS,
        }
    }
}

impl EffectPolicy {
    /// Emits `{ thin_film_enabled: false }` through `update_policy` when
    /// `current_fps` is below the threshold and thin film is on.
    ///
    /// Returns `true` if the update was emitted.
    pub fn enforce_thin_film_gate(
        &self,
        current_fps: f32,
        effects: &EffectToggles,
        mut update_policy: impl FnMut(EffectUpdate),
    ) -> bool {
        if !current_fps.is_finite() || current_fps <= 0.0 {
            return false;
        }
        if current_fps < self.thin_film_disable_fps && effects.thin_film_enabled {
            log::info!(
                "Thin-film gate tripped at {:.1} fps (< {:.0}); disabling effect.",
                current_fps,
                self.thin_film_disable_fps
            );
            update_policy(EffectUpdate::single(EffectName::ThinFilm, false));
            return true;
        }
        false
    }
}

/// [`EffectPolicy::enforce_thin_film_gate`] with the default threshold.
pub fn enforce_thin_film_performance_gate(
    current_fps: f32,
    effects: &EffectToggles,
    update_policy: impl FnMut(EffectUpdate),
) -> bool {
    EffectPolicy::default().enforce_thin_film_gate(current_fps, effects, update_policy)
}
