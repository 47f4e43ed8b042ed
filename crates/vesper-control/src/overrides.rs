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

//! User-chosen overrides and their persistence.

use std::collections::BTreeMap;
use std::sync::Arc;
use vesper_core::storage::KeyValueStore;
use vesper_core::{DeviceTier, EffectName, EffectToggles};

/// Store key holding the manually selected tier.
pub const TIER_KEY: &str = "vesper.override.tier";
/// Prefix of the per-effect store keys; the effect name is appended.
pub const EFFECT_KEY_PREFIX: &str = "vesper.override.effect.";

/// Overrides chosen in the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualOverrides {
    /// A pinned tier. While set, the automatic state machine is suspended.
    pub tier: Option<DeviceTier>,
    /// Explicit effect choices.
    pub effects: BTreeMap<EffectName, bool>,
}

impl ManualOverrides {
    /// `true` if nothing is overridden.
    pub fn is_empty(&self) -> bool {
        self.tier.is_none() && self.effects.is_empty()
    }

    /// Applies the effect overrides on top of `toggles`.
    pub fn apply_effects(&self, toggles: &mut EffectToggles) {
        for (effect, enabled) in &self.effects {
            toggles.set(*effect, *enabled);
        }
    }
}

fn effect_key(effect: EffectName) -> String {
    format!("{EFFECT_KEY_PREFIX}{effect}")
}

/// Persists [`ManualOverrides`] in a host key/value store.
///
/// Store failures are logged and swallowed.
#[derive(Clone)]
pub struct OverrideStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for OverrideStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideStore").finish_non_exhaustive()
    }
}

impl OverrideStore {
    /// Wraps a host store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("OverrideStore: failed to read '{}': {}", key, e);
                None
            }
        }
    }

    /// Loads persisted overrides. Unparsable entries are ignored.
    pub fn load(&self) -> ManualOverrides {
        let mut overrides = ManualOverrides::default();

        if let Some(raw) = self.read(TIER_KEY) {
            match raw.parse::<DeviceTier>() {
                Ok(tier) => overrides.tier = Some(tier),
                Err(e) => log::warn!("OverrideStore: ignoring stored tier: {}", e),
            }
        }

        for effect in EffectName::ALL {
            let key = effect_key(effect);
            let Some(raw) = self.read(&key) else {
                continue;
            };
            match raw.trim().parse::<bool>() {
                Ok(enabled) => {
                    overrides.effects.insert(effect, enabled);
                }
                Err(_) => log::warn!("OverrideStore: ignoring '{}' = '{}'", key, raw),
            }
        }

        if !overrides.is_empty() {
            log::info!("Restored manual overrides: {:?}", overrides);
        }
        overrides
    }

    /// Persists the tier override; `None` removes it.
    pub fn save_tier(&self, tier: Option<DeviceTier>) {
        let result = match tier {
            Some(tier) => self.store.set(TIER_KEY, tier.as_str()),
            None => self.store.remove(TIER_KEY),
        };
        if let Err(e) = result {
            log::warn!("OverrideStore: failed to persist tier override: {}", e);
        }
    }

    /// Persists one effect override.
    pub fn save_effect(&self, effect: EffectName, enabled: bool) {
        let value = if enabled { "true" } else { "false" };
        if let Err(e) = self.store.set(&effect_key(effect), value) {
            log::warn!("OverrideStore: failed to persist {} override: {}", effect, e);
        }
    }

    /// Removes every persisted override.
    pub fn clear(&self) {
        self.save_tier(None);
        for effect in EffectName::ALL {
            if let Err(e) = self.store.remove(&effect_key(effect)) {
                log::warn!("OverrideStore: failed to clear {} override: {}", effect, e);
            }
        }
    }
}
