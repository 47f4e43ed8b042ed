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

//! Error types for the governor.
//!
//! None of these are produced on the per-frame path. They surface only while
//! loading configuration or the policy table at startup, or from a persistent
//! store, whose failures the frame path logs and swallows.

use crate::policy::LayerName;
use crate::tier::DeviceTier;
use thiserror::Error;

/// A string did not name a known [`DeviceTier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown device tier '{0}'")]
pub struct UnknownTierError(pub String);

/// A string did not name a known [`EffectName`](crate::policy::EffectName).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown effect '{0}'")]
pub struct UnknownEffectError(pub String);

/// A policy table failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyTableError {
    /// No policy was supplied for a tier.
    #[error("no policy defined for tier '{0}'")]
    MissingTier(DeviceTier),
    /// More than one policy was supplied for a tier.
    #[error("duplicate policy for tier '{0}'")]
    DuplicateTier(DeviceTier),
    /// A higher tier drops a layer that a lower tier enables.
    #[error("tier '{higher}' does not enable layer {layer:?} that lower tier '{lower}' enables")]
    NonMonotonicLayers {
        /// The lower tier that enables the layer.
        lower: DeviceTier,
        /// The higher tier that omits it.
        higher: DeviceTier,
        /// The layer in question.
        layer: LayerName,
    },
    /// The ambient layer is missing from a tier.
    #[error("tier '{0}' does not enable the ambient layer")]
    MissingAmbient(DeviceTier),
    /// Limits are inconsistent (e.g. `min_fps > target_fps`).
    #[error("tier '{tier}' has invalid limits: {reason}")]
    InvalidLimits {
        /// The offending tier.
        tier: DeviceTier,
        /// Human-readable reason.
        reason: String,
    },
    /// Quality parameters are out of range.
    #[error("tier '{tier}' has invalid quality parameters: {reason}")]
    InvalidQuality {
        /// The offending tier.
        tier: DeviceTier,
        /// Human-readable reason.
        reason: String,
    },
    /// The table source could not be parsed.
    #[error("failed to parse policy table: {0}")]
    Parse(String),
}

/// Governor configuration failed validation or parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric knob is outside its valid range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The configuration field name.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// The configuration source could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {reason}")]
    Io {
        /// The path that was read.
        path: String,
        /// The underlying I/O error message.
        reason: String,
    },
}

/// A persistent key/value store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The backing file does not hold a flat string map.
    #[error("store contents are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The store's internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
    /// The store's writer has shut down.
    #[error("store writer closed")]
    Closed,
}
