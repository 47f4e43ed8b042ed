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

//! The discrete rendering-quality tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnknownTierError;

/// A discrete level of rendering quality.
///
/// The declaration order defines the ordering: `Low < Medium < High < Ultra`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    /// Minimum work: ambient layer only, smallest framebuffers.
    #[default]
    Low,
    /// Fluid simulation at reduced resolution.
    Medium,
    /// Fluid plus particles.
    High,
    /// Every layer, including the thin-film effect.
    Ultra,
}

impl DeviceTier {
    /// All tiers, lowest first.
    pub const ALL: [DeviceTier; 4] = [
        DeviceTier::Low,
        DeviceTier::Medium,
        DeviceTier::High,
        DeviceTier::Ultra,
    ];

    /// The tier one step below, or `None` at `Low`.
    pub fn lower(self) -> Option<DeviceTier> {
        match self {
            DeviceTier::Low => None,
            DeviceTier::Medium => Some(DeviceTier::Low),
            DeviceTier::High => Some(DeviceTier::Medium),
            DeviceTier::Ultra => Some(DeviceTier::High),
        }
    }

    /// The tier one step above, or `None` at `Ultra`.
    pub fn higher(self) -> Option<DeviceTier> {
        match self {
            DeviceTier::Low => Some(DeviceTier::Medium),
            DeviceTier::Medium => Some(DeviceTier::High),
            DeviceTier::High => Some(DeviceTier::Ultra),
            DeviceTier::Ultra => None,
        }
    }

    /// Clamps this tier into `[min, max]`. An inverted range collapses to `min`.
    pub fn clamp_to(self, min: DeviceTier, max: DeviceTier) -> DeviceTier {
        if max < min {
            return min;
        }
        self.max(min).min(max)
    }

    /// Stable lowercase name, also used as the persisted key value.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceTier::Low => "low",
            DeviceTier::Medium => "medium",
            DeviceTier::High => "high",
            DeviceTier::Ultra => "ultra",
        }
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceTier {
    type Err = UnknownTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(DeviceTier::Low),
            "medium" => Ok(DeviceTier::Medium),
            "high" => Ok(DeviceTier::High),
            "ultra" => Ok(DeviceTier::Ultra),
            _ => Err(UnknownTierError(s.to_string())),
        }
    }
}
