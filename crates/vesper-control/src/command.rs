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

//! Messages sent from UI threads to the render loop.

use serde::{Deserialize, Serialize};
use vesper_core::{DeviceTier, EffectName};

/// A request applied at the start of the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PolicyCommand {
    /// Pins the active tier, or releases the pin with `None`.
    SetTierOverride(Option<DeviceTier>),
    /// Forces one effect on or off.
    SetEffect {
        /// The effect.
        effect: EffectName,
        /// Desired state.
        enabled: bool,
    },
    /// Drops every manual override and its persisted copy.
    ClearOverrides,
    /// The host surface was hidden (`false`) or shown again (`true`).
    VisibilityChanged(bool),
}
