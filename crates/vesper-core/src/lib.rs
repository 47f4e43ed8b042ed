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

//! # Vesper Core
//!
//! Foundational crate containing the tier model, policy data types, platform
//! traits, and error contracts shared by the governor crates.

#![warn(missing_docs)]

pub mod error;
pub mod platform;
pub mod policy;
pub mod storage;
pub mod tier;

pub use error::{
    ConfigError, PolicyTableError, StoreError, UnknownEffectError, UnknownTierError,
};
pub use policy::{
    BlendMode, EffectName, EffectToggles, EffectUpdate, LayerConfig, LayerName, PolicyLimits,
    QualityParams, TierPolicy,
};
pub use tier::DeviceTier;
