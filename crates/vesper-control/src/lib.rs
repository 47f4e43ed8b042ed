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

//! # Vesper Control
//!
//! The adaptive quality governor: device profiling, pixel budgets, battery
//! saving, FPS estimation, the tier state machine, layer resolution, and the
//! [`VisualPolicyManager`] that drives them once per frame.

#![warn(missing_docs)]

pub mod battery;
pub mod canvas;
pub mod capability;
pub mod command;
pub mod config;
pub mod layers;
pub mod overrides;
pub mod performance;
pub mod policy_table;
pub mod service;
pub mod transition;

pub use battery::{BatterySaver, BatterySaverDecision};
pub use canvas::CanvasConfig;
pub use command::PolicyCommand;
pub use config::GovernorConfig;
pub use layers::EffectPolicy;
pub use overrides::{ManualOverrides, OverrideStore};
pub use performance::{MonitorConfig, PerformanceMonitor};
pub use policy_table::PolicyTable;
pub use service::{PolicyHandle, PolicySnapshot, VisualPolicyManager};
pub use transition::{FpsThresholds, TierTransitionManager, TransitionConfig};
