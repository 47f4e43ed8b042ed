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

//! One-shot device classification.
//!
//! Runs once at startup, before any frame-rate data exists, to guess a
//! starting tier and a ceiling the feedback loop may never exceed.

use vesper_core::platform::{CapabilityHints, HostSignals};
use vesper_core::DeviceTier;

/// Viewports narrower than this, combined with touch input, count as handheld.
pub const MOBILE_VIEWPORT_MAX_WIDTH: u32 = 1024;

/// Below this much memory a device starts one tier lower.
pub const LOW_MEMORY_THRESHOLD_MB: u32 = 4096;

const MOBILE_UA_MARKERS: [&str; 7] = [
    "android",
    "iphone",
    "ipad",
    "ipod",
    "mobile",
    "opera mini",
    "iemobile",
];

/// Returns `true` if `user_agent` names a handheld platform.
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    MOBILE_UA_MARKERS.iter().any(|marker| ua.contains(marker))
}

/// Classifies the host. Never fails; absent signals degrade to `None`/`false`.
pub fn profile_capabilities(signals: &HostSignals) -> CapabilityHints {
    let ua_mobile = signals
        .user_agent
        .as_deref()
        .map(is_mobile_user_agent)
        .unwrap_or(false);
    let narrow_touch = signals.touch_support
        && signals
            .viewport_width
            .map(|w| w < MOBILE_VIEWPORT_MAX_WIDTH)
            .unwrap_or(false);

    let device_memory_mb = signals
        .device_memory_gb
        .filter(|gb| gb.is_finite() && *gb > 0.0)
        .map(|gb| (gb * 1024.0).round() as u32);

    let hints = CapabilityHints {
        save_data_hint: signals.save_data.unwrap_or(false),
        device_memory_mb,
        is_mobile_ua: ua_mobile || narrow_touch,
    };
    log::debug!(
        "Capability profile: mobile={}, memory={:?}MB, save_data={}",
        hints.is_mobile_ua,
        hints.device_memory_mb,
        hints.save_data_hint
    );
    hints
}

fn is_low_memory(hints: &CapabilityHints) -> bool {
    hints
        .device_memory_mb
        .map(|mb| mb < LOW_MEMORY_THRESHOLD_MB)
        .unwrap_or(false)
}

/// The tier to start at before any performance data exists.
///
/// | Condition | Tier |
/// |---|---|
/// | Save-data requested | Low |
/// | Handheld, < 4 GB | Low |
/// | Handheld | Medium |
/// | Desktop, < 4 GB | Medium |
/// | Desktop (memory unknown or ≥ 4 GB) | High |
pub fn suggest_initial_tier(hints: &CapabilityHints) -> DeviceTier {
    match (hints.save_data_hint, hints.is_mobile_ua, is_low_memory(hints)) {
        (true, _, _) => DeviceTier::Low,
        (false, true, true) => DeviceTier::Low,
        (false, true, false) => DeviceTier::Medium,
        (false, false, true) => DeviceTier::Medium,
        (false, false, false) => DeviceTier::High,
    }
}

/// The highest tier the device class may ever reach.
pub fn tier_ceiling(hints: &CapabilityHints) -> DeviceTier {
    if hints.save_data_hint {
        DeviceTier::Medium
    } else if hints.is_mobile_ua {
        DeviceTier::High
    } else {
        DeviceTier::Ultra
    }
}
