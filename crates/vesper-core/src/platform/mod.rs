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

//! Abstractions over what the host platform reports about the device.
//!
//! Every hint here is optional on real hosts. Missing data is a valid state
//! and must never be turned into an error or a forced quality reduction.

pub mod battery;

pub use battery::{BatteryHints, BatteryMonitor, BatterySubscription, ChannelBatteryMonitor};

/// Raw signals captured from the host at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSignals {
    /// Whether the host reports touch input support.
    pub touch_support: bool,
    /// Viewport width in CSS pixels, if known.
    pub viewport_width: Option<u32>,
    /// Host user-agent string, if any.
    pub user_agent: Option<String>,
    /// Connection "save data" preference, if the host exposes it.
    pub save_data: Option<bool>,
    /// Approximate device memory in gigabytes, if the host exposes it.
    pub device_memory_gb: Option<f32>,
}

/// Immutable device classification, captured once at process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityHints {
    /// The user asked the platform to save data.
    pub save_data_hint: bool,
    /// Device memory in megabytes, when reported.
    pub device_memory_mb: Option<u32>,
    /// The device looks like a handheld.
    pub is_mobile_ua: bool,
}

/// What the host reports about its output display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    /// The platform's native device-pixel-ratio.
    pub native_dpr: f32,
    /// The user agent looks like a handheld.
    pub is_mobile_ua: bool,
}

/// An output surface whose backing store can be resized independently of its
/// CSS (layout) size.
pub trait SurfaceCanvas {
    /// Layout width in CSS pixels.
    fn client_width(&self) -> u32;
    /// Layout height in CSS pixels.
    fn client_height(&self) -> u32;
    /// Sets the backing-store size in device pixels.
    fn set_backing_size(&mut self, width: u32, height: u32);
}
