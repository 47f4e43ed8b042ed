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

//! Frame-rate estimation over a rolling window of frame ticks.

use std::time::{Duration, Instant};
use vesper_core::DeviceTier;

/// FPS reported before the first window closes. Above every step-down threshold.
pub const BOOTSTRAP_FPS: f32 = 60.0;

/// Configuration for the [`PerformanceMonitor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Length of one measurement window.
    pub window: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
        }
    }
}

/// Counts frames and reports an FPS estimate once per window.
///
/// `tick` must be called exactly once per rendered frame, from the render loop.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    frame_count: u32,
    window_start: Instant,
    estimated_fps: f32,
    windows_closed: u64,
}

impl PerformanceMonitor {
    /// Creates a monitor whose first window starts now.
    pub fn new(config: MonitorConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a monitor whose first window starts at `start`.
    pub fn starting_at(config: MonitorConfig, start: Instant) -> Self {
        Self {
            config,
            frame_count: 0,
            window_start: start,
            estimated_fps: BOOTSTRAP_FPS,
            windows_closed: 0,
        }
    }

    /// Records one frame. Returns the new estimate when a window closes.
    pub fn tick(&mut self) -> Option<f32> {
        self.tick_at(Instant::now())
    }

    /// Records one frame observed at `now`.
    pub fn tick_at(&mut self, now: Instant) -> Option<f32> {
        self.frame_count = self.frame_count.saturating_add(1);

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.config.window {
            return None;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let fps = (self.frame_count as f64 / elapsed_ms * 1000.0) as f32;
        self.frame_count = 0;
        self.window_start = now;

        if !fps.is_finite() || fps <= 0.0 {
            log::debug!("PerformanceMonitor: discarding invalid sample {}", fps);
            return None;
        }
        self.estimated_fps = fps;
        self.windows_closed += 1;
        log::trace!("PerformanceMonitor: window closed at {:.1} fps", fps);
        Some(fps)
    }

    /// The last estimate, or [`BOOTSTRAP_FPS`] before the first window closes.
    pub fn fps(&self) -> f32 {
        self.estimated_fps
    }

    /// Frames counted in the open window.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Number of windows that produced a valid estimate.
    pub fn windows_closed(&self) -> u64 {
        self.windows_closed
    }

    /// `true` if the estimate is below `threshold`.
    pub fn should_step_down(&self, threshold: f32) -> bool {
        self.estimated_fps < threshold
    }

    /// `true` if the estimate is above `threshold` and `current` is below `max_tier`.
    pub fn should_step_up(&self, threshold: f32, current: DeviceTier, max_tier: DeviceTier) -> bool {
        self.estimated_fps > threshold && current < max_tier
    }

    /// Re-arms the window. Call after the host resumes from suspension so the
    /// idle gap is not counted.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    /// Re-arms the window at `now`.
    ///
    /// The last estimate is kept; only the in-progress window is discarded.
    pub fn reset_at(&mut self, now: Instant) {
        self.frame_count = 0;
        self.window_start = now;
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}
