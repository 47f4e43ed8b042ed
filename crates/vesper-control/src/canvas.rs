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

//! Device-pixel-ratio clamping and framebuffer pixel budgets.
//!
//! Everything here is a pure function except [`apply_dpr_to_canvas`], which
//! resizes a surface's backing store.

use serde::{Deserialize, Serialize};
use vesper_core::platform::{DisplayInfo, SurfaceCanvas};
use vesper_core::DeviceTier;

/// A framebuffer size expressed as its total pixel budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCeiling {
    /// Reference width.
    pub width: u32,
    /// Reference height.
    pub height: u32,
}

impl PixelCeiling {
    /// Total pixels; only the product matters, not the aspect ratio.
    pub fn pixels(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

/// Tier-indexed pixel ceilings and DPR ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// DPR ceiling on handheld devices.
    pub mobile_dpr_ceiling: f32,
    /// DPR ceiling elsewhere.
    pub desktop_dpr_ceiling: f32,
    /// Pixel budget at [`DeviceTier::Low`].
    pub low_ceiling: PixelCeiling,
    /// Pixel budget at [`DeviceTier::Medium`].
    pub medium_ceiling: PixelCeiling,
    /// Pixel budget at [`DeviceTier::High`].
    pub high_ceiling: PixelCeiling,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            mobile_dpr_ceiling: 1.5,
            desktop_dpr_ceiling: 2.0,
            low_ceiling: PixelCeiling {
                width: 640,
                height: 360,
            },
            medium_ceiling: PixelCeiling {
                width: 960,
                height: 540,
            },
            high_ceiling: PixelCeiling {
                width: 1280,
                height: 720,
            },
        }
    }
}

impl CanvasConfig {
    /// The pixel budget for `tier`; `Ultra` is uncapped.
    pub fn ceiling_for(&self, tier: DeviceTier) -> Option<PixelCeiling> {
        match tier {
            DeviceTier::Low => Some(self.low_ceiling),
            DeviceTier::Medium => Some(self.medium_ceiling),
            DeviceTier::High => Some(self.high_ceiling),
            DeviceTier::Ultra => None,
        }
    }
}

/// The DPR to render at: the platform ceiling, never above the native ratio.
pub fn get_clamped_dpr(display: &DisplayInfo, config: &CanvasConfig) -> f32 {
    let ceiling = if display.is_mobile_ua {
        config.mobile_dpr_ceiling
    } else {
        config.desktop_dpr_ceiling
    };
    if !display.native_dpr.is_finite() || display.native_dpr <= 0.0 {
        return 1.0_f32.min(ceiling);
    }
    ceiling.min(display.native_dpr)
}

/// Resizes the canvas backing store to `client size × dpr`, leaving the
/// layout size alone. Returns the new backing size.
pub fn apply_dpr_to_canvas<C: SurfaceCanvas + ?Sized>(canvas: &mut C, dpr: f32) -> (u32, u32) {
    let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
    let width = (canvas.client_width() as f32 * dpr).floor() as u32;
    let height = (canvas.client_height() as f32 * dpr).floor() as u32;
    canvas.set_backing_size(width, height);
    log::trace!("Canvas backing store set to {}x{} (dpr {:.2})", width, height, dpr);
    (width, height)
}

/// Caps `dpr` so a `width × height` viewport stays within the tier's pixel budget.
///
/// The result is rounded down to one decimal and never below `1.0` or above
/// `dpr`. A zero-area viewport, an uncapped tier, or a requested ratio at or
/// below `1.0` returns `dpr` unchanged.
pub fn get_mobile_canvas_cap(
    width: u32,
    height: u32,
    dpr: f32,
    tier: DeviceTier,
    config: &CanvasConfig,
) -> f32 {
    if !dpr.is_finite() || dpr <= 1.0 {
        return dpr;
    }
    let area = width as f64 * height as f64;
    if area == 0.0 {
        return dpr;
    }
    let Some(ceiling) = config.ceiling_for(tier) else {
        return dpr;
    };

    let dpr64 = dpr as f64;
    let target_pixels = ceiling.pixels().min(area * dpr64 * dpr64);
    let max_dpr = (target_pixels / area).sqrt();
    let stepped = (max_dpr * 10.0).floor() / 10.0;
    let capped = dpr64.min(stepped).clamp(1.0, dpr64) as f32;

    if capped < dpr {
        log::debug!(
            "Pixel budget ({}) caps dpr {:.2} -> {:.2} for {}x{}",
            tier,
            dpr,
            capped,
            width,
            height
        );
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct FakeCanvas {
        client: (u32, u32),
        backing: (u32, u32),
    }

    impl SurfaceCanvas for FakeCanvas {
        fn client_width(&self) -> u32 {
            self.client.0
        }
        fn client_height(&self) -> u32 {
            self.client.1
        }
        fn set_backing_size(&mut self, width: u32, height: u32) {
            self.backing = (width, height);
        }
    }

    #[test]
    fn test_clamped_dpr_mobile_and_desktop() {
        let config = CanvasConfig::default();
        let mobile = DisplayInfo {
            native_dpr: 3.0,
            is_mobile_ua: true,
        };
        let desktop = DisplayInfo {
            native_dpr: 3.0,
            is_mobile_ua: false,
        };
        assert_relative_eq!(get_clamped_dpr(&mobile, &config), 1.5);
        assert_relative_eq!(get_clamped_dpr(&desktop, &config), 2.0);
    }

    #[test]
    fn test_clamped_dpr_never_exceeds_native() {
        let config = CanvasConfig::default();
        let low_density = DisplayInfo {
            native_dpr: 1.25,
            is_mobile_ua: false,
        };
        assert_relative_eq!(get_clamped_dpr(&low_density, &config), 1.25);

        let broken = DisplayInfo {
            native_dpr: f32::NAN,
            is_mobile_ua: true,
        };
        assert_relative_eq!(get_clamped_dpr(&broken, &config), 1.0);
    }

    #[test]
    fn test_apply_dpr_scales_backing_store_only() {
        let mut canvas = FakeCanvas {
            client: (100, 50),
            backing: (0, 0),
        };
        assert_eq!(apply_dpr_to_canvas(&mut canvas, 2.0), (200, 100));
        assert_eq!(canvas.backing, (200, 100));
        assert_eq!(canvas.client, (100, 50));
    }

    #[test]
    fn test_apply_dpr_floors_fractional_sizes() {
        let mut canvas = FakeCanvas {
            client: (101, 51),
            backing: (0, 0),
        };
        apply_dpr_to_canvas(&mut canvas, 1.5);
        assert_eq!(canvas.backing, (151, 76));
    }

    #[test]
    fn test_low_tier_caps_large_viewport() {
        let config = CanvasConfig::default();
        let capped = get_mobile_canvas_cap(1920, 1080, 2.5, DeviceTier::Low, &config);
        assert!(capped < 2.5);
        assert!(capped >= 1.0);
        assert_relative_eq!(capped, 1.0);
    }

    #[test]
    fn test_cap_rounds_down_to_one_decimal() {
        let config = CanvasConfig::default();
        // 640x360 at High: budget allows exactly 2x.
        let capped = get_mobile_canvas_cap(640, 360, 3.0, DeviceTier::High, &config);
        assert_relative_eq!(capped, 2.0);

        // 700x400 at High: sqrt(921600 / 280000) = 1.814... -> 1.8.
        let capped = get_mobile_canvas_cap(700, 400, 3.0, DeviceTier::High, &config);
        assert_relative_eq!(capped, 1.8, epsilon = 1e-6);
    }

    #[test]
    fn test_budget_already_satisfied_keeps_dpr() {
        let config = CanvasConfig::default();
        let capped = get_mobile_canvas_cap(320, 180, 2.0, DeviceTier::Low, &config);
        assert_relative_eq!(capped, 2.0);
    }

    #[test]
    fn test_degenerate_inputs_return_dpr() {
        let config = CanvasConfig::default();
        assert_relative_eq!(
            get_mobile_canvas_cap(0, 1080, 2.5, DeviceTier::Low, &config),
            2.5
        );
        assert_relative_eq!(
            get_mobile_canvas_cap(1920, 0, 2.5, DeviceTier::Low, &config),
            2.5
        );
        assert_relative_eq!(
            get_mobile_canvas_cap(3840, 2160, 2.5, DeviceTier::Ultra, &config),
            2.5
        );
        assert_relative_eq!(
            get_mobile_canvas_cap(1920, 1080, 0.75, DeviceTier::Low, &config),
            0.75
        );
    }

    #[test]
    fn test_cap_stays_within_pixel_budget() {
        let config = CanvasConfig::default();
        for tier in [DeviceTier::Low, DeviceTier::Medium, DeviceTier::High] {
            let ceiling = config.ceiling_for(tier).unwrap().pixels();
            for (w, h) in [(400u32, 300u32), (500, 280), (800, 600)] {
                let dpr = 3.0;
                let capped = get_mobile_canvas_cap(w, h, dpr, tier, &config) as f64;
                let pixels = w as f64 * h as f64 * capped * capped;
                // Holds whenever the 1.0 floor is not what bounds the result.
                if capped > 1.0 {
                    assert!(pixels <= ceiling + 1.0, "{tier} {w}x{h}: {pixels} > {ceiling}");
                }
                assert!((1.0..=dpr as f64).contains(&capped));
            }
        }
    }
}
