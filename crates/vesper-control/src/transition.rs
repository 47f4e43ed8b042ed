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

//! Tier transition state machine with hysteresis and cooldown.
//!
//! # Gate
//!
//! ```text
//!                   fps < step_down  &&  tier > Low        -> step-down candidate
//!   otherwise       fps > step_up    &&  tier < max_tier   -> step-up candidate
//!   otherwise                                              -> None (gate untouched)
//!
//!   required wait   before any transition : step_down_duration | step_up_duration
//!                   after a transition    : max(directional, cooldown_period)
//!
//!   elapsed since last transition >= required wait  -> one step, gate re-armed
//! ```
//!
//! The gate is wall-clock time since the last transition (construction time
//! counts as an implicit zeroth transition) combined with a *single* FPS
//! sample. It is not a sustained-breach tracker: one low sample arriving when
//! the gate has expired is enough to step down, even if its neighbours were
//! healthy.
//!
//! The FPS thresholds come from [`TransitionConfig`] unless the caller passes
//! the active tier's [`PolicyLimits`].

use std::time::{Duration, Instant};
use vesper_core::{DeviceTier, PolicyLimits};

/// Thresholds and timings for [`TierTransitionManager`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionConfig {
    /// Wait before the first step-down.
    pub step_down_duration: Duration,
    /// Wait before the first step-up.
    pub step_up_duration: Duration,
    /// Minimum gap between two transitions.
    pub cooldown_period: Duration,
    /// Samples below this are step-down candidates.
    pub step_down_fps_threshold: f32,
    /// Samples above this are step-up candidates.
    pub step_up_fps_threshold: f32,
}

/// The pair of FPS thresholds one check is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsThresholds {
    /// Samples below this are step-down candidates.
    pub step_down: f32,
    /// Samples above this are step-up candidates.
    pub step_up: f32,
}

impl From<&PolicyLimits> for FpsThresholds {
    fn from(limits: &PolicyLimits) -> Self {
        Self {
            step_down: limits.step_down_fps_threshold,
            step_up: limits.step_up_fps_threshold,
        }
    }
}

impl TransitionConfig {
    /// The configured thresholds.
    pub fn thresholds(&self) -> FpsThresholds {
        FpsThresholds {
            step_down: self.step_down_fps_threshold,
            step_up: self.step_up_fps_threshold,
        }
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            step_down_duration: Duration::from_millis(2000),
            step_up_duration: Duration::from_millis(3000),
            cooldown_period: Duration::from_millis(5000),
            step_down_fps_threshold: 25.0,
            step_up_fps_threshold: 50.0,
        }
    }
}

/// Direction of a tier change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDirection {
    /// Toward `Low`.
    Down,
    /// Toward `Ultra`.
    Up,
}

/// State owned exclusively by the manager.
#[derive(Debug, Clone, Copy)]
struct TransitionState {
    last_transition_at: Instant,
    has_transitioned: bool,
}

/// Decides, one FPS sample at a time, whether the active tier should move.
#[derive(Debug, Clone)]
pub struct TierTransitionManager {
    config: TransitionConfig,
    state: TransitionState,
    transitions: u64,
}

impl TierTransitionManager {
    /// Creates a manager whose gate clock starts now.
    pub fn new(config: TransitionConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a manager whose gate clock starts at `start`.
    pub fn starting_at(config: TransitionConfig, start: Instant) -> Self {
        Self {
            config,
            state: TransitionState {
                last_transition_at: start,
                has_transitioned: false,
            },
            transitions: 0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    /// Evaluates `fps` against the gate using the current time.
    pub fn check_and_transition(
        &mut self,
        fps: f32,
        current: DeviceTier,
        max_tier: DeviceTier,
    ) -> Option<DeviceTier> {
        self.check_and_transition_at(Instant::now(), fps, current, max_tier)
    }

    /// Evaluates `fps` against the gate at `now`, using the configured
    /// thresholds.
    ///
    /// Returns the new tier when a transition fires, `None` otherwise.
    /// Invalid samples (non-finite or `<= 0`) never fire and never touch the
    /// gate.
    pub fn check_and_transition_at(
        &mut self,
        now: Instant,
        fps: f32,
        current: DeviceTier,
        max_tier: DeviceTier,
    ) -> Option<DeviceTier> {
        let thresholds = self.config.thresholds();
        self.check_with_thresholds_at(now, fps, current, max_tier, thresholds)
    }

    /// Like [`check_and_transition_at`](Self::check_and_transition_at), but
    /// against the thresholds of the active tier's limits.
    pub fn check_with_limits_at(
        &mut self,
        now: Instant,
        fps: f32,
        current: DeviceTier,
        max_tier: DeviceTier,
        limits: &PolicyLimits,
    ) -> Option<DeviceTier> {
        self.check_with_thresholds_at(now, fps, current, max_tier, limits.into())
    }

    fn check_with_thresholds_at(
        &mut self,
        now: Instant,
        fps: f32,
        current: DeviceTier,
        max_tier: DeviceTier,
        thresholds: FpsThresholds,
    ) -> Option<DeviceTier> {
        if !fps.is_finite() || fps <= 0.0 {
            return None;
        }

        let direction = candidate_for(thresholds, fps, current, max_tier)?;
        let elapsed = now.saturating_duration_since(self.state.last_transition_at);
        if elapsed < self.required_wait(direction) {
            return None;
        }

        let stepped = match direction {
            TransitionDirection::Down => current.lower().unwrap_or(DeviceTier::Low),
            TransitionDirection::Up => current.higher().unwrap_or(max_tier),
        };
        let next = stepped.clamp_to(DeviceTier::Low, max_tier);
        if next == current {
            return None;
        }

        self.state.last_transition_at = now;
        self.state.has_transitioned = true;
        self.transitions += 1;
        log::info!(
            "Tier transition {:?}: {} -> {} at {:.1} fps (max {})",
            direction,
            current,
            next,
            fps,
            max_tier
        );
        Some(next)
    }

    /// Which way `fps` pushes `current` under the configured thresholds, if
    /// at all. Step-down wins ties.
    pub fn candidate(
        &self,
        fps: f32,
        current: DeviceTier,
        max_tier: DeviceTier,
    ) -> Option<TransitionDirection> {
        candidate_for(self.config.thresholds(), fps, current, max_tier)
    }

    /// How long the gate must have been closed before a `direction` change.
    pub fn required_wait(&self, direction: TransitionDirection) -> Duration {
        let directional = match direction {
            TransitionDirection::Down => self.config.step_down_duration,
            TransitionDirection::Up => self.config.step_up_duration,
        };
        if self.state.has_transitioned {
            directional.max(self.config.cooldown_period)
        } else {
            directional
        }
    }

    /// Whether any real transition has fired.
    pub fn has_transitioned(&self) -> bool {
        self.state.has_transitioned
    }

    /// Number of transitions fired so far.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Restarts the gate clock at `now`, as if freshly constructed.
    pub fn reset_at(&mut self, now: Instant) {
        self.state = TransitionState {
            last_transition_at: now,
            has_transitioned: false,
        };
    }

    /// Restarts the gate clock now.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    /// Re-arms the gate at `now` after an externally imposed tier change
    /// (manual override, battery cap), so the new tier gets a full cooldown.
    pub fn note_external_transition(&mut self, now: Instant) {
        self.state.last_transition_at = now;
        self.state.has_transitioned = true;
    }
}

fn candidate_for(
    thresholds: FpsThresholds,
    fps: f32,
    current: DeviceTier,
    max_tier: DeviceTier,
) -> Option<TransitionDirection> {
    if fps < thresholds.step_down && current > DeviceTier::Low {
        Some(TransitionDirection::Down)
    } else if fps > thresholds.step_up && current < max_tier {
        Some(TransitionDirection::Up)
    } else {
        None
    }
}

impl Default for TierTransitionManager {
    fn default() -> Self {
        Self::new(TransitionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeviceTier::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn manager() -> (TierTransitionManager, Instant) {
        let t0 = Instant::now();
        (
            TierTransitionManager::starting_at(TransitionConfig::default(), t0),
            t0,
        )
    }

    #[test]
    fn test_first_step_down_waits_for_step_down_duration() {
        let (mut m, t0) = manager();
        for at in [0, 500, 1000, 1999] {
            assert_eq!(m.check_and_transition_at(t0 + ms(at), 20.0, High, Ultra), None);
        }
        assert_eq!(m.check_and_transition_at(t0 + ms(2000), 20.0, High, Ultra), Some(Medium));
        assert!(m.has_transitioned());
    }

    #[test]
    fn test_first_step_up_waits_for_step_up_duration() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(2999), 58.0, Medium, Ultra), None);
        assert_eq!(m.check_and_transition_at(t0 + ms(3000), 58.0, Medium, Ultra), Some(High));
    }

    #[test]
    fn test_step_up_never_exceeds_max_tier() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(10_000), 60.0, High, High), None);
        assert_eq!(m.check_and_transition_at(t0 + ms(10_000), 60.0, Medium, High), Some(High));
        assert_eq!(m.check_and_transition_at(t0 + ms(30_000), 60.0, High, High), None);
    }

    #[test]
    fn test_cooldown_dominates_after_a_transition() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(2000), 20.0, Ultra, Ultra), Some(High));

        // Directional duration alone is satisfied, cooldown is not.
        assert_eq!(m.check_and_transition_at(t0 + ms(4000), 20.0, High, Ultra), None);
        assert_eq!(m.check_and_transition_at(t0 + ms(6999), 20.0, High, Ultra), None);
        assert_eq!(m.check_and_transition_at(t0 + ms(7000), 20.0, High, Ultra), Some(Medium));
    }

    #[test]
    fn test_repeated_samples_within_cooldown_are_idempotent() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(2000), 10.0, High, Ultra), Some(Medium));
        for step in 1..50 {
            let at = t0 + ms(2000 + step * 100);
            assert_eq!(m.check_and_transition_at(at, 10.0, Medium, Ultra), None);
        }
        assert_eq!(m.check_and_transition_at(t0 + ms(7000), 10.0, Medium, Ultra), Some(Low));
    }

    #[test]
    fn test_healthy_sample_does_not_consume_gate() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(1500), 40.0, High, Ultra), None);
        // A single low sample once the gate has expired is enough.
        assert_eq!(m.check_and_transition_at(t0 + ms(2100), 24.0, High, Ultra), Some(Medium));
    }

    #[test]
    fn test_no_step_down_below_low() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(60_000), 5.0, Low, Ultra), None);
        assert!(!m.has_transitioned());
    }

    #[test]
    fn test_invalid_samples_ignored() {
        let (mut m, t0) = manager();
        for fps in [0.0, -3.0, f32::NAN, f32::INFINITY] {
            assert_eq!(m.check_and_transition_at(t0 + ms(60_000), fps, High, Ultra), None);
        }
        assert_eq!(m.transition_count(), 0);
    }

    #[test]
    fn test_step_down_has_priority_when_thresholds_overlap() {
        let t0 = Instant::now();
        let config = TransitionConfig {
            step_down_fps_threshold: 60.0,
            step_up_fps_threshold: 30.0,
            ..Default::default()
        };
        let mut m = TierTransitionManager::starting_at(config, t0);
        assert_eq!(
            m.candidate(45.0, High, Ultra),
            Some(TransitionDirection::Down)
        );
        assert_eq!(m.check_and_transition_at(t0 + ms(5000), 45.0, High, Ultra), Some(Medium));
    }

    #[test]
    fn test_step_down_above_cap_lands_within_range() {
        let (mut m, t0) = manager();
        // Current tier is above a freshly lowered cap.
        assert_eq!(m.check_and_transition_at(t0 + ms(2000), 20.0, Ultra, Medium), Some(Medium));
    }

    #[test]
    fn test_reset_restores_initial_gating() {
        let (mut m, t0) = manager();
        assert_eq!(m.check_and_transition_at(t0 + ms(2000), 20.0, High, Ultra), Some(Medium));
        m.reset_at(t0 + ms(3000));
        assert!(!m.has_transitioned());
        assert_eq!(m.check_and_transition_at(t0 + ms(4999), 20.0, Medium, Ultra), None);
        assert_eq!(m.check_and_transition_at(t0 + ms(5000), 20.0, Medium, Ultra), Some(Low));
    }

    #[test]
    fn test_tier_limits_override_configured_thresholds() {
        let (mut m, t0) = manager();
        let limits = PolicyLimits {
            target_fps: 60.0,
            min_fps: 30.0,
            max_fps: 60.0,
            gpu_budget_ms: 10.0,
            step_down_fps_threshold: 40.0,
            step_up_fps_threshold: 55.0,
        };
        // 35 fps is healthy under the configured 25/50 pair.
        assert_eq!(m.check_and_transition_at(t0 + ms(2000), 35.0, High, Ultra), None);
        assert_eq!(
            m.check_with_limits_at(t0 + ms(2000), 35.0, High, Ultra, &limits),
            Some(Medium)
        );
        // 52 fps is not above this tier's step-up threshold.
        assert_eq!(
            m.check_with_limits_at(t0 + ms(60_000), 52.0, Medium, Ultra, &limits),
            None
        );
    }

    #[test]
    fn test_external_transition_arms_cooldown() {
        let (mut m, t0) = manager();
        m.note_external_transition(t0 + ms(1000));
        assert_eq!(m.check_and_transition_at(t0 + ms(3000), 20.0, High, Ultra), None);
        assert_eq!(m.check_and_transition_at(t0 + ms(6000), 20.0, High, Ultra), Some(Medium));
    }
}
