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

//! Battery-driven tier capping, independent of frame-rate feedback.

use vesper_core::platform::{BatteryHints, BatteryMonitor, BatterySubscription};
use vesper_core::DeviceTier;

/// Below this charge level, unplugged devices are forced to `Low`.
pub const CRITICAL_BATTERY_LEVEL: f32 = 0.20;
/// Below this charge level, unplugged handhelds are capped at `Medium`.
pub const LOW_BATTERY_LEVEL: f32 = 0.50;

/// Outcome of the battery saver decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatterySaverDecision {
    /// Whether battery saving is in force.
    pub enabled: bool,
    /// The tier cap battery saving imposes, if any.
    pub forced_tier: Option<DeviceTier>,
}

impl BatterySaverDecision {
    /// No enforcement.
    pub const DISABLED: BatterySaverDecision = BatterySaverDecision {
        enabled: false,
        forced_tier: None,
    };

    fn forced(tier: DeviceTier) -> Self {
        Self {
            enabled: true,
            forced_tier: Some(tier),
        }
    }

    /// Applies the cap to `ceiling`, returning the lower of the two.
    pub fn cap(&self, ceiling: DeviceTier) -> DeviceTier {
        match self.forced_tier {
            Some(forced) => forced.min(ceiling),
            None => ceiling,
        }
    }
}

/// Evaluates the battery saver table.
///
/// Missing data (`None`, or a non-finite level) never forces degraded
/// quality.
pub fn battery_saver_policy(hints: Option<BatteryHints>, mobile_hint: bool) -> BatterySaverDecision {
    let Some(hints) = hints else {
        return BatterySaverDecision::DISABLED;
    };
    if hints.is_charging || !hints.level.is_finite() {
        return BatterySaverDecision::DISABLED;
    }

    let level = hints.level.clamp(0.0, 1.0);
    if level < CRITICAL_BATTERY_LEVEL {
        BatterySaverDecision::forced(DeviceTier::Low)
    } else if level < LOW_BATTERY_LEVEL && mobile_hint {
        BatterySaverDecision::forced(DeviceTier::Medium)
    } else {
        BatterySaverDecision::DISABLED
    }
}

/// Queries `monitor` once and evaluates the decision table.
pub async fn get_battery_saver_policy(
    monitor: &dyn BatteryMonitor,
    mobile_hint: bool,
) -> BatterySaverDecision {
    battery_saver_policy(monitor.query().await, mobile_hint)
}

/// Long-lived battery saver: one startup query, then change events.
///
/// The subscription is drained from the render loop with
/// [`poll_events`](Self::poll_events); the platform itself is never polled.
#[derive(Debug)]
pub struct BatterySaver {
    mobile_hint: bool,
    hints: Option<BatteryHints>,
    decision: BatterySaverDecision,
    subscription: Option<BatterySubscription>,
}

impl BatterySaver {
    /// Subscribes to changes, then runs the startup query.
    ///
    /// Events published while the query is pending are queued on the
    /// subscription and applied by the first [`poll_events`](Self::poll_events).
    pub async fn start(monitor: &dyn BatteryMonitor, mobile_hint: bool) -> Self {
        let subscription = monitor.subscribe();
        let hints = monitor.query().await;
        if hints.is_none() {
            log::info!("Battery API unavailable; battery saver disabled.");
        }
        let decision = battery_saver_policy(hints, mobile_hint);
        if decision.enabled {
            log::info!(
                "Battery saver active at startup (level {:.0}%): cap {:?}",
                hints.map(|h| h.level * 100.0).unwrap_or(0.0),
                decision.forced_tier
            );
        }
        Self {
            mobile_hint,
            hints,
            decision,
            subscription,
        }
    }

    /// A saver for hosts without a battery API.
    pub fn disabled() -> Self {
        Self {
            mobile_hint: false,
            hints: None,
            decision: BatterySaverDecision::DISABLED,
            subscription: None,
        }
    }

    /// Applies any pending change events. Returns the new decision if it changed.
    pub fn poll_events(&mut self) -> Option<BatterySaverDecision> {
        let latest = self.subscription.as_ref()?.latest()?;
        self.update(latest)
    }

    /// Applies a battery sample directly. Returns the new decision if it changed.
    pub fn update(&mut self, hints: BatteryHints) -> Option<BatterySaverDecision> {
        self.hints = Some(hints);
        let decision = battery_saver_policy(Some(hints), self.mobile_hint);
        if decision == self.decision {
            return None;
        }
        log::info!(
            "Battery saver changed: enabled={} cap={:?} (level {:.0}%, charging={})",
            decision.enabled,
            decision.forced_tier,
            hints.level * 100.0,
            hints.is_charging
        );
        self.decision = decision;
        Some(decision)
    }

    /// The current decision.
    pub fn decision(&self) -> BatterySaverDecision {
        self.decision
    }

    /// The last battery sample, if any.
    pub fn hints(&self) -> Option<BatteryHints> {
        self.hints
    }

    /// Unregisters the change subscription.
    pub fn shutdown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            log::debug!("Battery saver subscription released.");
        }
    }
}

impl Drop for BatterySaver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vesper_core::platform::ChannelBatteryMonitor;

    /// Publishes `change` as soon as its query has read the current state.
    struct ChangeDuringQuery {
        inner: ChannelBatteryMonitor,
        change: BatteryHints,
    }

    #[async_trait]
    impl BatteryMonitor for ChangeDuringQuery {
        async fn query(&self) -> Option<BatteryHints> {
            let current = self.inner.query().await;
            self.inner.publish(self.change);
            current
        }

        fn subscribe(&self) -> Option<BatterySubscription> {
            self.inner.subscribe()
        }
    }

    fn hints(level: f32, is_charging: bool) -> Option<BatteryHints> {
        Some(BatteryHints { level, is_charging })
    }

    #[test]
    fn test_critical_level_forces_low() {
        let decision = battery_saver_policy(hints(0.19, false), true);
        assert_eq!(
            decision,
            BatterySaverDecision {
                enabled: true,
                forced_tier: Some(DeviceTier::Low)
            }
        );
        assert_eq!(battery_saver_policy(hints(0.05, false), false).forced_tier, Some(DeviceTier::Low));
    }

    #[test]
    fn test_charging_never_enforces() {
        assert_eq!(
            battery_saver_policy(hints(0.1, true), true),
            BatterySaverDecision::DISABLED
        );
    }

    #[test]
    fn test_mid_level_only_caps_mobile() {
        assert_eq!(
            battery_saver_policy(hints(0.35, false), true).forced_tier,
            Some(DeviceTier::Medium)
        );
        assert_eq!(
            battery_saver_policy(hints(0.35, false), false),
            BatterySaverDecision::DISABLED
        );
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(
            battery_saver_policy(hints(0.20, false), true).forced_tier,
            Some(DeviceTier::Medium)
        );
        assert_eq!(
            battery_saver_policy(hints(0.50, false), true),
            BatterySaverDecision::DISABLED
        );
    }

    #[test]
    fn test_missing_data_disables() {
        assert_eq!(battery_saver_policy(None, true), BatterySaverDecision::DISABLED);
        assert_eq!(
            battery_saver_policy(hints(f32::NAN, false), true),
            BatterySaverDecision::DISABLED
        );
    }

    #[test]
    fn test_decision_caps_ceiling() {
        let forced = battery_saver_policy(hints(0.3, false), true);
        assert_eq!(forced.cap(DeviceTier::Ultra), DeviceTier::Medium);
        assert_eq!(forced.cap(DeviceTier::Low), DeviceTier::Low);
        assert_eq!(BatterySaverDecision::DISABLED.cap(DeviceTier::High), DeviceTier::High);
    }

    #[tokio::test]
    async fn test_query_against_unavailable_monitor() {
        let monitor = ChannelBatteryMonitor::unavailable();
        let decision = get_battery_saver_policy(&monitor, true).await;
        assert_eq!(decision, BatterySaverDecision::DISABLED);
    }

    #[tokio::test]
    async fn test_change_during_startup_query_is_not_lost() {
        let monitor = ChangeDuringQuery {
            inner: ChannelBatteryMonitor::new(BatteryHints {
                level: 0.9,
                is_charging: false,
            }),
            change: BatteryHints {
                level: 0.05,
                is_charging: false,
            },
        };
        let mut saver = BatterySaver::start(&monitor, false).await;
        assert_eq!(saver.decision(), BatterySaverDecision::DISABLED);

        let decision = saver.poll_events();
        assert_eq!(decision.and_then(|d| d.forced_tier), Some(DeviceTier::Low));
        assert_eq!(saver.decision().forced_tier, Some(DeviceTier::Low));
    }

    #[tokio::test]
    async fn test_saver_follows_change_events_and_unsubscribes() {
        let monitor = ChannelBatteryMonitor::new(BatteryHints {
            level: 0.9,
            is_charging: false,
        });
        let mut saver = BatterySaver::start(&monitor, true).await;
        assert!(!saver.decision().enabled);
        assert_eq!(monitor.subscriber_count(), 1);
        assert_eq!(saver.poll_events(), None);

        monitor.publish(BatteryHints {
            level: 0.15,
            is_charging: false,
        });
        let changed = saver.poll_events().expect("decision should change");
        assert_eq!(changed.forced_tier, Some(DeviceTier::Low));

        // Same decision again: no change reported.
        monitor.publish(BatteryHints {
            level: 0.12,
            is_charging: false,
        });
        assert_eq!(saver.poll_events(), None);

        monitor.publish(BatteryHints {
            level: 0.12,
            is_charging: true,
        });
        assert_eq!(saver.poll_events(), Some(BatterySaverDecision::DISABLED));

        saver.shutdown();
        assert_eq!(monitor.subscriber_count(), 0);
    }
}
