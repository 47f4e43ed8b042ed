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

//! Battery status source and change subscriptions.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// A battery status sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryHints {
    /// Charge level in `0.0..=1.0`.
    pub level: f32,
    /// Whether the device is connected to power.
    pub is_charging: bool,
}

/// A source of battery status.
///
/// Implementations live with the host. The initial query may suspend; after
/// that, changes arrive through a [`BatterySubscription`] and are never polled.
#[async_trait]
pub trait BatteryMonitor: Send + Sync {
    /// Queries the current battery status.
    ///
    /// Returns `None` when the platform has no battery API. That is a valid,
    /// non-error state.
    async fn query(&self) -> Option<BatteryHints>;

    /// Registers for change events. `None` when the platform cannot notify.
    fn subscribe(&self) -> Option<BatterySubscription>;
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// A live registration for battery change events.
///
/// Dropping the subscription unregisters it from the source.
pub struct BatterySubscription {
    receiver: flume::Receiver<BatteryHints>,
    cancel: Option<CancelFn>,
}

impl std::fmt::Debug for BatterySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatterySubscription")
            .field("pending", &self.receiver.len())
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl BatterySubscription {
    /// Wraps a receiver and the closure that unregisters it.
    pub fn new(
        receiver: flume::Receiver<BatteryHints>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Drains pending events without blocking and returns the newest one.
    pub fn latest(&self) -> Option<BatteryHints> {
        self.receiver.try_iter().last()
    }

    /// Unregisters from the source. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for BatterySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[derive(Default)]
struct ChannelInner {
    current: Option<BatteryHints>,
    subscribers: Vec<(u64, flume::Sender<BatteryHints>)>,
    next_id: u64,
}

/// A [`BatteryMonitor`] fed by the host through [`publish`](Self::publish).
///
/// This is the bridge between a platform callback (battery `levelchange` /
/// `chargingchange` events, an OS power notification, ...) and the governor.
#[derive(Clone)]
pub struct ChannelBatteryMonitor {
    inner: Arc<Mutex<ChannelInner>>,
    available: bool,
}

impl ChannelBatteryMonitor {
    /// A monitor with a battery API, reporting `initial` until the next publish.
    pub fn new(initial: BatteryHints) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                current: Some(initial),
                ..Default::default()
            })),
            available: true,
        }
    }

    /// A monitor for a platform without a battery API.
    pub fn unavailable() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner::default())),
            available: false,
        }
    }

    /// Records a new status and notifies every subscriber.
    pub fn publish(&self, hints: BatteryHints) {
        if !self.available {
            log::trace!("Battery publish ignored: monitor marked unavailable.");
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.current = Some(hints);
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(hints).is_ok());
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

#[async_trait]
impl BatteryMonitor for ChannelBatteryMonitor {
    async fn query(&self) -> Option<BatteryHints> {
        if !self.available {
            return None;
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    fn subscribe(&self) -> Option<BatterySubscription> {
        if !self.available {
            return None;
        }
        let (tx, rx) = flume::unbounded();
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, tx));
            id
        };
        let inner = Arc::clone(&self.inner);
        Some(BatterySubscription::new(rx, move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.subscribers.retain(|(sid, _)| *sid != id);
            log::debug!("Battery subscription {} unregistered.", id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(level: f32, is_charging: bool) -> BatteryHints {
        BatteryHints { level, is_charging }
    }

    #[tokio::test]
    async fn test_query_returns_initial_then_published() {
        let monitor = ChannelBatteryMonitor::new(hints(0.8, false));
        assert_eq!(monitor.query().await, Some(hints(0.8, false)));

        monitor.publish(hints(0.3, true));
        assert_eq!(monitor.query().await, Some(hints(0.3, true)));
    }

    #[tokio::test]
    async fn test_unavailable_monitor_reports_nothing() {
        let monitor = ChannelBatteryMonitor::unavailable();
        assert_eq!(monitor.query().await, None);
        assert!(monitor.subscribe().is_none());
    }

    #[test]
    fn test_subscription_receives_latest_event() {
        let monitor = ChannelBatteryMonitor::new(hints(0.9, true));
        let sub = monitor.subscribe().expect("subscription");

        assert_eq!(sub.latest(), None);
        monitor.publish(hints(0.6, false));
        monitor.publish(hints(0.4, false));
        assert_eq!(sub.latest(), Some(hints(0.4, false)));
        assert_eq!(sub.latest(), None);
    }

    #[test]
    fn test_drop_unregisters_subscription() {
        let monitor = ChannelBatteryMonitor::new(hints(0.9, true));
        let mut first = monitor.subscribe().expect("subscription");
        let second = monitor.subscribe().expect("subscription");
        assert_eq!(monitor.subscriber_count(), 2);

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(monitor.subscriber_count(), 1);

        drop(second);
        assert_eq!(monitor.subscriber_count(), 0);
    }
}
