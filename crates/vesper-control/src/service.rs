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

//! The visual policy manager: the per-frame driver of the governor.

use crate::battery::{BatterySaver, BatterySaverDecision};
use crate::canvas::{apply_dpr_to_canvas, get_clamped_dpr, get_mobile_canvas_cap};
use crate::capability::{suggest_initial_tier, tier_ceiling};
use crate::command::PolicyCommand;
use crate::config::GovernorConfig;
use crate::layers::{resolve_layers, EffectPolicy};
use crate::overrides::{ManualOverrides, OverrideStore};
use crate::performance::PerformanceMonitor;
use crate::policy_table::PolicyTable;
use crate::transition::TierTransitionManager;
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use vesper_core::platform::{CapabilityHints, DisplayInfo, SurfaceCanvas};
use vesper_core::storage::KeyValueStore;
use vesper_core::{
    ConfigError, DeviceTier, EffectName, EffectToggles, EffectUpdate, LayerConfig, TierPolicy,
};

/// An immutable view of the governor's decisions, published once per change.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySnapshot {
    /// The active tier.
    pub tier: DeviceTier,
    /// The highest tier currently reachable (capability ceiling capped by the
    /// battery saver).
    pub max_tier: DeviceTier,
    /// The active tier's policy.
    pub policy: TierPolicy,
    /// Effect flags delivered to the effect renderers.
    pub effects: EffectToggles,
    /// Resolved layers, in fixed order.
    pub layers: Vec<LayerConfig>,
    /// Last FPS estimate.
    pub fps: f32,
    /// Battery saver state.
    pub battery: BatterySaverDecision,
    /// The pinned tier, if the user chose one.
    pub manual_tier: Option<DeviceTier>,
    /// Incremented on every publish.
    pub revision: u64,
}

/// A cloneable read handle on the latest [`PolicySnapshot`].
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    current: Arc<RwLock<Arc<PolicySnapshot>>>,
}

impl PolicyHandle {
    fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// The latest published snapshot.
    pub fn load(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn store(&self, snapshot: Arc<PolicySnapshot>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

type EffectListener = Box<dyn FnMut(EffectUpdate) + Send>;

/// Composes the profiler, battery saver, monitor, state machine, and layer
/// coordinator into one explicitly owned governor.
///
/// The render loop calls [`on_frame`](Self::on_frame) once per frame. Each
/// call applies queued commands, then battery events, then ticks the monitor,
/// runs the tier state machine, resolves layers and the thin-film gate, and
/// finally publishes a new snapshot if anything changed. Other threads read
/// through a [`PolicyHandle`] and send [`PolicyCommand`]s through
/// [`command_sender`](Self::command_sender).
///
/// Step thresholds come from the active tier's [`TierPolicy`] limits. Use
/// [`GovernorConfig::builtin_table`] to get the built-in table with the
/// configured thresholds.
pub struct VisualPolicyManager {
    config: GovernorConfig,
    table: PolicyTable,
    capabilities: CapabilityHints,
    capability_ceiling: DeviceTier,
    battery: BatterySaver,
    override_store: Option<OverrideStore>,
    overrides: ManualOverrides,
    monitor: PerformanceMonitor,
    transitions: TierTransitionManager,
    effect_policy: EffectPolicy,
    tier: DeviceTier,
    max_tier: DeviceTier,
    effects: EffectToggles,
    visible: bool,
    dirty: bool,
    revision: u64,
    command_tx: Sender<PolicyCommand>,
    command_rx: Receiver<PolicyCommand>,
    handle: PolicyHandle,
    effect_listener: Option<EffectListener>,
}

impl VisualPolicyManager {
    /// Builds a manager whose clocks start now.
    pub fn new(
        config: GovernorConfig,
        table: PolicyTable,
        capabilities: CapabilityHints,
        battery: BatterySaver,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self, ConfigError> {
        Self::starting_at(config, table, capabilities, battery, store, Instant::now())
    }

    /// Builds a manager whose clocks start at `start`.
    ///
    /// The initial tier is the capability suggestion, or the persisted manual
    /// tier, clamped to the capability ceiling and the battery cap.
    pub fn starting_at(
        config: GovernorConfig,
        table: PolicyTable,
        capabilities: CapabilityHints,
        battery: BatterySaver,
        store: Option<Arc<dyn KeyValueStore>>,
        start: Instant,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let override_store = store.map(OverrideStore::new);
        let overrides = override_store
            .as_ref()
            .map(OverrideStore::load)
            .unwrap_or_default();

        let capability_ceiling = tier_ceiling(&capabilities);
        let max_tier = battery.decision().cap(capability_ceiling);
        let tier = overrides
            .tier
            .unwrap_or_else(|| suggest_initial_tier(&capabilities))
            .clamp_to(DeviceTier::Low, max_tier);
        let effects = derive_effects(table.get(tier), &overrides);

        let (command_tx, command_rx) = crossbeam_channel::bounded(config.command_buffer_size);
        let monitor = PerformanceMonitor::starting_at(config.monitor(), start);
        let transitions = TierTransitionManager::starting_at(config.transition(), start);
        let effect_policy = config.effect_policy();

        log::info!(
            "VisualPolicyManager: starting at {} (ceiling {}, battery cap {:?}, manual {:?})",
            tier,
            capability_ceiling,
            battery.decision().forced_tier,
            overrides.tier
        );

        let policy = table.get(tier).clone();
        let handle = PolicyHandle::new(PolicySnapshot {
            tier,
            max_tier,
            layers: resolve_layers(&policy, &effects),
            policy,
            effects,
            fps: monitor.fps(),
            battery: battery.decision(),
            manual_tier: overrides.tier,
            revision: 0,
        });

        Ok(Self {
            config,
            table,
            capabilities,
            capability_ceiling,
            battery,
            override_store,
            overrides,
            monitor,
            transitions,
            effect_policy,
            tier,
            max_tier,
            effects,
            visible: true,
            dirty: false,
            revision: 0,
            command_tx,
            command_rx,
            handle,
            effect_listener: None,
        })
    }

    /// Registers a callback that receives every effect flag change.
    pub fn set_effect_listener(&mut self, listener: impl FnMut(EffectUpdate) + Send + 'static) {
        self.effect_listener = Some(Box::new(listener));
    }

    /// A sender for [`PolicyCommand`]s. Commands are applied on the next frame.
    pub fn command_sender(&self) -> Sender<PolicyCommand> {
        self.command_tx.clone()
    }

    /// A read handle on published snapshots.
    pub fn handle(&self) -> PolicyHandle {
        self.handle.clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.handle.load()
    }

    /// Runs one frame using the current time.
    pub fn on_frame(&mut self) -> Option<Arc<PolicySnapshot>> {
        self.on_frame_at(Instant::now())
    }

    /// Runs one frame observed at `now`. Returns the snapshot if one was
    /// published.
    pub fn on_frame_at(&mut self, now: Instant) -> Option<Arc<PolicySnapshot>> {
        while let Ok(command) = self.command_rx.try_recv() {
            self.apply_command_at(command, now);
        }

        if let Some(decision) = self.battery.poll_events() {
            self.apply_battery_decision(decision, now);
        }

        if self.visible {
            if let Some(fps) = self.monitor.tick_at(now) {
                self.on_window_closed(fps, now);
            }
        }

        self.publish_if_dirty()
    }

    fn on_window_closed(&mut self, fps: f32, now: Instant) {
        self.dirty = true;

        // A pinned tier suspends the automatic state machine.
        if self.overrides.tier.is_none() {
            let limits = self.table.get(self.tier).limits;
            if let Some(next) =
                self.transitions
                    .check_with_limits_at(now, fps, self.tier, self.max_tier, &limits)
            {
                self.change_tier(next);
            }
        }

        let mut tripped = None;
        self.effect_policy
            .enforce_thin_film_gate(fps, &self.effects, |update| tripped = Some(update));
        if let Some(update) = tripped {
            self.apply_effect_update(update);
        }
    }

    /// Applies one command immediately, as the render loop would.
    pub fn apply_command_at(&mut self, command: PolicyCommand, now: Instant) {
        match command {
            PolicyCommand::SetTierOverride(Some(pinned)) => {
                self.overrides.tier = Some(pinned);
                self.persist(|store| store.save_tier(Some(pinned)));
                let target = pinned.clamp_to(DeviceTier::Low, self.max_tier);
                if target != pinned {
                    log::info!(
                        "Manual tier {} exceeds the current ceiling; running at {}.",
                        pinned,
                        target
                    );
                } else {
                    log::info!("Manual tier override: {}", pinned);
                }
                if target != self.tier {
                    self.change_tier(target);
                }
                self.transitions.note_external_transition(now);
                self.dirty = true;
            }
            PolicyCommand::SetTierOverride(None) => {
                if self.overrides.tier.take().is_some() {
                    log::info!("Manual tier override released at {}.", self.tier);
                    self.persist(|store| store.save_tier(None));
                    self.transitions.note_external_transition(now);
                    self.dirty = true;
                }
            }
            PolicyCommand::SetEffect { effect, enabled } => {
                self.overrides.effects.insert(effect, enabled);
                self.persist(|store| store.save_effect(effect, enabled));
                log::info!("Manual effect override: {} = {}", effect, enabled);
                self.apply_effect_update(EffectUpdate::single(effect, enabled));
            }
            PolicyCommand::ClearOverrides => {
                self.overrides = ManualOverrides::default();
                self.persist(OverrideStore::clear);
                log::info!("Manual overrides cleared.");
                let effects = derive_effects(self.table.get(self.tier), &self.overrides);
                self.replace_effects(effects);
                self.transitions.note_external_transition(now);
                self.dirty = true;
            }
            PolicyCommand::VisibilityChanged(visible) => {
                if visible == self.visible {
                    return;
                }
                self.visible = visible;
                if visible {
                    log::debug!("Surface visible again; re-arming monitor and gate.");
                    self.reset_at(now);
                } else {
                    log::debug!("Surface hidden; frame accounting paused.");
                }
            }
        }
    }

    /// Re-arms the FPS window and the transition gate at `now`.
    pub fn reset_at(&mut self, now: Instant) {
        self.monitor.reset_at(now);
        self.transitions.reset_at(now);
    }

    fn apply_battery_decision(&mut self, decision: BatterySaverDecision, now: Instant) {
        self.dirty = true;
        self.max_tier = decision.cap(self.capability_ceiling);

        // Auto mode only clamps down; a pinned tier is restored when the cap lifts.
        let target = match self.overrides.tier {
            Some(pinned) => pinned.clamp_to(DeviceTier::Low, self.max_tier),
            None => self.tier.min(self.max_tier),
        };
        if target != self.tier {
            log::info!(
                "Battery saver moves tier {} -> {} (max {})",
                self.tier,
                target,
                self.max_tier
            );
            self.change_tier(target);
            self.transitions.note_external_transition(now);
        }
    }

    fn change_tier(&mut self, tier: DeviceTier) {
        self.tier = tier;
        let effects = derive_effects(self.table.get(tier), &self.overrides);
        self.replace_effects(effects);
        self.dirty = true;
    }

    fn replace_effects(&mut self, effects: EffectToggles) {
        let mut update = EffectUpdate::default();
        for effect in EffectName::ALL {
            let enabled = effects.get(effect);
            if enabled != self.effects.get(effect) {
                update = merge(update, EffectUpdate::single(effect, enabled));
            }
        }
        self.effects = effects;
        self.notify(update);
    }

    fn apply_effect_update(&mut self, update: EffectUpdate) {
        self.effects.apply(&update);
        self.dirty = true;
        self.notify(update);
    }

    fn notify(&mut self, update: EffectUpdate) {
        if update.is_empty() {
            return;
        }
        if let Some(listener) = self.effect_listener.as_mut() {
            listener(update);
        }
    }

    fn persist(&self, write: impl FnOnce(&OverrideStore)) {
        if let Some(store) = &self.override_store {
            write(store);
        }
    }

    fn build_snapshot(&self) -> PolicySnapshot {
        let policy = self.table.get(self.tier).clone();
        PolicySnapshot {
            tier: self.tier,
            max_tier: self.max_tier,
            layers: resolve_layers(&policy, &self.effects),
            policy,
            effects: self.effects,
            fps: self.monitor.fps(),
            battery: self.battery.decision(),
            manual_tier: self.overrides.tier,
            revision: self.revision,
        }
    }

    fn publish_if_dirty(&mut self) -> Option<Arc<PolicySnapshot>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.revision += 1;
        let snapshot = Arc::new(self.build_snapshot());
        self.handle.store(Arc::clone(&snapshot));
        log::trace!(
            "Published policy revision {} ({} at {:.1} fps)",
            snapshot.revision,
            snapshot.tier,
            snapshot.fps
        );
        Some(snapshot)
    }

    /// The DPR to render at for a `width × height` surface: the platform
    /// ceiling, then the active tier's pixel budget on handhelds.
    pub fn canvas_dpr(&self, display: &DisplayInfo, width: u32, height: u32) -> f32 {
        let dpr = get_clamped_dpr(display, &self.config.canvas);
        if display.is_mobile_ua {
            get_mobile_canvas_cap(width, height, dpr, self.tier, &self.config.canvas)
        } else {
            dpr
        }
    }

    /// Resizes `canvas` for the active tier. Call whenever the surface is
    /// (re)sized or the tier changes.
    pub fn resize_canvas<C: SurfaceCanvas + ?Sized>(
        &self,
        canvas: &mut C,
        display: &DisplayInfo,
    ) -> (u32, u32) {
        let dpr = self.canvas_dpr(display, canvas.client_width(), canvas.client_height());
        apply_dpr_to_canvas(canvas, dpr)
    }

    /// The active tier.
    pub fn tier(&self) -> DeviceTier {
        self.tier
    }

    /// The highest reachable tier.
    pub fn max_tier(&self) -> DeviceTier {
        self.max_tier
    }

    /// Current effect flags.
    pub fn effects(&self) -> EffectToggles {
        self.effects
    }

    /// Current manual overrides.
    pub fn overrides(&self) -> &ManualOverrides {
        &self.overrides
    }

    /// The device classification captured at startup.
    pub fn capabilities(&self) -> CapabilityHints {
        self.capabilities
    }

    /// The active configuration.
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// The policy table in use.
    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    /// Releases the battery subscription. The manager keeps working with the
    /// last battery decision.
    pub fn shutdown(&mut self) {
        self.battery.shutdown();
        log::info!("VisualPolicyManager shut down.");
    }
}

fn derive_effects(policy: &TierPolicy, overrides: &ManualOverrides) -> EffectToggles {
    let mut effects = EffectToggles::for_policy(policy);
    overrides.apply_effects(&mut effects);
    effects
}

fn merge(a: EffectUpdate, b: EffectUpdate) -> EffectUpdate {
    EffectUpdate {
        fluid_enabled: b.fluid_enabled.or(a.fluid_enabled),
        thin_film_enabled: b.thin_film_enabled.or(a.thin_film_enabled),
        particles_enabled: b.particles_enabled.or(a.particles_enabled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use vesper_core::storage::MemoryStore;
    use vesper_core::LayerName;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn desktop() -> CapabilityHints {
        CapabilityHints {
            save_data_hint: false,
            device_memory_mb: Some(8192),
            is_mobile_ua: false,
        }
    }

    fn manager_at(start: Instant, store: Option<Arc<dyn KeyValueStore>>) -> VisualPolicyManager {
        VisualPolicyManager::starting_at(
            GovernorConfig::default(),
            PolicyTable::builtin(),
            desktop(),
            BatterySaver::disabled(),
            store,
            start,
        )
        .unwrap()
    }

    /// Renders frames at a steady `fps` from `from` for `span`. Returns the end time.
    fn render(manager: &mut VisualPolicyManager, from: Instant, fps: u64, span: Duration) -> Instant {
        let step = ms(1000 / fps);
        let mut now = from;
        while now < from + span {
            now += step;
            manager.on_frame_at(now);
        }
        now
    }

    #[test]
    fn test_initial_state_comes_from_capabilities() {
        let manager = manager_at(Instant::now(), None);
        assert_eq!(manager.tier(), DeviceTier::High);
        assert_eq!(manager.max_tier(), DeviceTier::Ultra);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.revision, 0);
        assert_eq!(snapshot.policy.tier, DeviceTier::High);
        assert!(snapshot.effects.particles_enabled);
        assert!(!snapshot.effects.thin_film_enabled);
    }

    #[test]
    fn test_sustained_low_fps_steps_down() {
        let t0 = Instant::now();
        let mut manager = manager_at(t0, None);

        // First window closes at 1 s, before the 2 s step-down wait.
        let t1 = render(&mut manager, t0, 20, ms(1000));
        assert_eq!(manager.tier(), DeviceTier::High);

        render(&mut manager, t1, 20, ms(1000));
        assert_eq!(manager.tier(), DeviceTier::Medium);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.tier, DeviceTier::Medium);
        assert!(!snapshot.effects.particles_enabled);
        assert!(snapshot.revision >= 2);
    }

    #[test]
    fn test_handle_sees_published_snapshots() {
        let t0 = Instant::now();
        let mut manager = manager_at(t0, None);
        let handle = manager.handle();
        let reader = std::thread::spawn(move || handle.load().tier);
        assert_eq!(reader.join().unwrap(), DeviceTier::High);

        let handle = manager.handle();
        render(&mut manager, t0, 20, ms(2000));
        assert_eq!(handle.load().tier, DeviceTier::Medium);
    }

    #[test]
    fn test_custom_table_thresholds_drive_transitions() {
        let t0 = Instant::now();
        let mut policies: Vec<TierPolicy> = PolicyTable::builtin().iter().cloned().collect();
        for policy in &mut policies {
            policy.limits.step_down_fps_threshold = 40.0;
        }
        let table = PolicyTable::from_policies(policies).unwrap();
        let mut manager = VisualPolicyManager::starting_at(
            GovernorConfig::default(),
            table,
            desktop(),
            BatterySaver::disabled(),
            None,
            t0,
        )
        .unwrap();

        // 35 fps clears the configured 25 fps threshold but not the table's 40.
        render(&mut manager, t0, 35, ms(10_000));
        assert!(manager.tier() < DeviceTier::High, "got {}", manager.tier());
    }

    #[test]
    fn test_manual_tier_suspends_state_machine() {
        let t0 = Instant::now();
        let mut manager = manager_at(t0, None);
        manager
            .command_sender()
            .send(PolicyCommand::SetTierOverride(Some(DeviceTier::Ultra)))
            .unwrap();

        let t1 = render(&mut manager, t0, 20, ms(10_000));
        assert_eq!(manager.tier(), DeviceTier::Ultra);
        assert_eq!(manager.snapshot().manual_tier, Some(DeviceTier::Ultra));

        // Released: the automatic gate resumes after a full cooldown.
        manager.apply_command_at(PolicyCommand::SetTierOverride(None), t1);
        let t2 = render(&mut manager, t1, 20, ms(4000));
        assert_eq!(manager.tier(), DeviceTier::Ultra);
        render(&mut manager, t2, 20, ms(2000));
        assert_eq!(manager.tier(), DeviceTier::High);
    }

    #[test]
    fn test_thin_film_gate_trips_once_and_notifies() {
        let t0 = Instant::now();
        let mut manager = manager_at(t0, None);
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        manager.set_effect_listener(move |update| sink.lock().unwrap().push(update));

        manager.apply_command_at(PolicyCommand::SetTierOverride(Some(DeviceTier::Ultra)), t0);
        assert!(manager.effects().thin_film_enabled);

        render(&mut manager, t0, 40, ms(3000));
        assert!(!manager.effects().thin_film_enabled);
        let thin_film = manager
            .snapshot()
            .layers
            .iter()
            .find(|l| l.name == LayerName::ThinFilm)
            .map(|l| l.enabled);
        assert_eq!(thin_film, Some(false));

        let updates = updates.lock().unwrap();
        let trips = updates
            .iter()
            .filter(|u| u.thin_film_enabled == Some(false))
            .count();
        assert_eq!(trips, 1);
    }

    #[test]
    fn test_overrides_are_persisted_and_restored() {
        let backing = Arc::new(MemoryStore::new());
        let store: Arc<dyn KeyValueStore> = backing.clone();
        let t0 = Instant::now();
        {
            let mut manager = manager_at(t0, Some(Arc::clone(&store)));
            let tx = manager.command_sender();
            tx.send(PolicyCommand::SetTierOverride(Some(DeviceTier::Medium)))
                .unwrap();
            tx.send(PolicyCommand::SetEffect {
                effect: EffectName::Fluid,
                enabled: false,
            })
            .unwrap();
            manager.on_frame_at(t0 + ms(16));
            assert_eq!(manager.tier(), DeviceTier::Medium);
            assert!(!manager.effects().fluid_enabled);
        }

        let restored = manager_at(t0, Some(store));
        assert_eq!(restored.tier(), DeviceTier::Medium);
        assert!(!restored.effects().fluid_enabled);
        assert_eq!(restored.overrides().tier, Some(DeviceTier::Medium));

        let mut restored = restored;
        restored.apply_command_at(PolicyCommand::ClearOverrides, t0);
        assert!(backing.is_empty());
        assert!(restored.effects().fluid_enabled);
    }

    #[test]
    fn test_hidden_surface_does_not_count_frames() {
        let t0 = Instant::now();
        let mut manager = manager_at(t0, None);
        manager.apply_command_at(PolicyCommand::VisibilityChanged(false), t0);
        render(&mut manager, t0, 10, ms(5000));
        assert_eq!(manager.tier(), DeviceTier::High);

        let t1 = t0 + ms(60_000);
        manager.apply_command_at(PolicyCommand::VisibilityChanged(true), t1);
        // Gate re-armed at t1: one slow window is not enough.
        render(&mut manager, t1, 20, ms(1000));
        assert_eq!(manager.tier(), DeviceTier::High);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = GovernorConfig {
            fps_window_ms: 0,
            ..Default::default()
        };
        let result = VisualPolicyManager::new(
            config,
            PolicyTable::builtin(),
            desktop(),
            BatterySaver::disabled(),
            None,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "fps_window_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_canvas_dpr_applies_budget_on_handhelds_only() {
        let manager = manager_at(Instant::now(), None);
        let desktop_display = DisplayInfo {
            native_dpr: 3.0,
            is_mobile_ua: false,
        };
        assert_eq!(manager.canvas_dpr(&desktop_display, 1920, 1080), 2.0);

        let phone = DisplayInfo {
            native_dpr: 3.0,
            is_mobile_ua: true,
        };
        let dpr = manager.canvas_dpr(&phone, 1920, 1080);
        assert!((1.0..1.5).contains(&dpr), "got {dpr}");
    }
}
