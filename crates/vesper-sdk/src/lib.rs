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

//! The public-facing entry point for hosts embedding the Vesper governor.
//!
//! A host describes its device with [`HostSignals`], optionally supplies a
//! battery source, a preference store, and configuration files, and gets back
//! a ready [`VisualPolicyManager`] to drive from its render loop.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use vesper_control::capability::profile_capabilities;
use vesper_control::{BatterySaver, GovernorConfig, PolicyTable, VisualPolicyManager};
use vesper_core::platform::{BatteryMonitor, HostSignals};
use vesper_core::storage::{FileStore, KeyValueStore, WriteBehindStore};

pub mod registry;

pub mod prelude {
    //! The types a host usually needs.
    pub use vesper_control::{
        GovernorConfig, PolicyCommand, PolicyHandle, PolicySnapshot, PolicyTable,
        VisualPolicyManager,
    };
    pub use vesper_core::platform::{
        BatteryHints, BatteryMonitor, ChannelBatteryMonitor, DisplayInfo, HostSignals,
        SurfaceCanvas,
    };
    pub use vesper_core::{DeviceTier, EffectName, EffectToggles, EffectUpdate, LayerName};
}

/// Initialises `env_logger`, honouring `RUST_LOG` and falling back to
/// `default_filter`.
///
/// Returns `false` if a logger was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(default_filter))
        .try_init()
        .is_ok()
}

/// Assembles a [`VisualPolicyManager`] from host inputs.
pub struct GovernorBuilder {
    signals: HostSignals,
    config: Option<GovernorConfig>,
    config_path: Option<PathBuf>,
    table: Option<PolicyTable>,
    table_path: Option<PathBuf>,
    battery: Option<Arc<dyn BatteryMonitor>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl GovernorBuilder {
    /// Starts a builder for a host described by `signals`.
    pub fn new(signals: HostSignals) -> Self {
        Self {
            signals,
            config: None,
            config_path: None,
            table: None,
            table_path: None,
            battery: None,
            store: None,
        }
    }

    /// Uses `config` instead of the defaults.
    pub fn config(mut self, config: GovernorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads the configuration from a JSON file at build time.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Uses `table` instead of the built-in policy table.
    pub fn policy_table(mut self, table: PolicyTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Loads the policy table from a JSON file at build time.
    pub fn policy_table_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.table_path = Some(path.into());
        self
    }

    /// Enables the battery saver with `monitor` as its source.
    pub fn battery_monitor(mut self, monitor: Arc<dyn BatteryMonitor>) -> Self {
        self.battery = Some(monitor);
        self
    }

    /// Persists manual overrides in `store`. Its writes run on the render
    /// loop; see [`WriteBehindStore`] for stores backed by slow I/O.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persists manual overrides in a JSON file, written off the render loop.
    pub fn preferences_file(self, path: impl Into<PathBuf>) -> Self {
        let file: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(path));
        self.store(Arc::new(WriteBehindStore::new(file)))
    }

    /// Profiles the host, runs the startup battery query, and builds the
    /// manager.
    pub async fn build(self) -> Result<VisualPolicyManager> {
        let config = match (&self.config_path, self.config) {
            (Some(path), _) => GovernorConfig::load(path)
                .with_context(|| format!("Failed to load governor config {}", path.display()))?,
            (None, Some(config)) => config,
            (None, None) => GovernorConfig::default(),
        };

        let table = match (&self.table_path, self.table) {
            (Some(path), _) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read policy table {}", path.display()))?;
                PolicyTable::from_json(&json)
                    .with_context(|| format!("Invalid policy table {}", path.display()))?
            }
            (None, Some(table)) => table,
            (None, None) => config.builtin_table(),
        };

        let capabilities = profile_capabilities(&self.signals);
        let battery = match &self.battery {
            Some(monitor) => BatterySaver::start(monitor.as_ref(), capabilities.is_mobile_ua).await,
            None => BatterySaver::disabled(),
        };

        VisualPolicyManager::new(config, table, capabilities, battery, self.store)
            .context("Failed to construct the visual policy manager")
    }

    /// [`build`](Self::build) on a private current-thread runtime.
    ///
    /// Must not be called from inside an async runtime.
    pub fn build_blocking(self) -> Result<VisualPolicyManager> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .context("Failed to create the startup runtime")?;
        runtime.block_on(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_core::platform::{BatteryHints, ChannelBatteryMonitor};
    use vesper_core::DeviceTier;

    fn laptop() -> HostSignals {
        HostSignals {
            viewport_width: Some(1440),
            device_memory_gb: Some(16.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug");
        assert!(!init_logging("info"));
    }

    #[tokio::test]
    async fn test_build_with_defaults() {
        let manager = GovernorBuilder::new(laptop()).build().await.unwrap();
        assert_eq!(manager.tier(), DeviceTier::High);
        assert_eq!(manager.max_tier(), DeviceTier::Ultra);
    }

    #[tokio::test]
    async fn test_build_with_battery_monitor() {
        let monitor = ChannelBatteryMonitor::new(BatteryHints {
            level: 0.05,
            is_charging: false,
        });
        let manager = GovernorBuilder::new(laptop())
            .battery_monitor(Arc::new(monitor.clone()))
            .build()
            .await
            .unwrap();
        assert_eq!(manager.tier(), DeviceTier::Low);
        assert_eq!(monitor.subscriber_count(), 1);
    }

    #[test]
    fn test_build_blocking() {
        let manager = GovernorBuilder::new(HostSignals {
            save_data: Some(true),
            ..laptop()
        })
        .build_blocking()
        .unwrap();
        assert_eq!(manager.tier(), DeviceTier::Low);
        assert_eq!(manager.max_tier(), DeviceTier::Medium);
    }

    #[tokio::test]
    async fn test_missing_config_file_carries_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = GovernorBuilder::new(laptop())
            .config_file(dir.path().join("absent.json"))
            .build()
            .await
            .err().unwrap();
        assert!(format!("{err:#}").contains("Failed to load governor config"));
    }

    #[tokio::test]
    async fn test_invalid_policy_table_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        std::fs::write(&path, "[]").unwrap();
        let err = GovernorBuilder::new(laptop())
            .policy_table_file(&path)
            .build()
            .await
            .err().unwrap();
        assert!(format!("{err:#}").contains("Invalid policy table"));
    }
}
