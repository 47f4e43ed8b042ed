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

//! Optional process-wide slot for hosts that cannot thread a manager through
//! their call graph.
//!
//! Library code should take a `VisualPolicyManager` or a `PolicyHandle`
//! explicitly; this registry exists only for the outermost composition layer.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, PoisonError};
use vesper_control::VisualPolicyManager;

/// A manager shared between the render loop and other host code.
pub type SharedManager = Arc<Mutex<VisualPolicyManager>>;

static INSTALLED: Mutex<Option<SharedManager>> = Mutex::new(None);

/// Installs `manager` as the process-wide instance.
///
/// Fails if one is already installed.
pub fn install(manager: VisualPolicyManager) -> Result<SharedManager> {
    let mut slot = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        bail!("A visual policy manager is already installed");
    }
    let shared = Arc::new(Mutex::new(manager));
    *slot = Some(Arc::clone(&shared));
    log::info!("Visual policy manager installed.");
    Ok(shared)
}

/// The installed instance, if any.
pub fn get() -> Option<SharedManager> {
    INSTALLED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Removes the installed instance and releases its battery subscription.
pub fn uninstall() -> Option<SharedManager> {
    let shared = INSTALLED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()?;
    shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .shutdown();
    log::info!("Visual policy manager uninstalled.");
    Some(shared)
}
