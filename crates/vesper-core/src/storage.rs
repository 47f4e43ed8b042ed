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

//! Flat key/value persistence supplied by the host.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// A host-provided persistent string store.
///
/// The governor calls `set` and `remove` from the render loop, so they must
/// return quickly. A store backed by slow I/O (such as [`FileStore`]) should
/// be wrapped in a [`WriteBehindStore`], which buffers writes for a worker
/// thread.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value. A missing key is `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Writes a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Removes a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// An in-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// A store persisted as a flat JSON object in a single file.
///
/// Every call does blocking file I/O. The whole map is rewritten on each write, through a sibling temp file that
/// is renamed into place. A missing file reads as empty. A malformed file
/// fails reads, and the next write replaces it.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// The current map for a read-modify-write, and whether malformed
    /// contents were dropped so the write can replace them.
    fn read_map_for_write(&self) -> Result<(BTreeMap<String, String>, bool), StoreError> {
        match self.read_map() {
            Ok(map) => Ok((map, false)),
            Err(StoreError::Malformed(e)) => {
                log::warn!(
                    "FileStore: discarding malformed contents of {}: {}",
                    self.path.display(),
                    e
                );
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(map)?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, text)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let (mut map, _) = self.read_map_for_write()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let (mut map, discarded) = self.read_map_for_write()?;
        if map.remove(key).is_some() || discarded {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

enum WriteOp {
    Set(String, String),
    Remove(String),
}

/// Buffers writes in memory and applies them to an inner store on a worker
/// thread, so `set` and `remove` never wait for I/O.
///
/// Reads see buffered writes immediately. Keys not written through this
/// wrapper are read from the inner store. Dropping the wrapper drains the
/// queue and joins the worker.
pub struct WriteBehindStore {
    inner: Arc<dyn KeyValueStore>,
    // `None` marks a buffered removal.
    pending: Mutex<BTreeMap<String, Option<String>>>,
    sender: Option<flume::Sender<WriteOp>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WriteBehindStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindStore").finish_non_exhaustive()
    }
}

impl WriteBehindStore {
    /// Wraps `inner` and starts the writer thread.
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        let (sender, receiver) = flume::unbounded::<WriteOp>();
        let worker_store = Arc::clone(&inner);

        let handle = thread::spawn(move || {
            for op in receiver.iter() {
                let (key, result) = match op {
                    WriteOp::Set(key, value) => {
                        let result = worker_store.set(&key, &value);
                        (key, result)
                    }
                    WriteOp::Remove(key) => {
                        let result = worker_store.remove(&key);
                        (key, result)
                    }
                };
                if let Err(e) = result {
                    log::warn!("WriteBehindStore: failed to write '{}': {}", key, e);
                }
            }
            log::debug!("WriteBehindStore writer stopped.");
        });

        Self {
            inner,
            pending: Mutex::new(BTreeMap::new()),
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    fn enqueue(&self, key: &str, value: Option<&str>, op: WriteOp) -> Result<(), StoreError> {
        let sender = self.sender.as_ref().ok_or(StoreError::Closed)?;
        let mut pending = self.pending.lock().map_err(|_| StoreError::Poisoned)?;
        pending.insert(key.to_string(), value.map(str::to_string));
        sender.send(op).map_err(|_| StoreError::Closed)
    }
}

impl KeyValueStore for WriteBehindStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let pending = self.pending.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(buffered) = pending.get(key) {
            return Ok(buffered.clone());
        }
        drop(pending);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.enqueue(key, Some(value), WriteOp::Set(key.to_string(), value.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.enqueue(key, None, WriteOp::Remove(key.to_string()))
    }
}

impl Drop for WriteBehindStore {
    fn drop(&mut self) {
        // Closing the channel ends the worker once the queue is drained.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
