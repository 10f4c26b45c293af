//! Synchronous key-value stores backing session persistence.
//!
//! The core persists into two named slots of a small string store. The
//! [`KeyValueStore`] trait is the seam between the session logic and the
//! hosting platform: [`FileStore`] keeps one file per slot on disk, while
//! [`MemoryStore`] is ephemeral and can simulate a bounded quota.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::warn;

/// Failure writing to a key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is out of capacity; recoverable by shrinking the payload.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// Any other storage failure; logged and dropped by callers.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A synchronous string store addressed by slot name.
///
/// Reads fail soft: a missing or unreadable slot is simply absent. Writes
/// distinguish quota exhaustion from other failures so callers can evict
/// and retry.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key` from the store. Removing an absent key is a no-op.
    fn remove(&self, key: &str);
}

/// Shared stores work wherever a store does, e.g. several controller
/// instances over one store.
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// In-memory store, optionally bounded to a byte capacity.
///
/// The capacity counts key and value bytes across all entries and makes
/// `set` fail with [`StoreError::QuotaExceeded`] instead of growing past
/// the bound, mirroring how browser-local storage behaves when full.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes growing it past `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(capacity) = self.capacity {
            let existing = entries.get(key).map_or(0, |v| key.len() + v.len());
            let projected = Self::used_bytes(&entries) - existing + key.len() + value.len();
            if projected > capacity {
                return Err(StoreError::QuotaExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

/// On-disk store keeping one file per slot under a base directory.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Open the store at the default per-user location (`~/.parrot/store`).
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::default_path()?)
    }

    /// Get the default store directory.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to locate home directory")?;
        Ok(home.join(".parrot").join("store"))
    }

    /// Open the store at a specific directory, creating it if needed.
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create store directory: {}", base_dir.display()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Slot names double as file names, so they must not contain path
    /// separators.
    fn slot_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.slot_path(key)) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(key, %err, "failed to read store slot");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let final_path = self.slot_path(key);
        let tmp_path = self.base_dir.join(format!("{key}.tmp"));

        let map_err = |err: std::io::Error| {
            if err.kind() == ErrorKind::StorageFull {
                StoreError::QuotaExceeded
            } else {
                StoreError::Io(err)
            }
        };

        std::fs::write(&tmp_path, value).map_err(map_err)?;
        match std::fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if final_path.exists() {
                    std::fs::remove_file(&final_path).map_err(map_err)?;
                    std::fs::rename(&tmp_path, &final_path).map_err(map_err)?;
                    Ok(())
                } else {
                    Err(map_err(rename_err))
                }
            }
        }
    }

    fn remove(&self, key: &str) {
        if let Err(err) = std::fs::remove_file(self.slot_path(key)) {
            if err.kind() != ErrorKind::NotFound {
                warn!(key, %err, "failed to remove store slot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("slot"), None);

        store.set("slot", "value").unwrap();
        assert_eq!(store.get("slot").as_deref(), Some("value"));

        store.set("slot", "replaced").unwrap();
        assert_eq!(store.get("slot").as_deref(), Some("replaced"));

        store.remove("slot");
        assert_eq!(store.get("slot"), None);
        store.remove("slot");
    }

    #[test]
    fn test_memory_store_enforces_capacity() {
        let store = MemoryStore::with_capacity(10);
        store.set("k", "123456789").unwrap();

        let err = store.set("k2", "x").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded));
        assert_eq!(store.get("k2"), None);

        // Replacing an entry with a smaller value frees capacity.
        store.set("k", "1").unwrap();
        store.set("k2", "x").unwrap();
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open_at(dir.path()).unwrap();

        assert_eq!(store.get("slot"), None);
        store.set("slot", "value").unwrap();
        assert_eq!(store.get("slot").as_deref(), Some("value"));

        store.remove("slot");
        assert_eq!(store.get("slot"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open_at(dir.path()).unwrap();
            store.set("slot", "persisted").unwrap();
        }
        let store = FileStore::open_at(dir.path()).unwrap();
        assert_eq!(store.get("slot").as_deref(), Some("persisted"));
    }
}
