//! Durable key-value persistence for engine state.
//!
//! The engine keeps exactly two keys here: the last-sync marker and
//! the serialized pending-change queue. The medium is any key-value
//! store that survives a reload; it is not a transaction log.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Key holding the last server-issued sync marker (RFC 3339 string).
pub const LAST_SYNC_KEY: &str = "lexsync.last_sync_at";

/// Key holding the serialized pending-change queue (JSON array).
pub const QUEUE_KEY: &str = "lexsync.pending_changes";

/// A durable string key-value store.
///
/// Keys whose values become empty are removed rather than left as
/// stale empty markers.
pub trait StateStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Writes a value.
    fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Removes a key; absent keys are a no-op.
    fn remove(&self, key: &str) -> SyncResult<()>;
}

/// An in-memory state store for testing.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.values.write().insert(key.into(), value.into());
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// A state store persisted as a single JSON file.
///
/// The whole map is rewritten on every mutation via a temporary file
/// and rename, so a crash mid-write leaves the previous state intact.
pub struct JsonFileStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading existing state if present.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let cache = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(SyncError::storage(e.to_string())),
        };
        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, String>) -> SyncResult<()> {
        let serialized = serde_json::to_string(values)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serialized).map_err(|e| SyncError::storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| SyncError::storage(e.to_string()))?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.cache.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut values = self.cache.write();
        values.insert(key.into(), value.into());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let mut values = self.cache.write();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}
