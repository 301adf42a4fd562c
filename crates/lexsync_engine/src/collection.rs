//! The caller-owned local template collection.

use lexsync_protocol::{Model, ModelId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Capability-scoped view of the local model collection.
///
/// The engine never owns the collection. It reads snapshots and
/// applies mutations through this narrow interface so that the
/// coalescing invariants cannot be bypassed behind its back; callers
/// must route every mutation of synced records through the engine's
/// CRUD wrappers.
pub trait ModelStore: Send + Sync {
    /// Snapshot of every record, tombstones included.
    fn all(&self) -> Vec<Model>;

    /// Inserts or replaces a record.
    fn upsert(&self, model: Model);

    /// Removes a record. Returns false if the id was absent.
    fn remove(&self, id: &ModelId) -> bool;

    /// Replaces the whole collection with a merged result.
    fn replace_all(&self, models: Vec<Model>);

    /// Applies a mutation to one record by id. Returns false if the
    /// id was absent.
    fn patch(&self, id: &ModelId, patch: &dyn Fn(&mut Model)) -> bool;
}

/// An in-memory model collection.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    models: RwLock<HashMap<ModelId, Model>>,
}

impl MemoryModelStore {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns one record by id.
    pub fn get(&self, id: &ModelId) -> Option<Model> {
        self.models.read().get(id).cloned()
    }

    /// Number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn all(&self) -> Vec<Model> {
        self.models.read().values().cloned().collect()
    }

    fn upsert(&self, model: Model) {
        self.models.write().insert(model.id, model);
    }

    fn remove(&self, id: &ModelId) -> bool {
        self.models.write().remove(id).is_some()
    }

    fn replace_all(&self, models: Vec<Model>) {
        let mut map = self.models.write();
        map.clear();
        map.extend(models.into_iter().map(|m| (m.id, m)));
    }

    fn patch(&self, id: &ModelId, patch: &dyn Fn(&mut Model)) -> bool {
        match self.models.write().get_mut(id) {
            Some(model) => {
                patch(model);
                true
            }
            None => false,
        }
    }
}
