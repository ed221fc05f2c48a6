//! In-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::{Entity, EntityKind};
use crate::storage::{EntityStore, KeyValueStore, StoreResult};

/// Entity and key-value store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: Mutex<BTreeMap<(EntityKind, String), Entity>>,
    kv: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entities`.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        {
            let mut map = lock(&store.entities);
            for entity in entities {
                map.insert((entity.kind(), entity.id().to_string()), entity);
            }
        }
        store
    }

    /// Number of records across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entities).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EntityStore for MemoryStore {
    fn list(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        Ok(lock(&self.entities)
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Entity>> {
        Ok(lock(&self.entities).get(&(kind, id.to_string())).cloned())
    }

    fn upsert(&self, entity: &Entity) -> StoreResult<()> {
        lock(&self.entities).insert((entity.kind(), entity.id().to_string()), entity.clone());
        Ok(())
    }

    fn remove(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        Ok(lock(&self.entities).remove(&(kind, id.to_string())).is_some())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(lock(&self.kv).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        lock(&self.kv).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        lock(&self.kv).remove(key);
        Ok(())
    }
}
