//! SQLite storage implementation.
//!
//! Backs the CLI's application database: one `entities` table keyed by
//! `(kind, id)` holding the JSON form of each record, and one `kv` table
//! for engine state.

use crate::model::{Entity, EntityKind};
use crate::storage::schema::apply_schema;
use crate::storage::{EntityStore, KeyValueStore, StoreResult};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// SQLite-based storage backend.
///
/// The connection sits behind a mutex so the store can be shared with the
/// engine's background tasks.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| crate::storage::StoreError::Unavailable(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count live (not soft-deleted) records per category.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_by_kind(&self) -> StoreResult<Vec<(EntityKind, usize)>> {
        let conn = self.conn();
        let mut counts = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entities WHERE kind = ?1 AND deleted = 0",
                params![kind.as_str()],
                |row| row.get(0),
            )?;
            counts.push((kind, usize::try_from(count).unwrap_or(0)));
        }
        Ok(counts)
    }
}

impl EntityStore for SqliteStorage {
    fn list(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT data FROM entities WHERE kind = ?1 ORDER BY updated_at, id")?;
        let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(serde_json::from_str(&row?)?);
        }
        Ok(entities)
    }

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Entity>> {
        let data: Option<String> = self
            .conn()
            .query_row(
                "SELECT data FROM entities WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn upsert(&self, entity: &Entity) -> StoreResult<()> {
        let data = serde_json::to_string(entity)?;
        self.conn().execute(
            "INSERT INTO entities (kind, id, data, updated_at, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(kind, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                deleted = excluded.deleted",
            params![
                entity.kind().as_str(),
                entity.id(),
                data,
                entity.updated_at().timestamp_millis(),
                i32::from(entity.is_deleted()),
            ],
        )?;
        Ok(())
    }

    fn remove(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM entities WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )?;
        Ok(removed > 0)
    }
}

impl KeyValueStore for SqliteStorage {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_upsert_and_get() {
        let storage = SqliteStorage::open_memory().unwrap();
        let agent = Entity::Agent(Agent::new("a1", "Bot"));

        storage.upsert(&agent).unwrap();
        let loaded = EntityStore::get(&storage, EntityKind::Agent, "a1").unwrap();
        assert_eq!(loaded, Some(agent));
        assert!(EntityStore::get(&storage, EntityKind::Task, "a1").unwrap().is_none());

        assert!(EntityStore::remove(&storage, EntityKind::Agent, "a1").unwrap());
        assert!(EntityStore::get(&storage, EntityKind::Agent, "a1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let storage = SqliteStorage::open_memory().unwrap();
        let mut agent = Agent::new("a1", "Bot");
        storage.upsert(&Entity::Agent(agent.clone())).unwrap();

        agent.name = "Renamed".into();
        agent.updated_at = Utc::now();
        storage.upsert(&Entity::Agent(agent)).unwrap();

        let agents = storage.list(EntityKind::Agent).unwrap();
        assert_eq!(agents.len(), 1);
        match &agents[0] {
            Entity::Agent(a) => assert_eq!(a.name, "Renamed"),
            other => panic!("unexpected entity {other:?}"),
        }
    }

    #[test]
    fn test_count_by_kind_skips_deleted() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.upsert(&Entity::Agent(Agent::new("a1", "One"))).unwrap();
        let mut gone = Agent::new("a2", "Two");
        gone.deleted_at = Some(Utc::now());
        storage.upsert(&Entity::Agent(gone)).unwrap();

        let counts = storage.count_by_kind().unwrap();
        let agents = counts.iter().find(|(k, _)| *k == EntityKind::Agent).unwrap();
        assert_eq!(agents.1, 1);
    }

    #[test]
    fn test_kv_persists_across_open() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("data").join("devsync.db");

        {
            let storage = SqliteStorage::open(&db_path).unwrap();
            storage.set("hashes", r#"{"agents/a1.md":"abc"}"#).unwrap();
        }

        let storage = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(
            KeyValueStore::get(&storage, "hashes").unwrap().as_deref(),
            Some(r#"{"agents/a1.md":"abc"}"#)
        );
        KeyValueStore::remove(&storage, "hashes").unwrap();
        assert!(KeyValueStore::get(&storage, "hashes").unwrap().is_none());
    }
}
