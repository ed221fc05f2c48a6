//! Storage layer for the application database.
//!
//! The sync engine never owns entity records. It reads snapshots through
//! [`EntityStore`] and writes merged records back through its upsert
//! primitive. Small engine state (the hash cache, the active sync config)
//! is persisted through [`KeyValueStore`].
//!
//! # Submodules
//!
//! - [`schema`] - SQLite schema definitions
//! - [`sqlite`] - SQLite-backed store used by the CLI
//! - [`memory`] - In-memory store for embedding hosts and tests

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStorage;

use crate::model::{Entity, EntityKind};

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored record could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing storage refused the write (quota, read-only, ...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Canonical holder of entity records.
pub trait EntityStore: Send + Sync {
    /// Snapshot every record of one category, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn list(&self, kind: EntityKind) -> StoreResult<Vec<Entity>>;

    /// Look up one record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Entity>>;

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert(&self, entity: &Entity) -> StoreResult<()>;

    /// Hard-delete a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn remove(&self, kind: EntityKind, id: &str) -> StoreResult<bool>;
}

/// Host-local string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn remove(&self, key: &str) -> StoreResult<()>;
}
