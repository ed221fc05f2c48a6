//! Sync status display.
//!
//! Status is computed from persisted state only (the session config and the
//! hash cache in the key-value store, record counts from the entity store),
//! so it works without an attached sync root.

use std::collections::{BTreeMap, HashMap};

use colored::Colorize;
use serde::Serialize;

use crate::model::EntityKind;
use crate::serializers::SerializerRegistry;
use crate::storage::{EntityStore, KeyValueStore};
use crate::sync::engine::load_persisted_config;
use crate::sync::hash_cache::HASH_CACHE_KEY;
use crate::sync::snapshot::SNAPSHOT_FILENAME;
use crate::sync::types::{SyncConfig, SyncResult};

/// Counts for one category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryStatus {
    pub enabled: bool,
    /// Records in the store, soft-deleted ones excluded
    pub records: usize,
    pub deleted: usize,
    /// Files under the category directory known to the hash cache
    pub files: usize,
}

/// Overall sync status.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub config: Option<SyncConfig>,
    pub categories: BTreeMap<EntityKind, CategoryStatus>,
    pub cached_files: usize,
    pub snapshot_exported: bool,
}

impl SyncStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.is_active)
    }

    #[must_use]
    pub fn total_records(&self) -> usize {
        self.categories.values().map(|c| c.records).sum()
    }
}

fn persisted_paths(kv: &dyn KeyValueStore) -> Vec<String> {
    kv.get(HASH_CACHE_KEY)
        .ok()
        .flatten()
        .and_then(|json| serde_json::from_str::<HashMap<String, String>>(&json).ok())
        .map(|entries| entries.into_keys().collect())
        .unwrap_or_default()
}

/// Get the current sync status.
///
/// # Errors
///
/// Returns an error if the entity store cannot be read.
pub fn get_sync_status(
    store: &dyn EntityStore,
    kv: &dyn KeyValueStore,
    registry: &SerializerRegistry,
) -> SyncResult<SyncStatus> {
    let config = load_persisted_config(kv);
    let toggles = config.as_ref().map(|c| c.toggles).unwrap_or_default();
    let paths = persisted_paths(kv);

    let mut categories = BTreeMap::new();
    for kind in EntityKind::ALL {
        let entities = store.list(kind)?;
        let deleted = entities.iter().filter(|e| e.is_deleted()).count();
        let files = registry.get(kind).map_or(0, |serializer| {
            let prefix = format!("{}/", serializer.directory());
            paths.iter().filter(|p| p.starts_with(&prefix)).count()
        });
        categories.insert(
            kind,
            CategoryStatus {
                enabled: toggles.is_enabled(kind),
                records: entities.len() - deleted,
                deleted,
                files,
            },
        );
    }

    Ok(SyncStatus {
        config,
        categories,
        cached_files: paths.len(),
        snapshot_exported: paths.iter().any(|p| p == SNAPSHOT_FILENAME),
    })
}

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    match &status.config {
        Some(config) => {
            let state = if config.is_active {
                "active".green()
            } else {
                "stopped".yellow()
            };
            println!("  Root:      {}", config.base_path);
            println!("  State:     {state}");
            match config.last_sync {
                Some(at) => println!("  Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  Last sync: {}", "never".dimmed()),
            }
            if config.toggles.full_export {
                let snapshot = if status.snapshot_exported {
                    "written".normal()
                } else {
                    "pending".yellow()
                };
                println!("  Snapshot:  {snapshot}");
            }
        }
        None => {
            println!("{}", "No sync root configured.".dimmed());
            println!("{}", "Run 'devsync init <dir>' to start syncing.".dimmed());
        }
    }
    println!();

    println!("{}", "Categories:".blue().bold());
    for (kind, category) in &status.categories {
        let name = format!("{:<14}", kind.as_str());
        let line = format!(
            "{name}{:>6} records {:>6} files",
            category.records, category.files
        );
        if category.enabled {
            println!("  {line}");
        } else {
            println!("  {} {}", line.dimmed(), "(off)".dimmed());
        }
    }
    println!();
    println!("  {}: {}", "Tracked files".bold(), status.cached_files);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, Entity};
    use crate::storage::MemoryStore;
    use crate::sync::SyncEngine;
    use crate::sync::fs::MemoryFs;
    use crate::sync::types::SyncToggles;
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn test_status_without_config() {
        let mut gone = Agent::new("a2", "Gone");
        gone.deleted_at = Some(Utc::now());
        let store =
            MemoryStore::with_entities([Entity::Agent(Agent::new("a1", "Bot")), Entity::Agent(gone)]);

        let status = get_sync_status(&store, &store, &SerializerRegistry::default()).unwrap();
        assert!(status.config.is_none());
        assert!(!status.is_active());
        assert_eq!(status.categories[&EntityKind::Agent].records, 1);
        assert_eq!(status.categories[&EntityKind::Agent].deleted, 1);
        assert_eq!(status.cached_files, 0);
    }

    #[tokio::test]
    async fn test_status_after_export() {
        let store = Arc::new(MemoryStore::with_entities([Entity::Agent(Agent::new(
            "a1", "Bot",
        ))]));
        let engine = SyncEngine::new(store.clone(), store.clone());
        let toggles = SyncToggles {
            full_export: true,
            ..SyncToggles::only(&[EntityKind::Agent])
        };
        engine
            .initialize(Arc::new(MemoryFs::new("/data/sync")), Some(toggles))
            .await
            .unwrap();
        engine.stop();

        let status =
            get_sync_status(store.as_ref(), store.as_ref(), &SerializerRegistry::default())
                .unwrap();
        let config = status.config.as_ref().unwrap();
        assert_eq!(config.base_path, "/data/sync");
        assert!(!status.is_active());
        assert_eq!(status.categories[&EntityKind::Agent].files, 1);
        assert!(!status.categories[&EntityKind::Task].enabled);
        assert!(status.snapshot_exported);
        assert_eq!(status.cached_files, 2);
    }
}
