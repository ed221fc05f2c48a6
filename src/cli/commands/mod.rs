//! Command implementations.
//!
//! Every command opens the database, builds a [`SyncEngine`] over it and,
//! when it touches the sync root, attaches to the persisted session for the
//! duration of the command.

pub mod completions;
pub mod entity;
pub mod init;
pub mod status;
pub mod sync;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{EngineSettings, resolve_db_path};
use crate::error::{Error, Result};
use crate::model::EntityKind;
use crate::serializers::SerializerRegistry;
use crate::storage::SqliteStorage;
use crate::sync::{LocalFs, SyncConfig, SyncEngine, ToggleUpdate, load_persisted_config};

/// Open the application database.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<Arc<SqliteStorage>> {
    let path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine database path".to_string()))?;
    Ok(Arc::new(SqliteStorage::open(&path)?))
}

/// Engine over the CLI database with every built-in serializer.
pub(crate) fn engine_for(storage: &Arc<SqliteStorage>) -> SyncEngine {
    SyncEngine::with_options(
        storage.clone(),
        storage.clone(),
        SerializerRegistry::default(),
        EngineSettings::from_env(),
    )
}

/// Attach `engine` to the persisted active session.
pub(crate) fn attach(engine: &SyncEngine, storage: &SqliteStorage) -> Result<SyncConfig> {
    let config = load_persisted_config(storage)
        .filter(|config| config.is_active)
        .ok_or(Error::SyncInactive)?;
    Ok(engine.attach(Arc::new(LocalFs::new(&config.base_path)))?)
}

/// Toggle update for one category name; `full-export` names the snapshot
/// switch.
pub(crate) fn parse_category(name: &str, enabled: bool) -> Result<ToggleUpdate> {
    let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
    if normalized == "full-export" {
        return Ok(ToggleUpdate {
            full_export: Some(enabled),
            ..ToggleUpdate::default()
        });
    }
    let kind = parse_kind(&normalized)
        .map_err(|_| Error::InvalidArgument(format!("unknown category: {name}")))?;
    Ok(ToggleUpdate::category(kind, enabled))
}

pub(crate) fn parse_kind(name: &str) -> Result<EntityKind> {
    name.parse::<EntityKind>()
        .map_err(|_| Error::InvalidArgument(format!("unknown entity type: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category() {
        let update = parse_category("Full_Export", true).unwrap();
        assert_eq!(update.full_export, Some(true));
        assert_eq!(update.agents, None);

        let update = parse_category("memories", false).unwrap();
        assert_eq!(update.memories, Some(false));

        let err = parse_category("widgets", true).unwrap_err();
        assert!(err.to_string().contains("unknown category"));
    }
}
