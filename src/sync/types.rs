//! Sync session state, statistics and errors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Entity, EntityKind};
use crate::serializers::SerializeError;
use crate::storage::StoreError;

/// Per-category switches of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncToggles {
    pub agents: bool,
    pub conversations: bool,
    pub memories: bool,
    pub knowledge: bool,
    pub tasks: bool,
    pub studio: bool,
    /// Write the compressed whole-database snapshot at the sync root.
    pub full_export: bool,
}

impl Default for SyncToggles {
    fn default() -> Self {
        Self {
            agents: true,
            conversations: true,
            memories: true,
            knowledge: true,
            tasks: true,
            studio: true,
            full_export: false,
        }
    }
}

impl SyncToggles {
    /// Toggles with only the given categories enabled.
    #[must_use]
    pub fn only(kinds: &[EntityKind]) -> Self {
        let mut toggles = Self {
            agents: false,
            conversations: false,
            memories: false,
            knowledge: false,
            tasks: false,
            studio: false,
            full_export: false,
        };
        for kind in kinds {
            toggles.set(*kind, true);
        }
        toggles
    }

    #[must_use]
    pub const fn is_enabled(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Agent => self.agents,
            EntityKind::Conversation => self.conversations,
            EntityKind::Memory => self.memories,
            EntityKind::Knowledge => self.knowledge,
            EntityKind::Task => self.tasks,
            EntityKind::Studio => self.studio,
        }
    }

    pub fn set(&mut self, kind: EntityKind, enabled: bool) {
        match kind {
            EntityKind::Agent => self.agents = enabled,
            EntityKind::Conversation => self.conversations = enabled,
            EntityKind::Memory => self.memories = enabled,
            EntityKind::Knowledge => self.knowledge = enabled,
            EntityKind::Task => self.tasks = enabled,
            EntityKind::Studio => self.studio = enabled,
        }
    }

    /// Enabled categories in pass order.
    #[must_use]
    pub fn enabled(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

/// A partial toggle update; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleUpdate {
    pub agents: Option<bool>,
    pub conversations: Option<bool>,
    pub memories: Option<bool>,
    pub knowledge: Option<bool>,
    pub tasks: Option<bool>,
    pub studio: Option<bool>,
    pub full_export: Option<bool>,
}

impl ToggleUpdate {
    /// An update touching a single category.
    #[must_use]
    pub fn category(kind: EntityKind, enabled: bool) -> Self {
        let mut update = Self::default();
        let slot = match kind {
            EntityKind::Agent => &mut update.agents,
            EntityKind::Conversation => &mut update.conversations,
            EntityKind::Memory => &mut update.memories,
            EntityKind::Knowledge => &mut update.knowledge,
            EntityKind::Task => &mut update.tasks,
            EntityKind::Studio => &mut update.studio,
        };
        *slot = Some(enabled);
        update
    }

    pub fn apply(&self, toggles: &mut SyncToggles) {
        let pairs = [
            (self.agents, &mut toggles.agents),
            (self.conversations, &mut toggles.conversations),
            (self.memories, &mut toggles.memories),
            (self.knowledge, &mut toggles.knowledge),
            (self.tasks, &mut toggles.tasks),
            (self.studio, &mut toggles.studio),
            (self.full_export, &mut toggles.full_export),
        ];
        for (value, slot) in pairs {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

/// One synchronization session.
///
/// The root directory handle itself lives with the engine; this is the part
/// that is persisted and shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub id: String,
    /// Human-readable label of the sync root (its path for local folders)
    pub base_path: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub toggles: SyncToggles,
}

impl SyncConfig {
    /// A fresh active session for `base_path`.
    #[must_use]
    pub fn new(base_path: impl Into<String>, toggles: SyncToggles) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            base_path: base_path.into(),
            is_active: true,
            created_at: Utc::now(),
            last_sync: None,
            toggles,
        }
    }
}

/// File counts for one category of an export pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStats {
    /// Files written because their hash changed.
    pub written: usize,
    /// Files skipped because their hash matched the cache.
    pub unchanged: usize,
    /// Entities whose serialization or write failed.
    pub failed: usize,
}

impl FileStats {
    pub fn add(&mut self, other: Self) {
        self.written += other.written;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

/// Statistics for an export pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    pub categories: BTreeMap<EntityKind, FileStats>,
    /// `Some(true)` when the full snapshot was rewritten, `Some(false)` when
    /// it was unchanged, `None` when full export is off.
    pub snapshot_written: Option<bool>,
}

impl ExportStats {
    #[must_use]
    pub fn total_written(&self) -> usize {
        self.categories.values().map(|s| s.written).sum::<usize>()
            + usize::from(self.snapshot_written == Some(true))
    }

    #[must_use]
    pub fn total_unchanged(&self) -> usize {
        self.categories.values().map(|s| s.unchanged).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.categories.values().map(|s| s.failed).sum()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_written() == 0
    }
}

/// Per-category statistics for import passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Number of new records created.
    pub created: usize,
    /// Number of existing records replaced by a strictly newer file.
    pub updated: usize,
    /// Number of records kept because the file was not newer.
    pub skipped: usize,
    /// Number of files that could not be read or parsed.
    pub failed: usize,
}

impl EntityStats {
    /// Total files processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }
}

/// Statistics for an import pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub categories: BTreeMap<EntityKind, EntityStats>,
}

impl ImportStats {
    #[must_use]
    pub fn total_processed(&self) -> usize {
        self.categories.values().map(EntityStats::total).sum()
    }

    #[must_use]
    pub fn total_created(&self) -> usize {
        self.categories.values().map(|s| s.created).sum()
    }

    #[must_use]
    pub fn total_updated(&self) -> usize {
        self.categories.values().map(|s| s.updated).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.categories.values().map(|s| s.failed).sum()
    }
}

/// Entities whose files may be stale, as `"kind:id"` markers.
#[derive(Debug, Default)]
pub struct DirtySet {
    markers: Mutex<BTreeSet<String>>,
}

impl DirtySet {
    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, entity: &Entity) {
        self.lock().insert(entity.marker());
    }

    pub fn clear(&self, entity: &Entity) {
        self.lock().remove(&entity.marker());
    }

    #[must_use]
    pub fn contains(&self, entity: &Entity) -> bool {
        self.lock().contains(&entity.marker())
    }

    /// Sorted snapshot of every marker.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A directory or file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The sync root refused read-write access.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Entity could not be converted to or from files.
    #[error("Serialization error: {0}")]
    Serialize(#[from] SerializeError),

    /// Entity store or key-value store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Content that should be base64 or UTF-8 is not.
    #[error("Decode error: {0}")]
    Decode(String),

    /// No sync session is active.
    #[error("Sync is not active")]
    Inactive,

    /// A name or path the filesystem cannot accept.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl SyncError {
    /// Map an I/O error, keeping not-found and permission failures distinct.
    #[must_use]
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Io(err),
        }
    }

    /// Not-found conditions are benign for import and deletion.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;

    #[test]
    fn test_toggle_defaults_enable_every_category() {
        let toggles = SyncToggles::default();
        assert_eq!(toggles.enabled(), EntityKind::ALL.to_vec());
        assert!(!toggles.full_export);
    }

    #[test]
    fn test_only_and_partial_update() {
        let mut toggles = SyncToggles::only(&[EntityKind::Agent]);
        assert_eq!(toggles.enabled(), vec![EntityKind::Agent]);

        ToggleUpdate::category(EntityKind::Studio, true).apply(&mut toggles);
        ToggleUpdate {
            full_export: Some(true),
            agents: Some(false),
            ..ToggleUpdate::default()
        }
        .apply(&mut toggles);

        assert_eq!(toggles.enabled(), vec![EntityKind::Studio]);
        assert!(toggles.full_export);
    }

    #[test]
    fn test_export_stats_totals() {
        let mut stats = ExportStats::default();
        assert!(stats.is_empty());

        stats.categories.insert(
            EntityKind::Agent,
            FileStats {
                written: 2,
                unchanged: 1,
                failed: 1,
            },
        );
        stats.snapshot_written = Some(true);
        assert_eq!(stats.total_written(), 3);
        assert_eq!(stats.total_unchanged(), 1);
        assert_eq!(stats.total_failed(), 1);
        assert!(!stats.is_empty());
    }

    #[test]
    fn test_entity_stats() {
        let stats = EntityStats {
            created: 10,
            updated: 5,
            skipped: 2,
            failed: 1,
        };
        assert_eq!(stats.total(), 18);
    }

    #[test]
    fn test_dirty_set_markers() {
        let dirty = DirtySet::default();
        let agent = Entity::Agent(Agent::new("a1", "Bot"));

        dirty.mark(&agent);
        dirty.mark(&agent);
        assert_eq!(dirty.snapshot(), vec!["agent:a1".to_string()]);
        assert!(dirty.contains(&agent));

        dirty.clear(&agent);
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_io_error_mapping() {
        let err = SyncError::from_io(std::io::ErrorKind::NotFound.into(), "agents");
        assert!(err.is_not_found());
        let err = SyncError::from_io(std::io::ErrorKind::PermissionDenied.into(), "/root");
        assert!(matches!(err, SyncError::PermissionDenied(_)));
        let err = SyncError::from_io(std::io::ErrorKind::Other.into(), "x");
        assert!(matches!(err, SyncError::Io(_)));
    }
}
