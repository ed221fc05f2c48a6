//! Configuration management.
//!
//! This module resolves where the application database lives and which
//! timing and batching parameters the sync engine runs with.
//!
//! # Architecture
//!
//! devsync keeps one **global database** at `~/.devsync/data/devsync.db`.
//! It holds the entity records, the persisted hash cache and the active sync
//! session, so every CLI invocation sees the same state. The synced folder
//! itself is chosen with `devsync init <dir>` and can live anywhere.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

/// Environment variable overriding the database location.
pub const DB_ENV: &str = "DEVSYNC_DB";

/// Get the global devsync directory location (`~/.devsync/`).
#[must_use]
pub fn global_devsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".devsync"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `DEVSYNC_DB` environment variable
/// 3. Global location: `~/.devsync/data/devsync.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var(DB_ENV) {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_devsync_dir().map(|dir| dir.join("data").join("devsync.db"))
}

/// Timing and batching parameters of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Trailing debounce of the live-write channel.
    pub debounce: Duration,
    /// Period of the reconciliation loop.
    pub reconcile_interval: Duration,
    /// Entities processed concurrently per batch.
    pub batch_size: usize,
    /// Trailing debounce before the hash cache is persisted.
    pub cache_persist_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            reconcile_interval: Duration::from_secs(30),
            batch_size: 10,
            cache_persist_delay: Duration::from_secs(5),
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `DEVSYNC_DEBOUNCE_MS`, `DEVSYNC_RECONCILE_SECS`,
    /// `DEVSYNC_BATCH_SIZE` and `DEVSYNC_CACHE_PERSIST_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineSettings::from_env`] with an injectable lookup.
    ///
    /// Unparsable or zero values keep the default and log a warning.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(0) | Err(_) => {
                    warn!(key, value = %raw, "ignoring invalid setting");
                    None
                }
                Ok(value) => Some(value),
            }
        };

        Self {
            debounce: read("DEVSYNC_DEBOUNCE_MS")
                .map_or(defaults.debounce, Duration::from_millis),
            reconcile_interval: read("DEVSYNC_RECONCILE_SECS")
                .map_or(defaults.reconcile_interval, Duration::from_secs),
            batch_size: read("DEVSYNC_BATCH_SIZE")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.batch_size),
            cache_persist_delay: read("DEVSYNC_CACHE_PERSIST_MS")
                .map_or(defaults.cache_persist_delay, Duration::from_millis),
        }
    }
}
