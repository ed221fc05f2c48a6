//! Sync command implementations.
//!
//! One-shot commands (`export`, `import`, `snapshot`, `toggle`) attach to
//! the persisted session, do their work and detach again, leaving the
//! session active. `watch` re-runs the initial export and keeps the
//! reconciliation loop alive until interrupted; `stop` deactivates.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde_json::json;
use tracing::info;

use crate::cli::ToggleState;
use crate::cli::commands::{attach, engine_for, open_storage, parse_category};
use crate::error::{Error, Result};
use crate::model::EntityKind;
use crate::storage::KeyValueStore;
use crate::sync::{
    CONFIG_KEY, EntityStats, FileStats, LocalFs, SyncEventType, load_persisted_config,
};

/// Write changed entities to the sync root.
///
/// # Errors
///
/// Returns an error if sync is not active or the pass fails as a whole.
pub async fn export(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let engine = engine_for(&storage);
    let config = attach(&engine, &storage)?;

    let outcome = engine.export_all().await;
    engine.detach();
    let Some(stats) = outcome.into_result()? else {
        return Err(Error::Other("Another sync pass is running".to_string()));
    };

    if json {
        let output = json!({
            "success": stats.total_failed() == 0,
            "root": config.base_path,
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if stats.is_empty() && stats.total_failed() == 0 {
        println!("Everything up to date in: {}", config.base_path);
    } else {
        println!("Export complete for: {}", config.base_path);
        println!();
        for (kind, category) in &stats.categories {
            print_file_stats(*kind, category);
        }
        if stats.snapshot_written == Some(true) {
            println!("  Snapshot rewritten");
        }
        println!();
        println!(
            "Total: {} written, {} unchanged, {} failed",
            stats.total_written(),
            stats.total_unchanged(),
            stats.total_failed()
        );
    }
    Ok(())
}

fn print_file_stats(kind: EntityKind, stats: &FileStats) {
    if stats.written + stats.failed > 0 {
        println!(
            "  {:<14}{} written, {} unchanged, {} failed",
            kind.as_str(),
            stats.written,
            stats.unchanged,
            stats.failed
        );
    }
}

/// Merge edited files from the sync root into the database.
///
/// # Errors
///
/// Returns an error if sync is not active or the pass fails as a whole.
pub async fn import(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let engine = engine_for(&storage);
    let config = attach(&engine, &storage)?;

    let outcome = engine.import_all().await;
    engine.detach();
    let Some(stats) = outcome.into_result()? else {
        return Err(Error::Other("Another sync pass is running".to_string()));
    };

    let total = stats.total_processed();
    if json {
        let output = json!({
            "success": stats.total_failed() == 0,
            "root": config.base_path,
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if total == 0 {
        println!("No files to import in: {}", config.base_path);
    } else {
        println!("Import complete for: {}", config.base_path);
        println!();
        for (kind, category) in &stats.categories {
            print_entity_stats(*kind, category);
        }
        println!();
        println!(
            "Total: {} created, {} updated, {} skipped, {} failed",
            stats.total_created(),
            stats.total_updated(),
            total - stats.total_created() - stats.total_updated() - stats.total_failed(),
            stats.total_failed()
        );
    }
    Ok(())
}

fn print_entity_stats(kind: EntityKind, stats: &EntityStats) {
    if stats.total() > 0 {
        println!(
            "  {:<14}{} created, {} updated, {} skipped, {} failed",
            kind.as_str(),
            stats.created,
            stats.updated,
            stats.skipped,
            stats.failed
        );
    }
}

/// Sync in the foreground until Ctrl-C.
///
/// # Errors
///
/// Returns an error if no session is active or the root became unusable.
pub async fn watch(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let config = load_persisted_config(storage.as_ref())
        .filter(|config| config.is_active)
        .ok_or(Error::SyncInactive)?;
    let engine = engine_for(&storage);

    let subscription = engine.on_sync_event(move |event| {
        if json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
            return;
        }
        match event.event_type {
            SyncEventType::FileWritten => {
                println!("{} {}", "wrote".green(), event.filename.as_deref().unwrap_or(""));
            }
            SyncEventType::FileRead => {
                println!("{} {}", "read ".blue(), event.filename.as_deref().unwrap_or(""));
            }
            SyncEventType::FileDeleted => {
                println!("{} {}", "gone ".yellow(), event.filename.as_deref().unwrap_or(""));
            }
            SyncEventType::SyncError => {
                eprintln!("{} {}", "error".red(), event.error.as_deref().unwrap_or(""));
            }
            SyncEventType::SyncStart | SyncEventType::SyncComplete => {}
        }
    });

    engine
        .initialize(Arc::new(LocalFs::new(&config.base_path)), None)
        .await?;
    if !json {
        println!(
            "Watching {} (every {}s, Ctrl-C to exit)",
            config.base_path,
            engine.settings().reconcile_interval.as_secs()
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupted, detaching");
    subscription.unsubscribe();
    engine.detach();
    Ok(())
}

/// Enable or disable one category of the persisted session.
///
/// # Errors
///
/// Returns an error if no session was ever configured or the category is
/// unknown.
pub async fn toggle(
    category: &str,
    state: ToggleState,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let update = parse_category(category, state.enabled())?;
    let storage = open_storage(db_path)?;
    let mut config = load_persisted_config(storage.as_ref()).ok_or(Error::SyncInactive)?;

    if config.is_active {
        let engine = engine_for(&storage);
        attach(&engine, &storage)?;
        config = engine.update_config(update)?;
        // Newly enabled categories are written right away.
        if state.enabled() {
            engine.export_all().await.into_result()?;
            config = engine.get_config().unwrap_or(config);
        }
        engine.detach();
    } else {
        update.apply(&mut config.toggles);
        storage.set(CONFIG_KEY, &serde_json::to_string(&config)?)?;
    }

    if json {
        println!("{}", serde_json::to_string(&config.toggles)?);
    } else {
        let label = if state.enabled() { "on".green() } else { "off".yellow() };
        println!("{category}: {label}");
    }
    Ok(())
}

/// Deactivate sync.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn stop(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let was_active = load_persisted_config(storage.as_ref()).is_some_and(|c| c.is_active);
    engine_for(&storage).stop();

    if json {
        println!("{}", json!({ "stopped": was_active }));
    } else if was_active {
        println!("Sync stopped. Files were left in place.");
    } else {
        println!("Sync was not active.");
    }
    Ok(())
}

/// Print the snapshot at the sync root.
///
/// # Errors
///
/// Returns an error if sync is not active or no snapshot exists.
pub async fn snapshot(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let engine = engine_for(&storage);
    let config = attach(&engine, &storage)?;

    let result = engine.read_snapshot().await;
    engine.detach();
    let snapshot = result?;

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        println!("Snapshot in: {}", config.base_path);
        println!("  Version: {}", snapshot.version);
        for kind in EntityKind::ALL {
            println!("  {:<14}{}", kind.as_str(), snapshot.of(kind).len());
        }
        println!("  Total:   {} records", snapshot.len());
    }
    Ok(())
}
