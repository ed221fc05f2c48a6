//! Entity commands: inspect and edit records in the database.
//!
//! Edits made here go through the same path a host application's mutations
//! would: the record is written to the store and, while a session is
//! active, its files are rewritten or removed right away.

use std::io::Read;
use std::path::PathBuf;

use chrono::Utc;
use colored::Colorize;
use serde_json::json;

use crate::cli::EntityCommands;
use crate::cli::commands::{attach, engine_for, open_storage, parse_kind};
use crate::error::{Error, Result};
use crate::model::{Entity, EntityKind};
use crate::storage::{EntityStore, SqliteStorage};
use crate::sync::{SyncEngine, load_persisted_config};

/// Execute entity commands.
///
/// # Errors
///
/// Returns an error if the record is missing, the input is not a valid
/// record, or the database or sync root refuse the change.
pub async fn execute(command: &EntityCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        EntityCommands::List { kind, all } => list(kind, *all, db_path, json),
        EntityCommands::Put { file } => put(file.as_ref(), db_path, json).await,
        EntityCommands::Remove { kind, id } => remove(kind, id, db_path, json).await,
        EntityCommands::RemoveImage { entry_id, image_id } => {
            remove_image(entry_id, image_id, db_path, json).await
        }
    }
}

/// Engine attached to the active session, or `None` when sync is off.
fn attached_engine(storage: &std::sync::Arc<SqliteStorage>) -> Result<Option<SyncEngine>> {
    if !load_persisted_config(storage.as_ref()).is_some_and(|c| c.is_active) {
        return Ok(None);
    }
    let engine = engine_for(storage);
    attach(&engine, storage)?;
    Ok(Some(engine))
}

fn summary(entity: &Entity) -> String {
    let text = match entity {
        Entity::Agent(a) => a.name.as_str(),
        Entity::Conversation(c) => c.title.as_str(),
        Entity::Memory(m) => m.content.lines().next().unwrap_or(""),
        Entity::Knowledge(k) => k.name.as_str(),
        Entity::Task(t) => t.title.as_str(),
        Entity::Studio(s) => s.prompt.as_str(),
    };
    if text.chars().count() > 50 {
        format!("{}...", text.chars().take(47).collect::<String>())
    } else {
        text.to_string()
    }
}

fn list(kind: &str, all: bool, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let kind = parse_kind(kind)?;
    let storage = open_storage(db_path)?;
    let entities: Vec<Entity> = storage
        .list(kind)?
        .into_iter()
        .filter(|entity| all || !entity.is_deleted())
        .collect();

    if json {
        println!("{}", serde_json::to_string(&entities)?);
        return Ok(());
    }

    if entities.is_empty() {
        println!("No {kind} records.");
        return Ok(());
    }
    for entity in &entities {
        let updated = entity.updated_at().format("%Y-%m-%d %H:%M");
        let line = format!("{:<24} {updated}  {}", entity.id(), summary(entity));
        if entity.is_deleted() {
            println!("{} {}", line.dimmed(), "(deleted)".dimmed());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}

fn read_records(file: Option<&PathBuf>) -> Result<Vec<Entity>> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let value: serde_json::Value = serde_json::from_str(&input)?;
    let records = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Entity>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(records)
}

async fn put(file: Option<&PathBuf>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let records = read_records(file)?;
    let storage = open_storage(db_path)?;
    for entity in &records {
        storage.upsert(entity)?;
    }

    let mut files_written = 0;
    if let Some(engine) = attached_engine(&storage)? {
        let toggles = engine.get_config().map(|c| c.toggles).unwrap_or_default();
        let mut result = Ok(());
        for entity in records.iter().filter(|e| toggles.is_enabled(e.kind())) {
            match engine.write_now(entity).await {
                Ok(stats) => files_written += stats.written,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        engine.detach();
        result?;
    }

    if json {
        let ids: Vec<String> = records.iter().map(Entity::marker).collect();
        println!("{}", json!({ "saved": ids, "files_written": files_written }));
    } else {
        for entity in &records {
            println!("Saved {} {}", entity.kind(), entity.id());
        }
        if files_written > 0 {
            println!("  Wrote {files_written} files");
        }
    }
    Ok(())
}

async fn remove(kind: &str, id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let kind = parse_kind(kind)?;
    let storage = open_storage(db_path)?;
    let entity = storage
        .get(kind, id)?
        .ok_or_else(|| Error::EntityNotFound {
            kind,
            id: id.to_string(),
        })?;

    let mut files_removed = 0;
    if let Some(engine) = attached_engine(&storage)? {
        let result = match &entity {
            Entity::Studio(entry) => engine.delete_studio_entry(&entry.id).await,
            other => engine.delete_entity_file(other).await,
        };
        engine.detach();
        files_removed = result?;
    }
    storage.remove(kind, id)?;

    if json {
        println!(
            "{}",
            json!({ "removed": entity.marker(), "files_removed": files_removed })
        );
    } else {
        println!("Removed {kind} {id}");
        if files_removed > 0 {
            println!("  Deleted {files_removed} files");
        }
    }
    Ok(())
}

async fn remove_image(
    entry_id: &str,
    image_id: &str,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let storage = open_storage(db_path)?;
    let Some(Entity::Studio(mut entry)) = storage.get(EntityKind::Studio, entry_id)? else {
        return Err(Error::EntityNotFound {
            kind: EntityKind::Studio,
            id: entry_id.to_string(),
        });
    };

    let before = entry.images.len();
    entry.images.retain(|image| image.id != image_id);
    if entry.images.len() == before {
        return Err(Error::FileNotFound(format!(
            "image {image_id} in studio entry {entry_id}"
        )));
    }
    entry.updated_at = Utc::now();
    let entity = Entity::Studio(entry);
    storage.upsert(&entity)?;

    let mut files_removed = 0;
    if let Some(engine) = attached_engine(&storage)? {
        let removed = engine.delete_studio_image(entry_id, image_id).await;
        let rewritten = engine.write_now(&entity).await;
        engine.detach();
        files_removed = removed?;
        rewritten?;
    }

    if json {
        println!(
            "{}",
            json!({ "entry": entry_id, "image": image_id, "files_removed": files_removed })
        );
    } else {
        println!("Removed image {image_id} from {entry_id}");
    }
    Ok(())
}
