//! Memories: `memories/<agentId>/<id>.md`, content in the body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntitySerializer, FileInput, FileSet, FileUnit, Layout, SerializeContext, SerializeError,
    frontmatter, join_path, sanitize_segment, wrong_kind,
};
use crate::model::{Entity, EntityKind, Memory};

#[derive(Debug, Serialize, Deserialize)]
struct MemoryHeader {
    id: String,
    agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    importance: f64,
    #[serde(default)]
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Memory files, one folder per agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySerializer;

impl EntitySerializer for MemorySerializer {
    fn kind(&self) -> EntityKind {
        EntityKind::Memory
    }

    fn directory(&self) -> &'static str {
        "memories"
    }

    fn layout(&self) -> Layout {
        Layout::ByOwner
    }

    fn serialize(&self, entity: &Entity, ctx: &SerializeContext) -> Result<FileSet, SerializeError> {
        let Entity::Memory(memory) = entity else {
            return Err(wrong_kind(EntityKind::Memory, entity));
        };

        let header = MemoryHeader {
            id: memory.id.clone(),
            agent_id: memory.agent_id.clone(),
            agent: ctx.agent_slug(&memory.agent_id).map(str::to_string),
            category: memory.category.clone(),
            importance: memory.importance,
            tags: memory.tags.clone(),
            created_at: memory.created_at,
            updated_at: Some(memory.updated_at),
        };

        Ok(FileSet::single(FileUnit {
            directory: join_path(self.directory(), &sanitize_segment(&memory.agent_id)),
            filename: format!("{}.{}", sanitize_segment(&memory.id), self.extension()),
            content: frontmatter::render(&header, &memory.content)?,
        }))
    }

    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError> {
        let (header, body): (MemoryHeader, String) = frontmatter::parse(input.content)?;
        if header.id.trim().is_empty() || header.agent_id.trim().is_empty() {
            return Err(SerializeError::Invalid(format!(
                "{}: memory needs id and agent_id",
                input.filename
            )));
        }

        Ok(Some(Entity::Memory(Memory {
            id: header.id,
            agent_id: header.agent_id,
            category: header.category,
            content: body,
            importance: header.importance,
            tags: header.tags,
            created_at: header.created_at,
            updated_at: header.updated_at.unwrap_or(input.metadata.last_modified),
            deleted_at: None,
        })))
    }
}
