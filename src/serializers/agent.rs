//! Agents: `agents/<slug-or-id>.md`, instructions in the body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntitySerializer, FileInput, FileSet, FileUnit, SerializeContext, SerializeError, frontmatter,
    sanitize_segment, wrong_kind,
};
use crate::model::{Agent, Entity, EntityKind};

#[derive(Debug, Serialize, Deserialize)]
struct AgentHeader {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slug: Option<String>,
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Agent files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentSerializer;

impl AgentSerializer {
    /// Filename stem: the slug when set, otherwise the id.
    #[must_use]
    pub fn file_stem(agent: &Agent) -> String {
        let stem = agent
            .slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&agent.id);
        sanitize_segment(stem)
    }
}

impl EntitySerializer for AgentSerializer {
    fn kind(&self) -> EntityKind {
        EntityKind::Agent
    }

    fn directory(&self) -> &'static str {
        "agents"
    }

    fn serialize(&self, entity: &Entity, _ctx: &SerializeContext) -> Result<FileSet, SerializeError> {
        let Entity::Agent(agent) = entity else {
            return Err(wrong_kind(EntityKind::Agent, entity));
        };

        let header = AgentHeader {
            id: agent.id.clone(),
            slug: agent.slug.clone(),
            name: agent.name.clone(),
            role: agent.role.clone(),
            tags: agent.tags.clone(),
            created_at: agent.created_at,
            updated_at: Some(agent.updated_at),
        };

        Ok(FileSet::single(FileUnit {
            directory: self.directory().to_string(),
            filename: format!("{}.{}", Self::file_stem(agent), self.extension()),
            content: frontmatter::render(&header, &agent.instructions)?,
        }))
    }

    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError> {
        let (header, body): (AgentHeader, String) = frontmatter::parse(input.content)?;
        if header.id.trim().is_empty() {
            return Err(SerializeError::Invalid(format!("{}: empty id", input.filename)));
        }

        Ok(Some(Entity::Agent(Agent {
            id: header.id,
            slug: header.slug,
            name: header.name,
            role: header.role,
            instructions: body,
            tags: header.tags,
            created_at: header.created_at,
            updated_at: header.updated_at.unwrap_or(input.metadata.last_modified),
            deleted_at: None,
        })))
    }
}
