//! Tasks: `tasks/<workflowId>/<id>.md`, description in the body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntitySerializer, FileInput, FileSet, FileUnit, Layout, SerializeContext, SerializeError,
    frontmatter, join_path, sanitize_segment, wrong_kind,
};
use crate::model::{Entity, EntityKind, Task, TaskStatus};

#[derive(Debug, Serialize, Deserialize)]
struct TaskHeader {
    id: String,
    workflow_id: String,
    title: String,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assigned_agent_id: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Task files, one folder per workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskSerializer;

impl EntitySerializer for TaskSerializer {
    fn kind(&self) -> EntityKind {
        EntityKind::Task
    }

    fn directory(&self) -> &'static str {
        "tasks"
    }

    fn layout(&self) -> Layout {
        Layout::ByOwner
    }

    fn serialize(&self, entity: &Entity, _ctx: &SerializeContext) -> Result<FileSet, SerializeError> {
        let Entity::Task(task) = entity else {
            return Err(wrong_kind(EntityKind::Task, entity));
        };

        let header = TaskHeader {
            id: task.id.clone(),
            workflow_id: task.workflow_id.clone(),
            title: task.title.clone(),
            status: task.status,
            assigned_agent_id: task.assigned_agent_id.clone(),
            created_at: task.created_at,
            updated_at: Some(task.updated_at),
        };

        Ok(FileSet::single(FileUnit {
            directory: join_path(self.directory(), &sanitize_segment(&task.workflow_id)),
            filename: format!("{}.{}", sanitize_segment(&task.id), self.extension()),
            content: frontmatter::render(&header, &task.description)?,
        }))
    }

    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError> {
        let (header, body): (TaskHeader, String) = frontmatter::parse(input.content)?;
        if header.id.trim().is_empty() {
            return Err(SerializeError::Invalid(format!("{}: empty id", input.filename)));
        }

        Ok(Some(Entity::Task(Task {
            id: header.id,
            workflow_id: header.workflow_id,
            title: header.title,
            description: body,
            status: header.status,
            assigned_agent_id: header.assigned_agent_id,
            created_at: header.created_at,
            updated_at: header.updated_at.unwrap_or(input.metadata.last_modified),
        })))
    }
}
