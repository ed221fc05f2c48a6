//! Conversations: `conversations/<id>.md`.
//!
//! Messages live in the front matter. The body is a rendered transcript for
//! reading and is ignored on import.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntitySerializer, FileInput, FileSet, FileUnit, SerializeContext, SerializeError, frontmatter,
    sanitize_segment, wrong_kind,
};
use crate::model::{Conversation, Entity, EntityKind, Message};

#[derive(Debug, Serialize, Deserialize)]
struct ConversationHeader {
    id: String,
    agent_id: String,
    /// Slug of the owning agent at export time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Conversation files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationSerializer;

fn transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    if !conversation.title.is_empty() {
        let _ = writeln!(out, "# {}\n", conversation.title);
    }
    for message in &conversation.messages {
        let _ = writeln!(
            out,
            "**{}** ({})\n\n{}\n",
            message.role,
            message.timestamp.to_rfc3339(),
            message.content
        );
    }
    out
}

impl EntitySerializer for ConversationSerializer {
    fn kind(&self) -> EntityKind {
        EntityKind::Conversation
    }

    fn directory(&self) -> &'static str {
        "conversations"
    }

    fn serialize(&self, entity: &Entity, ctx: &SerializeContext) -> Result<FileSet, SerializeError> {
        let Entity::Conversation(conversation) = entity else {
            return Err(wrong_kind(EntityKind::Conversation, entity));
        };

        let header = ConversationHeader {
            id: conversation.id.clone(),
            agent_id: conversation.agent_id.clone(),
            agent: ctx.agent_slug(&conversation.agent_id).map(str::to_string),
            title: conversation.title.clone(),
            messages: conversation.messages.clone(),
            created_at: conversation.created_at,
            updated_at: Some(conversation.updated_at),
        };

        Ok(FileSet::single(FileUnit {
            directory: self.directory().to_string(),
            filename: format!("{}.{}", sanitize_segment(&conversation.id), self.extension()),
            content: frontmatter::render(&header, &transcript(conversation))?,
        }))
    }

    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError> {
        let (header, _body): (ConversationHeader, String) = frontmatter::parse(input.content)?;
        if header.id.trim().is_empty() {
            return Err(SerializeError::Invalid(format!("{}: empty id", input.filename)));
        }

        Ok(Some(Entity::Conversation(Conversation {
            id: header.id,
            agent_id: header.agent_id,
            title: header.title,
            messages: header.messages,
            created_at: header.created_at,
            updated_at: header.updated_at.unwrap_or(input.metadata.last_modified),
            deleted_at: None,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::FileMetadata;
    use std::collections::HashMap;

    fn conversation() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: "c1".into(),
            agent_id: "a1".into(),
            title: "Planning".into(),
            messages: vec![
                Message {
                    id: "m1".into(),
                    role: "user".into(),
                    content: "Hi".into(),
                    timestamp: now,
                },
                Message {
                    id: "m2".into(),
                    role: "assistant".into(),
                    content: "Hello!\nHow can I help?".into(),
                    timestamp: now,
                },
            ],
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_messages_survive_round_trip() {
        let mut ctx = SerializeContext::default();
        ctx.agent_slugs.insert("a1".into(), "planner".into());

        let original = conversation();
        let set = ConversationSerializer
            .serialize(&Entity::Conversation(original.clone()), &ctx)
            .unwrap();
        assert_eq!(set.metadata().path(), "conversations/c1.md");
        assert!(set.metadata_content.contains("agent: planner"));
        assert!(set.metadata_content.contains("# Planning"));

        let companions = HashMap::new();
        let back = ConversationSerializer
            .deserialize(&FileInput {
                content: &set.metadata_content,
                filename: "c1.md",
                directory: "conversations",
                metadata: FileMetadata {
                    last_modified: Utc::now(),
                    size: 0,
                },
                companions: &companions,
            })
            .unwrap();
        assert_eq!(back, Some(Entity::Conversation(original)));
    }

    #[test]
    fn test_slug_context_changes_content() {
        let entity = Entity::Conversation(conversation());
        let plain = ConversationSerializer
            .serialize(&entity, &SerializeContext::default())
            .unwrap();
        let mut ctx = SerializeContext::default();
        ctx.agent_slugs.insert("a1".into(), "planner".into());
        let with_slug = ConversationSerializer.serialize(&entity, &ctx).unwrap();

        assert_ne!(plain.metadata_content, with_slug.metadata_content);
    }
}
