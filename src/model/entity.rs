//! The entity sum type and the synchronized categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::records::{Agent, Conversation, KnowledgeItem, Memory, StudioEntry, Task};

/// One synchronized entity category.
///
/// The declaration order is the order categories are exported and imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent,
    Conversation,
    Memory,
    Knowledge,
    Task,
    Studio,
}

impl EntityKind {
    /// Every category, in pass order.
    pub const ALL: [Self; 6] = [
        Self::Agent,
        Self::Conversation,
        Self::Memory,
        Self::Knowledge,
        Self::Task,
        Self::Studio,
    ];

    /// Get the string representation used in markers, events and storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Conversation => "conversation",
            Self::Memory => "memory",
            Self::Knowledge => "knowledge",
            Self::Task => "task",
            Self::Studio => "studio",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" | "agents" => Ok(Self::Agent),
            "conversation" | "conversations" => Ok(Self::Conversation),
            "memory" | "memories" => Ok(Self::Memory),
            "knowledge" => Ok(Self::Knowledge),
            "task" | "tasks" => Ok(Self::Task),
            "studio" | "studio_entry" | "studio-entries" => Ok(Self::Studio),
            _ => Err(format!("Unknown entity type: {s}")),
        }
    }
}

/// Tagged union over every synchronized record type.
///
/// Serialized as `{"kind":"agent","id":"a1",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Agent(Agent),
    Conversation(Conversation),
    Memory(Memory),
    Knowledge(KnowledgeItem),
    Task(Task),
    Studio(StudioEntry),
}

impl Entity {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Agent(_) => EntityKind::Agent,
            Self::Conversation(_) => EntityKind::Conversation,
            Self::Memory(_) => EntityKind::Memory,
            Self::Knowledge(_) => EntityKind::Knowledge,
            Self::Task(_) => EntityKind::Task,
            Self::Studio(_) => EntityKind::Studio,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Agent(e) => &e.id,
            Self::Conversation(e) => &e.id,
            Self::Memory(e) => &e.id,
            Self::Knowledge(e) => &e.id,
            Self::Task(e) => &e.id,
            Self::Studio(e) => &e.id,
        }
    }

    /// Timestamp compared by last-write-wins merges.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Agent(e) => e.updated_at,
            Self::Conversation(e) => e.updated_at,
            Self::Memory(e) => e.updated_at,
            Self::Knowledge(e) => e.updated_at,
            Self::Task(e) => e.updated_at,
            Self::Studio(e) => e.updated_at,
        }
    }

    /// Soft-deleted records are skipped by export.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        match self {
            Self::Agent(e) => e.deleted_at.is_some(),
            Self::Conversation(e) => e.deleted_at.is_some(),
            Self::Memory(e) => e.deleted_at.is_some(),
            Self::Knowledge(_) | Self::Task(_) | Self::Studio(_) => false,
        }
    }

    /// Dirty-set marker, `"kind:id"`.
    #[must_use]
    pub fn marker(&self) -> String {
        format!("{}:{}", self.kind(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!("memories".parse::<EntityKind>().unwrap(), EntityKind::Memory);
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_json_is_kind_tagged() {
        let entity = Entity::Agent(Agent::new("a1", "Bot"));
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["kind"], "agent");
        assert_eq!(json["id"], "a1");

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_marker_and_deleted() {
        let mut agent = Agent::new("a1", "Bot");
        assert_eq!(Entity::Agent(agent.clone()).marker(), "agent:a1");
        assert!(!Entity::Agent(agent.clone()).is_deleted());

        agent.deleted_at = Some(Utc::now());
        assert!(Entity::Agent(agent).is_deleted());
    }
}
