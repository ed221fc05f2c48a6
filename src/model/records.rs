//! Entity records held by the application database.
//!
//! Every record carries `created_at` / `updated_at`. Import conflict
//! resolution compares `updated_at` for all of them; records that are only
//! ever created keep `updated_at == created_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An agent definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier (e.g. "ag_123")
    pub id: String,

    /// URL-safe name used for the on-disk filename when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Display name
    pub name: String,

    /// Short role description
    #[serde(default)]
    pub role: String,

    /// System instructions (markdown body)
    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; deleted agents are not exported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Create a new agent with `created_at == updated_at == now`.
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            slug: None,
            name: name.to_string(),
            role: String::new(),
            instructions: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A single message within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// "user", "assistant" or "system"
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A conversation between the user and one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A long-term memory learned by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    /// Owning agent; memories are namespaced on disk by this id
    pub agent_id: String,
    #[serde(default)]
    pub category: String,
    pub content: String,
    /// 0.0 - 1.0
    #[serde(default)]
    pub importance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Stored content of a knowledge item.
///
/// Binary payloads are carried as base64 text so the record stays plain
/// JSON in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum KnowledgeContent {
    Text(String),
    Base64(String),
}

/// A document in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    /// Original file name (e.g. "report.pdf")
    pub name: String,
    /// Folder path inside the knowledge base, `/`-separated, may be empty
    #[serde(default)]
    pub path: String,
    pub mime_type: String,
    pub content: KnowledgeContent,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A unit of work inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Owning workflow; tasks are namespaced on disk by this id
    pub workflow_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One generated image attached to a studio entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioImage {
    pub id: String,
    /// File format / extension ("png", "webp", ...)
    pub format: String,
    pub mime_type: String,
    /// Base64-encoded image bytes
    pub data: String,
}

/// A prompt and the images generated from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudioEntry {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub images: Vec<StudioImage>,
    pub created_at: DateTime<Utc>,
    /// Advances when images are added or removed
    pub updated_at: DateTime<Utc>,
}
