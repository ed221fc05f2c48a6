//! Data models for the synchronized application database.
//!
//! This module contains the entity records mirrored to disk:
//! - Agent
//! - Conversation
//! - Memory
//! - KnowledgeItem
//! - Task
//! - StudioEntry
//!
//! [`Entity`] is the tagged union the engine moves between the store and the
//! serializers; [`EntityKind`] names one synchronized category.

pub mod entity;
pub mod records;

pub use entity::{Entity, EntityKind};
pub use records::{
    Agent, Conversation, KnowledgeContent, KnowledgeItem, Memory, Message, StudioEntry,
    StudioImage, Task, TaskStatus,
};
