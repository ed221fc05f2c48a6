//! Per-category converters between entities and files.
//!
//! Every category has one [`EntitySerializer`]. Serializers are pure: they
//! never touch the filesystem. The engine decides where, when and whether to
//! write the [`FileSet`] a serializer produces, and feeds file contents back
//! through [`EntitySerializer::deserialize`] on import.
//!
//! # File format
//!
//! All categories write Markdown with YAML front matter (`.md`). Knowledge
//! items with binary content and studio entries with images additionally
//! produce companion files next to the metadata file.

pub mod frontmatter;

mod agent;
mod conversation;
mod knowledge;
mod memory;
mod studio;
mod task;

pub use agent::AgentSerializer;
pub use conversation::ConversationSerializer;
pub use knowledge::KnowledgeSerializer;
pub use memory::MemorySerializer;
pub use studio::StudioSerializer;
pub use task::TaskSerializer;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::{Entity, EntityKind};

/// Serializer failures. Always scoped to one entity or one file.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// File does not start with a `---` header.
    #[error("missing front matter header")]
    MissingFrontMatter,

    /// Header is not valid YAML for this category.
    #[error("front matter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serializer was handed an entity of another category.
    #[error("expected a {expected} entity, got {actual}")]
    WrongKind {
        expected: EntityKind,
        actual: EntityKind,
    },

    /// A companion file referenced by the metadata was not supplied.
    #[error("companion file missing: {0}")]
    MissingCompanion(String),

    /// The record is structurally invalid.
    #[error("invalid record: {0}")]
    Invalid(String),
}

/// A single serialized file: `{directory, filename, content}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUnit {
    /// `/`-separated directory relative to the sync root.
    pub directory: String,
    pub filename: String,
    pub content: String,
}

impl FileUnit {
    /// Relative path used as the hash-cache key.
    #[must_use]
    pub fn path(&self) -> String {
        join_path(&self.directory, &self.filename)
    }
}

/// Content of a companion file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionContent {
    Text(String),
    /// Base64 text, decoded to raw bytes before writing.
    Base64(String),
}

impl CompanionContent {
    /// The string the hash is computed over.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Base64(s) => s,
        }
    }
}

/// A binary-bearing (or text) sibling of a metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionFile {
    pub filename: String,
    pub content: CompanionContent,
}

/// One metadata file plus zero or more companion files, all in one
/// directory and each hash-tracked independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    pub directory: String,
    pub metadata_filename: String,
    pub metadata_content: String,
    pub companions: Vec<CompanionFile>,
}

impl FileSet {
    /// A set holding only the metadata file.
    #[must_use]
    pub fn single(unit: FileUnit) -> Self {
        Self {
            directory: unit.directory,
            metadata_filename: unit.filename,
            metadata_content: unit.content,
            companions: Vec::new(),
        }
    }

    /// The metadata file on its own.
    #[must_use]
    pub fn metadata(&self) -> FileUnit {
        FileUnit {
            directory: self.directory.clone(),
            filename: self.metadata_filename.clone(),
            content: self.metadata_content.clone(),
        }
    }

    /// Relative paths of every file in the set.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        std::iter::once(&self.metadata_filename)
            .chain(self.companions.iter().map(|c| &c.filename))
            .map(|name| join_path(&self.directory, name))
            .collect()
    }
}

/// A companion file the metadata refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionRef {
    pub filename: String,
    /// Read as base64 when true, as UTF-8 text otherwise.
    pub binary: bool,
}

/// Filesystem facts handed to deserializers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Everything a deserializer gets for one file.
#[derive(Debug, Clone)]
pub struct FileInput<'a> {
    pub content: &'a str,
    pub filename: &'a str,
    /// Directory of the file relative to the sync root.
    pub directory: &'a str,
    pub metadata: FileMetadata,
    /// Companion contents keyed by filename (base64 for binary companions).
    pub companions: &'a HashMap<String, String>,
}

/// Cross-entity lookups some serializers need.
#[derive(Debug, Clone, Default)]
pub struct SerializeContext {
    /// Agent id -> slug.
    pub agent_slugs: HashMap<String, String>,
}

impl SerializeContext {
    #[must_use]
    pub fn agent_slug(&self, agent_id: &str) -> Option<&str> {
        self.agent_slugs.get(agent_id).map(String::as_str)
    }
}

/// How a category lays its files out under its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<dir>/<file>`
    Flat,
    /// `<dir>/<owner>/<file>` (memories by agent, tasks by workflow,
    /// studio entries by entry id)
    ByOwner,
    /// `<dir>/<any/depth>/<file>`
    Nested,
}

/// Converter between one entity category and its files.
pub trait EntitySerializer: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Top-level directory under the sync root.
    fn directory(&self) -> &'static str;

    /// Extension of the metadata file, without the dot.
    fn extension(&self) -> &'static str {
        "md"
    }

    fn layout(&self) -> Layout {
        Layout::Flat
    }

    /// Serialize one entity into its file set.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity belongs to another category or cannot
    /// be rendered.
    fn serialize(&self, entity: &Entity, ctx: &SerializeContext) -> Result<FileSet, SerializeError>;

    /// Rebuild an entity from its metadata file (and companions).
    ///
    /// Returns `Ok(None)` for files that parse but do not describe an
    /// entity of this category.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed.
    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError>;

    /// Companion files referenced by a metadata file, discovered from its
    /// front matter before the full deserialize.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be parsed.
    fn companion_files(&self, _metadata_content: &str) -> Result<Vec<CompanionRef>, SerializeError> {
        Ok(Vec::new())
    }

    /// Whether `filename` is a metadata file of this category.
    fn matches(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext == self.extension())
    }
}

/// Serializers keyed by category.
#[derive(Clone)]
pub struct SerializerRegistry {
    by_kind: BTreeMap<EntityKind, Arc<dyn EntitySerializer>>,
}

impl SerializerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_kind: BTreeMap::new(),
        }
    }

    /// Register (or replace) the serializer for its category.
    #[must_use]
    pub fn with(mut self, serializer: Arc<dyn EntitySerializer>) -> Self {
        self.by_kind.insert(serializer.kind(), serializer);
        self
    }

    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Option<&Arc<dyn EntitySerializer>> {
        self.by_kind.get(&kind)
    }

    /// Registered serializers in pass order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EntitySerializer>> {
        self.by_kind.values()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(AgentSerializer))
            .with(Arc::new(ConversationSerializer))
            .with(Arc::new(MemorySerializer))
            .with(Arc::new(KnowledgeSerializer))
            .with(Arc::new(TaskSerializer))
            .with(Arc::new(StudioSerializer))
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.by_kind.keys()).finish()
    }
}

/// Join a `/`-separated directory and a filename.
#[must_use]
pub fn join_path(directory: &str, filename: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        filename.to_string()
    } else {
        format!("{directory}/{filename}")
    }
}

/// Make a string safe to use as one path segment.
///
/// Path separators, reserved characters and whitespace become `_`.
#[must_use]
pub fn sanitize_segment(value: &str) -> String {
    let sanitized: String = value
        .trim()
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_whitespace()
            {
                '_'
            } else {
                c
            }
        })
        .take(120)
        .collect();

    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}

pub(crate) fn wrong_kind(expected: EntityKind, entity: &Entity) -> SerializeError {
    SerializeError::WrongKind {
        expected,
        actual: entity.kind(),
    }
}
