//! Knowledge items: `knowledge/<path>/<id>.md`.
//!
//! Text documents keep their content in the body. Binary documents write
//! the raw bytes to a sibling `<id>-<name>` file named by `binary_file` in
//! the front matter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CompanionContent, CompanionFile, CompanionRef, EntitySerializer, FileInput, FileSet, Layout,
    SerializeContext, SerializeError, frontmatter, sanitize_segment, wrong_kind,
};
use crate::model::{Entity, EntityKind, KnowledgeContent, KnowledgeItem};

#[derive(Debug, Serialize, Deserialize)]
struct KnowledgeHeader {
    id: String,
    name: String,
    #[serde(default)]
    path: String,
    mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binary_file: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Knowledge base files, nested by folder path.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeSerializer;

impl KnowledgeSerializer {
    fn directory_for(&self, path: &str) -> String {
        std::iter::once(self.directory().to_string())
            .chain(
                path.split('/')
                    .filter(|segment| !segment.trim().is_empty())
                    .map(sanitize_segment),
            )
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Companion filename for a binary item.
    #[must_use]
    pub fn binary_filename(item: &KnowledgeItem) -> String {
        format!("{}-{}", sanitize_segment(&item.id), sanitize_segment(&item.name))
    }
}

impl EntitySerializer for KnowledgeSerializer {
    fn kind(&self) -> EntityKind {
        EntityKind::Knowledge
    }

    fn directory(&self) -> &'static str {
        "knowledge"
    }

    fn layout(&self) -> Layout {
        Layout::Nested
    }

    fn serialize(&self, entity: &Entity, _ctx: &SerializeContext) -> Result<FileSet, SerializeError> {
        let Entity::Knowledge(item) = entity else {
            return Err(wrong_kind(EntityKind::Knowledge, entity));
        };

        let (body, companion) = match &item.content {
            KnowledgeContent::Text(text) => (text.as_str(), None),
            KnowledgeContent::Base64(data) => (
                "",
                Some(CompanionFile {
                    filename: Self::binary_filename(item),
                    content: CompanionContent::Base64(data.clone()),
                }),
            ),
        };

        let header = KnowledgeHeader {
            id: item.id.clone(),
            name: item.name.clone(),
            path: item.path.clone(),
            mime_type: item.mime_type.clone(),
            binary_file: companion.as_ref().map(|c| c.filename.clone()),
            tags: item.tags.clone(),
            created_at: item.created_at,
            updated_at: Some(item.updated_at),
        };

        Ok(FileSet {
            directory: self.directory_for(&item.path),
            metadata_filename: format!("{}.{}", sanitize_segment(&item.id), self.extension()),
            metadata_content: frontmatter::render(&header, body)?,
            companions: companion.into_iter().collect(),
        })
    }

    fn companion_files(&self, metadata_content: &str) -> Result<Vec<CompanionRef>, SerializeError> {
        let (header, _): (KnowledgeHeader, String) = frontmatter::parse(metadata_content)?;
        Ok(header
            .binary_file
            .map(|filename| CompanionRef {
                filename,
                binary: true,
            })
            .into_iter()
            .collect())
    }

    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError> {
        let (header, body): (KnowledgeHeader, String) = frontmatter::parse(input.content)?;
        if header.id.trim().is_empty() {
            return Err(SerializeError::Invalid(format!("{}: empty id", input.filename)));
        }

        let content = match &header.binary_file {
            Some(filename) => KnowledgeContent::Base64(
                input
                    .companions
                    .get(filename)
                    .cloned()
                    .ok_or_else(|| SerializeError::MissingCompanion(filename.clone()))?,
            ),
            None => KnowledgeContent::Text(body),
        };

        Ok(Some(Entity::Knowledge(KnowledgeItem {
            id: header.id,
            name: header.name,
            path: header.path,
            mime_type: header.mime_type,
            content,
            tags: header.tags,
            created_at: header.created_at,
            updated_at: header.updated_at.unwrap_or(input.metadata.last_modified),
        })))
    }
}
