//! Studio entries: one folder per entry.
//!
//! ```text
//! studio/<entryId>/<entryId>.md
//! studio/<entryId>/<imageId>.png
//! studio/<entryId>/<imageId>.webp
//! ```
//!
//! The prompt is the body. Each image is listed in the front matter with the
//! companion file holding its bytes. Image files are named by id alone, so
//! adding or removing one image never renames its siblings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CompanionContent, CompanionFile, CompanionRef, EntitySerializer, FileInput, FileSet, Layout,
    SerializeContext, SerializeError, frontmatter, join_path, sanitize_segment, wrong_kind,
};
use crate::model::{Entity, EntityKind, StudioEntry, StudioImage};

#[derive(Debug, Serialize, Deserialize)]
struct ImageRef {
    id: String,
    file: String,
    format: String,
    mime_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StudioHeader {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(default)]
    images: Vec<ImageRef>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Studio entry folders.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudioSerializer;

impl StudioSerializer {
    /// Folder holding every file of one entry.
    #[must_use]
    pub fn entry_directory(entry_id: &str) -> String {
        join_path("studio", &sanitize_segment(entry_id))
    }

    /// Filename of one image inside its entry's folder.
    #[must_use]
    pub fn image_filename(image: &StudioImage) -> String {
        format!(
            "{}.{}",
            sanitize_segment(&image.id),
            sanitize_segment(&image.format)
        )
    }

    /// Whether `filename` holds the bytes of image `image_id`, whatever its
    /// format.
    #[must_use]
    pub fn is_image_file(filename: &str, image_id: &str) -> bool {
        filename
            .strip_prefix(sanitize_segment(image_id).as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|ext| !ext.is_empty() && !ext.contains('.'))
    }
}

impl EntitySerializer for StudioSerializer {
    fn kind(&self) -> EntityKind {
        EntityKind::Studio
    }

    fn directory(&self) -> &'static str {
        "studio"
    }

    fn layout(&self) -> Layout {
        Layout::ByOwner
    }

    fn serialize(&self, entity: &Entity, _ctx: &SerializeContext) -> Result<FileSet, SerializeError> {
        let Entity::Studio(entry) = entity else {
            return Err(wrong_kind(EntityKind::Studio, entity));
        };

        let mut images = Vec::with_capacity(entry.images.len());
        let mut companions = Vec::with_capacity(entry.images.len());
        for image in &entry.images {
            let file = Self::image_filename(image);
            images.push(ImageRef {
                id: image.id.clone(),
                file: file.clone(),
                format: image.format.clone(),
                mime_type: image.mime_type.clone(),
            });
            companions.push(CompanionFile {
                filename: file,
                content: CompanionContent::Base64(image.data.clone()),
            });
        }

        let header = StudioHeader {
            id: entry.id.clone(),
            agent_id: entry.agent_id.clone(),
            images,
            created_at: entry.created_at,
            updated_at: Some(entry.updated_at),
        };

        Ok(FileSet {
            directory: Self::entry_directory(&entry.id),
            metadata_filename: format!("{}.{}", sanitize_segment(&entry.id), self.extension()),
            metadata_content: frontmatter::render(&header, &entry.prompt)?,
            companions,
        })
    }

    fn companion_files(&self, metadata_content: &str) -> Result<Vec<CompanionRef>, SerializeError> {
        let (header, _): (StudioHeader, String) = frontmatter::parse(metadata_content)?;
        Ok(header
            .images
            .into_iter()
            .map(|image| CompanionRef {
                filename: image.file,
                binary: true,
            })
            .collect())
    }

    fn deserialize(&self, input: &FileInput<'_>) -> Result<Option<Entity>, SerializeError> {
        let (header, body): (StudioHeader, String) = frontmatter::parse(input.content)?;
        if header.id.trim().is_empty() {
            return Err(SerializeError::Invalid(format!("{}: empty id", input.filename)));
        }

        let images = header
            .images
            .into_iter()
            .map(|image| {
                let data = input
                    .companions
                    .get(&image.file)
                    .cloned()
                    .ok_or_else(|| SerializeError::MissingCompanion(image.file.clone()))?;
                Ok(StudioImage {
                    id: image.id,
                    format: image.format,
                    mime_type: image.mime_type,
                    data,
                })
            })
            .collect::<Result<Vec<_>, SerializeError>>()?;

        Ok(Some(Entity::Studio(StudioEntry {
            id: header.id,
            prompt: body,
            agent_id: header.agent_id,
            images,
            created_at: header.created_at,
            updated_at: header.updated_at.unwrap_or(input.metadata.last_modified),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::FileMetadata;
    use std::collections::HashMap;

    fn entry() -> StudioEntry {
        let now = Utc::now();
        StudioEntry {
            id: "s1".into(),
            prompt: "A lighthouse at dusk".into(),
            agent_id: None,
            images: vec![
                StudioImage {
                    id: "img_a".into(),
                    format: "png".into(),
                    mime_type: "image/png".into(),
                    data: "iVBORw0KGgo=".into(),
                },
                StudioImage {
                    id: "img_b".into(),
                    format: "webp".into(),
                    mime_type: "image/webp".into(),
                    data: "UklGRg==".into(),
                },
            ],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_entry_gets_its_own_folder() {
        let set = StudioSerializer
            .serialize(&Entity::Studio(entry()), &SerializeContext::default())
            .unwrap();
        assert_eq!(
            set.paths(),
            vec![
                "studio/s1/s1.md",
                "studio/s1/img_a.png",
                "studio/s1/img_b.webp"
            ]
        );
        assert!(
            set.companions
                .iter()
                .all(|c| matches!(c.content, CompanionContent::Base64(_)))
        );
    }

    #[test]
    fn test_companions_feed_deserialize() {
        let original = entry();
        let set = StudioSerializer
            .serialize(&Entity::Studio(original.clone()), &SerializeContext::default())
            .unwrap();

        let refs = StudioSerializer
            .companion_files(&set.metadata_content)
            .unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.binary));

        let companions: HashMap<String, String> = set
            .companions
            .iter()
            .map(|c| (c.filename.clone(), c.content.as_str().to_string()))
            .collect();
        let back = StudioSerializer
            .deserialize(&FileInput {
                content: &set.metadata_content,
                filename: "s1.md",
                directory: "studio/s1",
                metadata: FileMetadata {
                    last_modified: Utc::now(),
                    size: 0,
                },
                companions: &companions,
            })
            .unwrap();
        assert_eq!(back, Some(Entity::Studio(original)));
    }

    #[test]
    fn test_image_filename_is_stable_across_removals() {
        let mut entry = entry();
        let before = StudioSerializer::image_filename(&entry.images[1]);
        entry.images.remove(0);
        assert_eq!(StudioSerializer::image_filename(&entry.images[0]), before);
        assert_eq!(before, "img_b.webp");
    }

    #[test]
    fn test_is_image_file_matches_whole_id() {
        assert!(StudioSerializer::is_image_file("b.png", "b"));
        assert!(StudioSerializer::is_image_file("b.webp", "b"));
        assert!(!StudioSerializer::is_image_file("x-b.png", "b"));
        assert!(!StudioSerializer::is_image_file("bb.png", "b"));
        assert!(!StudioSerializer::is_image_file("b.png.tmp", "b"));
        assert!(!StudioSerializer::is_image_file("b", "b"));
        assert!(StudioSerializer::is_image_file("a_b.png", "a b"));
    }
}
