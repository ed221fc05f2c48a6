//! Import: files back into the store.
//!
//! Files are discovered per category layout, read in concurrent batches and
//! merged one by one with last-write-wins on `updated_at`: a record missing
//! from the store is inserted, an existing one is replaced only by a strictly
//! newer file. Ties keep the store record.
//!
//! A missing category directory means nothing has been exported yet and is
//! not an error. Unreadable or malformed files are counted as failed; store
//! write failures abort the pass.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::model::Entity;
use crate::serializers::{EntitySerializer, FileInput, FileMetadata, Layout};
use crate::sync::context::{Pass, SyncContext};
use crate::sync::events::{SyncEvent, SyncEventType};
use crate::sync::fs::{DirHandle, SyncFs};
use crate::sync::hash::content_hash;
use crate::sync::types::{EntityStats, ImportStats, SyncResult, SyncToggles};

/// A metadata file found under a category directory.
#[derive(Debug, Clone)]
struct SourceFile {
    dir: DirHandle,
    name: String,
}

impl SourceFile {
    fn path(&self) -> String {
        self.dir.child_path(&self.name)
    }
}

/// Outcome of merging one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Created,
    Updated,
    Kept,
}

/// Reads the sync root back into the store.
pub(crate) struct Importer<'a> {
    pass: Pass<'a>,
}

impl<'a> Importer<'a> {
    pub fn new(ctx: &'a SyncContext, fs: Arc<dyn SyncFs>) -> Self {
        Self {
            pass: Pass::new(ctx, fs),
        }
    }

    /// Import every enabled category.
    #[tracing::instrument(skip_all, fields(root = %self.pass.fs.label()))]
    pub async fn import(&self, toggles: &SyncToggles) -> SyncResult<ImportStats> {
        let ctx = self.pass.ctx;
        let mut stats = ImportStats::default();

        for kind in toggles.enabled() {
            let Some(serializer) = ctx.serializer(kind) else {
                continue;
            };
            let files = self.list_files(&**serializer).await?;

            let mut kind_stats = EntityStats::default();
            for batch in files.chunks(self.pass.batch_size()) {
                let results =
                    join_all(batch.iter().map(|file| self.read_one(file, &**serializer))).await;

                for (file, result) in batch.iter().zip(results) {
                    let entity = match result {
                        Ok(Some(entity)) => entity,
                        Ok(None) => {
                            kind_stats.skipped += 1;
                            continue;
                        }
                        Err(e) => {
                            warn!(kind = %kind, path = %file.path(), error = %e, "file import failed");
                            kind_stats.failed += 1;
                            continue;
                        }
                    };

                    match self.merge(&entity)? {
                        Merge::Created => kind_stats.created += 1,
                        Merge::Updated => kind_stats.updated += 1,
                        Merge::Kept => {
                            kind_stats.skipped += 1;
                            continue;
                        }
                    }
                    ctx.emit(
                        SyncEvent::new(SyncEventType::FileRead)
                            .with_entity(entity.kind(), entity.id())
                            .with_filename(file.path()),
                    );
                }
            }

            if !files.is_empty() {
                info!(
                    kind = %kind,
                    created = kind_stats.created,
                    updated = kind_stats.updated,
                    skipped = kind_stats.skipped,
                    failed = kind_stats.failed,
                    "category imported"
                );
            }
            stats.categories.insert(kind, kind_stats);
        }

        Ok(stats)
    }

    /// Metadata files of one category, following its layout.
    async fn list_files(&self, serializer: &dyn EntitySerializer) -> SyncResult<Vec<SourceFile>> {
        let top = match self.pass.resolver.resolve(serializer.directory(), false).await {
            Ok(dir) => dir,
            Err(e) if e.is_not_found() => {
                debug!(directory = serializer.directory(), "nothing to import");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        match serializer.layout() {
            Layout::Flat => self.collect_files(&top, serializer, &mut files).await?,
            Layout::ByOwner => {
                for owner in self.subdirectories(&top).await? {
                    self.collect_files(&owner, serializer, &mut files).await?;
                }
            }
            Layout::Nested => {
                let mut pending = vec![top];
                while let Some(dir) = pending.pop() {
                    self.collect_files(&dir, serializer, &mut files).await?;
                    pending.extend(self.subdirectories(&dir).await?);
                }
            }
        }
        Ok(files)
    }

    async fn collect_files(
        &self,
        dir: &DirHandle,
        serializer: &dyn EntitySerializer,
        files: &mut Vec<SourceFile>,
    ) -> SyncResult<()> {
        let entries = match self.pass.fs.list_entries(dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        files.extend(
            entries
                .into_iter()
                .filter(|entry| entry.is_file() && serializer.matches(&entry.name))
                .map(|entry| SourceFile {
                    dir: dir.clone(),
                    name: entry.name,
                }),
        );
        Ok(())
    }

    async fn subdirectories(&self, dir: &DirHandle) -> SyncResult<Vec<DirHandle>> {
        let entries = match self.pass.fs.list_entries(dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut dirs = Vec::new();
        for entry in entries.into_iter().filter(|entry| entry.is_dir()) {
            match self.pass.fs.get_subdir(dir, &entry.name, false).await {
                Ok(child) => dirs.push(child),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(dirs)
    }

    /// Read one metadata file and its companions, then deserialize.
    ///
    /// Companions are discovered from the front matter first. A companion
    /// that is absent on disk is left out and reported by the deserializer.
    async fn read_one(
        &self,
        file: &SourceFile,
        serializer: &dyn EntitySerializer,
    ) -> SyncResult<Option<Entity>> {
        let fs = &self.pass.fs;
        let contents = fs.read_file(&file.dir, &file.name).await?;
        let text = contents.text()?;

        let mut companions = HashMap::new();
        let mut hashes = Vec::new();
        for companion in serializer.companion_files(&text)? {
            let data = match fs.read_file(&file.dir, &companion.filename).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let value = if companion.binary {
                data.base64()
            } else {
                data.text()?
            };
            hashes.push((file.dir.child_path(&companion.filename), content_hash(&value)));
            companions.insert(companion.filename, value);
        }

        let input = FileInput {
            content: &text,
            filename: &file.name,
            directory: file.dir.path(),
            metadata: FileMetadata {
                last_modified: contents.last_modified,
                size: contents.size,
            },
            companions: &companions,
        };
        let entity = serializer.deserialize(&input)?;

        let cache = &self.pass.ctx.cache;
        cache.set(&file.path(), &content_hash(&text));
        for (path, hash) in hashes {
            cache.set(&path, &hash);
        }
        Ok(entity)
    }

    fn merge(&self, incoming: &Entity) -> SyncResult<Merge> {
        let store = &self.pass.ctx.store;
        let outcome = match store.get(incoming.kind(), incoming.id())? {
            None => Merge::Created,
            Some(existing) if incoming.updated_at() > existing.updated_at() => Merge::Updated,
            Some(_) => Merge::Kept,
        };
        if outcome != Merge::Kept {
            store.upsert(incoming)?;
            debug!(marker = %incoming.marker(), ?outcome, "record merged");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Agent, EntityKind, KnowledgeContent, KnowledgeItem, StudioEntry, StudioImage,
    };
    use crate::serializers::{AgentSerializer, SerializeContext, SerializerRegistry};
    use crate::storage::{EntityStore, MemoryStore};
    use crate::sync::context::testing;
    use crate::sync::export::Exporter;
    use crate::sync::fs::MemoryFs;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use chrono::{Duration, Utc};

    async fn export_into(fs: &Arc<MemoryFs>, entities: Vec<Entity>) {
        let ctx = testing::context(
            Arc::new(MemoryStore::with_entities(entities)),
            SerializerRegistry::default(),
        );
        Exporter::new(&ctx, fs.clone())
            .export(&SyncToggles::default())
            .await
            .unwrap();
    }

    fn agent_file(agent: &Agent) -> Vec<u8> {
        AgentSerializer
            .serialize(&Entity::Agent(agent.clone()), &SerializeContext::default())
            .unwrap()
            .metadata_content
            .into_bytes()
    }

    #[tokio::test]
    async fn test_round_trip_into_empty_store() {
        let mut agent = Agent::new("a1", "Bot");
        agent.instructions = "Answer briefly.\n".into();
        let fs = Arc::new(MemoryFs::new("mem"));
        export_into(&fs, vec![Entity::Agent(agent.clone())]).await;

        let store = Arc::new(MemoryStore::new());
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let stats = Importer::new(&ctx, fs.clone())
            .import(&SyncToggles::only(&[EntityKind::Agent]))
            .await
            .unwrap();

        assert_eq!(stats.total_created(), 1);
        assert_eq!(
            store.get(EntityKind::Agent, "a1").unwrap(),
            Some(Entity::Agent(agent))
        );
        assert!(ctx.cache.get("agents/a1.md").is_some());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let existing = Agent::new("a1", "Stored");
        let store = Arc::new(MemoryStore::with_entities([Entity::Agent(existing.clone())]));
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let fs = Arc::new(MemoryFs::new("mem"));
        let importer = Importer::new(&ctx, fs.clone());
        let toggles = SyncToggles::only(&[EntityKind::Agent]);

        let mut older = existing.clone();
        older.name = "Older".into();
        older.updated_at = existing.updated_at - Duration::seconds(60);
        fs.put_file("agents/a1.md", &agent_file(&older), Utc::now());
        let stats = importer.import(&toggles).await.unwrap();
        assert_eq!(stats.categories[&EntityKind::Agent].skipped, 1);

        let mut tie = existing.clone();
        tie.name = "Tie".into();
        fs.put_file("agents/a1.md", &agent_file(&tie), Utc::now());
        importer.import(&toggles).await.unwrap();
        let Some(Entity::Agent(current)) = store.get(EntityKind::Agent, "a1").unwrap() else {
            panic!("agent missing");
        };
        assert_eq!(current.name, "Stored");

        let mut newer = existing.clone();
        newer.name = "Newer".into();
        newer.updated_at = existing.updated_at + Duration::seconds(60);
        fs.put_file("agents/a1.md", &agent_file(&newer), Utc::now());
        let stats = importer.import(&toggles).await.unwrap();
        assert_eq!(stats.total_updated(), 1);
        let Some(Entity::Agent(current)) = store.get(EntityKind::Agent, "a1").unwrap() else {
            panic!("agent missing");
        };
        assert_eq!(current.name, "Newer");
    }

    #[tokio::test]
    async fn test_missing_directories_import_nothing() {
        let store = Arc::new(MemoryStore::new());
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let stats = Importer::new(&ctx, Arc::new(MemoryFs::new("mem")))
            .import(&SyncToggles::default())
            .await
            .unwrap();

        assert_eq!(stats.total_processed(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_does_not_block_others() {
        let fs = Arc::new(MemoryFs::new("mem"));
        fs.put_file("agents/a1.md", &agent_file(&Agent::new("a1", "Bot")), Utc::now());
        fs.put_file("agents/broken.md", b"no header here", Utc::now());
        fs.put_file("agents/notes.txt", b"ignored", Utc::now());

        let store = Arc::new(MemoryStore::new());
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let stats = Importer::new(&ctx, fs)
            .import(&SyncToggles::only(&[EntityKind::Agent]))
            .await
            .unwrap();

        let agent_stats = stats.categories[&EntityKind::Agent];
        assert_eq!(agent_stats.created, 1);
        assert_eq!(agent_stats.failed, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_studio_companions_are_read_back() {
        let now = Utc::now();
        let entry = StudioEntry {
            id: "s1".into(),
            prompt: "A lighthouse at dusk".into(),
            agent_id: Some("a1".into()),
            images: vec![
                StudioImage {
                    id: "img_a".into(),
                    format: "png".into(),
                    mime_type: "image/png".into(),
                    data: STANDARD.encode([0x89, 0x50, 0x4e, 0x47, 0x00]),
                },
                StudioImage {
                    id: "img_b".into(),
                    format: "webp".into(),
                    mime_type: "image/webp".into(),
                    data: STANDARD.encode(b"RIFF....WEBP"),
                },
            ],
            created_at: now,
            updated_at: now,
        };
        let fs = Arc::new(MemoryFs::new("mem"));
        export_into(&fs, vec![Entity::Studio(entry.clone())]).await;

        let store = Arc::new(MemoryStore::new());
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let stats = Importer::new(&ctx, fs)
            .import(&SyncToggles::only(&[EntityKind::Studio]))
            .await
            .unwrap();

        assert_eq!(stats.total_created(), 1);
        assert_eq!(
            store.get(EntityKind::Studio, "s1").unwrap(),
            Some(Entity::Studio(entry))
        );
        assert!(ctx.cache.get("studio/s1/img_b.webp").is_some());
    }

    #[tokio::test]
    async fn test_nested_knowledge_is_walked() {
        let now = Utc::now();
        let text = KnowledgeItem {
            id: "k1".into(),
            name: "notes.md".into(),
            path: "docs/specs".into(),
            mime_type: "text/markdown".into(),
            content: KnowledgeContent::Text("# Notes\n".into()),
            tags: vec![],
            created_at: now,
            updated_at: now,
        };
        let binary = KnowledgeItem {
            id: "k2".into(),
            name: "report.pdf".into(),
            path: String::new(),
            mime_type: "application/pdf".into(),
            content: KnowledgeContent::Base64(STANDARD.encode(b"%PDF-1.7")),
            tags: vec!["q3".into()],
            created_at: now,
            updated_at: now,
        };
        let fs = Arc::new(MemoryFs::new("mem"));
        export_into(
            &fs,
            vec![
                Entity::Knowledge(text.clone()),
                Entity::Knowledge(binary.clone()),
            ],
        )
        .await;
        assert!(fs.file("knowledge/docs/specs/k1.md").is_some());

        let store = Arc::new(MemoryStore::new());
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let stats = Importer::new(&ctx, fs)
            .import(&SyncToggles::only(&[EntityKind::Knowledge]))
            .await
            .unwrap();

        assert_eq!(stats.total_created(), 2);
        assert_eq!(
            store.get(EntityKind::Knowledge, "k1").unwrap(),
            Some(Entity::Knowledge(text))
        );
        assert_eq!(
            store.get(EntityKind::Knowledge, "k2").unwrap(),
            Some(Entity::Knowledge(binary))
        );
    }

    #[tokio::test]
    async fn test_missing_companion_fails_that_file() {
        let now = Utc::now();
        let entry = StudioEntry {
            id: "s1".into(),
            prompt: "Fog".into(),
            agent_id: None,
            images: vec![StudioImage {
                id: "img_a".into(),
                format: "png".into(),
                mime_type: "image/png".into(),
                data: STANDARD.encode([1, 2, 3]),
            }],
            created_at: now,
            updated_at: now,
        };
        let source = Arc::new(MemoryFs::new("mem"));
        export_into(&source, vec![Entity::Studio(entry)]).await;

        let fs = Arc::new(MemoryFs::new("mem"));
        let metadata = source.file("studio/s1/s1.md").unwrap();
        fs.put_file("studio/s1/s1.md", &metadata, now);

        let store = Arc::new(MemoryStore::new());
        let ctx = testing::context(store.clone(), SerializerRegistry::default());
        let stats = Importer::new(&ctx, fs)
            .import(&SyncToggles::only(&[EntityKind::Studio]))
            .await
            .unwrap();

        assert_eq!(stats.total_failed(), 1);
        assert!(store.is_empty());
    }
}
