//! Removal of entity files from the sync root.
//!
//! Every removed path also leaves the hash cache. Anything already absent
//! counts as removed.

use std::sync::Arc;

use tracing::debug;

use crate::model::{Entity, EntityKind};
use crate::serializers::{EntitySerializer, StudioSerializer, join_path, sanitize_segment};
use crate::sync::context::{Pass, SyncContext};
use crate::sync::events::{SyncEvent, SyncEventType};
use crate::sync::fs::{DirHandle, SyncFs};
use crate::sync::types::SyncResult;

pub(crate) struct Deleter<'a> {
    pass: Pass<'a>,
}

impl<'a> Deleter<'a> {
    pub fn new(ctx: &'a SyncContext, fs: Arc<dyn SyncFs>) -> Self {
        Self {
            pass: Pass::new(ctx, fs),
        }
    }

    async fn resolve_existing(&self, path: &str) -> SyncResult<Option<DirHandle>> {
        match self.pass.resolver.resolve(path, false).await {
            Ok(dir) => Ok(Some(dir)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove one file, treating absence as success. Returns whether a file
    /// was actually removed.
    async fn remove_file(&self, dir: &DirHandle, name: &str) -> SyncResult<bool> {
        match self.pass.fs.remove_entry(dir, name, false).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn emit_deleted(&self, kind: EntityKind, id: &str, path: String) {
        self.pass.ctx.emit(
            SyncEvent::new(SyncEventType::FileDeleted)
                .with_entity(kind, id)
                .with_filename(path),
        );
    }

    /// Remove every file `entity` serializes to. Returns the number of files
    /// removed.
    pub async fn delete_entity_file(
        &self,
        entity: &Entity,
        serializer: &dyn EntitySerializer,
    ) -> SyncResult<usize> {
        let ctx = self.pass.ctx;
        let set = serializer.serialize(entity, &ctx.serialize_context()?)?;
        let names = std::iter::once(set.metadata_filename.as_str())
            .chain(set.companions.iter().map(|c| c.filename.as_str()));

        let dir = self.resolve_existing(&set.directory).await?;
        let mut removed = 0;
        for name in names {
            let path = join_path(&set.directory, name);
            if let Some(dir) = &dir {
                if self.remove_file(dir, name).await? {
                    removed += 1;
                    debug!(%path, "file removed");
                    self.emit_deleted(entity.kind(), entity.id(), path.clone());
                }
            }
            ctx.cache.remove(&path);
        }

        ctx.dirty.clear(entity);
        Ok(removed)
    }

    /// Remove a studio entry's whole folder. Returns the number of cached
    /// paths dropped.
    pub async fn delete_studio_entry(&self, entry_id: &str) -> SyncResult<usize> {
        let folder = StudioSerializer::entry_directory(entry_id);
        if let Some(studio) = self.resolve_existing(StudioSerializer.directory()).await? {
            match self
                .pass
                .fs
                .remove_entry(&studio, &sanitize_segment(entry_id), true)
                .await
            {
                Ok(()) => {
                    debug!(%folder, "studio folder removed");
                    self.emit_deleted(EntityKind::Studio, entry_id, folder.clone());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(self.pass.ctx.cache.remove_dir(&folder))
    }

    /// Remove the file(s) of one image inside a studio entry's folder.
    /// Returns the number of files removed.
    pub async fn delete_studio_image(&self, entry_id: &str, image_id: &str) -> SyncResult<usize> {
        let folder = StudioSerializer::entry_directory(entry_id);
        let Some(dir) = self.resolve_existing(&folder).await? else {
            return Ok(0);
        };

        let metadata_file = format!(
            "{}.{}",
            sanitize_segment(entry_id),
            StudioSerializer.extension()
        );
        let entries = match self.pass.fs.list_entries(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries
            .iter()
            .filter(|entry| {
                entry.is_file()
                    && entry.name != metadata_file
                    && StudioSerializer::is_image_file(&entry.name, image_id)
            })
        {
            let path = dir.child_path(&entry.name);
            if self.remove_file(&dir, &entry.name).await? {
                removed += 1;
                self.emit_deleted(EntityKind::Studio, entry_id, path.clone());
            }
            self.pass.ctx.cache.remove(&path);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, StudioEntry, StudioImage};
    use crate::serializers::{AgentSerializer, SerializeContext, SerializerRegistry};
    use crate::storage::MemoryStore;
    use crate::sync::context::testing;
    use crate::sync::export::Exporter;
    use crate::sync::fs::MemoryFs;
    use crate::sync::types::SyncToggles;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use chrono::Utc;
    use std::sync::Mutex;

    fn studio_entry() -> Entity {
        let now = Utc::now();
        Entity::Studio(StudioEntry {
            id: "s1".into(),
            prompt: "Harbor".into(),
            agent_id: None,
            images: vec![
                StudioImage {
                    id: "img_a".into(),
                    format: "png".into(),
                    mime_type: "image/png".into(),
                    data: STANDARD.encode([1, 2, 3]),
                },
                StudioImage {
                    id: "img_b".into(),
                    format: "png".into(),
                    mime_type: "image/png".into(),
                    data: STANDARD.encode([4, 5, 6]),
                },
            ],
            created_at: now,
            updated_at: now,
        })
    }

    async fn exported(entities: Vec<Entity>) -> (SyncContext, Arc<MemoryFs>) {
        let ctx = testing::context(
            Arc::new(MemoryStore::with_entities(entities)),
            SerializerRegistry::default(),
        );
        let fs = Arc::new(MemoryFs::new("mem"));
        Exporter::new(&ctx, fs.clone())
            .export(&SyncToggles::default())
            .await
            .unwrap();
        (ctx, fs)
    }

    #[tokio::test]
    async fn test_delete_entity_file() {
        let agent = Entity::Agent(Agent::new("a1", "Bot"));
        let (ctx, fs) = exported(vec![agent.clone()]).await;
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&deleted);
        let _sub = ctx.events.subscribe(move |event| {
            if event.event_type == SyncEventType::FileDeleted {
                sink.lock().unwrap().push(event.filename.clone().unwrap());
            }
        });

        let deleter = Deleter::new(&ctx, fs.clone());
        assert_eq!(deleter.delete_entity_file(&agent, &AgentSerializer).await.unwrap(), 1);
        assert!(fs.file("agents/a1.md").is_none());
        assert!(ctx.cache.get("agents/a1.md").is_none());
        assert_eq!(*deleted.lock().unwrap(), vec!["agents/a1.md".to_string()]);

        assert_eq!(deleter.delete_entity_file(&agent, &AgentSerializer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_when_directory_missing_is_ok() {
        let ctx = testing::context(Arc::new(MemoryStore::new()), SerializerRegistry::default());
        let deleter = Deleter::new(&ctx, Arc::new(MemoryFs::new("mem")));

        let agent = Entity::Agent(Agent::new("a1", "Bot"));
        assert_eq!(deleter.delete_entity_file(&agent, &AgentSerializer).await.unwrap(), 0);
        assert_eq!(deleter.delete_studio_entry("s1").await.unwrap(), 0);
        assert_eq!(deleter.delete_studio_image("s1", "img_a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_studio_entry_deep_delete() {
        let (ctx, fs) = exported(vec![studio_entry()]).await;
        assert_eq!(fs.file_paths().len(), 3);
        assert_eq!(ctx.cache.len(), 3);

        let deleter = Deleter::new(&ctx, fs.clone());
        assert_eq!(deleter.delete_studio_entry("s1").await.unwrap(), 3);

        assert!(fs.file_paths().is_empty());
        assert!(ctx.cache.is_empty());
        let studio = fs.get_subdir(&fs.root(), "studio", false).await.unwrap();
        assert!(
            fs.get_subdir(&studio, "s1", false)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_studio_image_delete_keeps_siblings() {
        let (ctx, fs) = exported(vec![studio_entry()]).await;

        let deleter = Deleter::new(&ctx, fs.clone());
        assert_eq!(deleter.delete_studio_image("s1", "img_b").await.unwrap(), 1);

        assert_eq!(
            fs.file_paths(),
            vec!["studio/s1/img_a.png".to_string(), "studio/s1/s1.md".to_string()]
        );
        assert!(ctx.cache.get("studio/s1/img_b.png").is_none());
        assert!(ctx.cache.get("studio/s1/img_a.png").is_some());
    }

    fn image(id: &str, byte: u8) -> StudioImage {
        StudioImage {
            id: id.into(),
            format: "png".into(),
            mime_type: "image/png".into(),
            data: STANDARD.encode([byte]),
        }
    }

    #[tokio::test]
    async fn test_studio_image_delete_matches_whole_id() {
        let Entity::Studio(mut entry) = studio_entry() else {
            unreachable!()
        };
        entry.images = vec![image("b", 1), image("x-b", 2), image("s1", 3)];
        let (ctx, fs) = exported(vec![Entity::Studio(entry)]).await;

        let deleter = Deleter::new(&ctx, fs.clone());
        assert_eq!(deleter.delete_studio_image("s1", "b").await.unwrap(), 1);
        assert_eq!(
            fs.file_paths(),
            vec![
                "studio/s1/s1.md".to_string(),
                "studio/s1/s1.png".to_string(),
                "studio/s1/x-b.png".to_string(),
            ]
        );

        // An image sharing the entry's id never takes the metadata file with it
        assert_eq!(deleter.delete_studio_image("s1", "s1").await.unwrap(), 1);
        assert_eq!(
            fs.file_paths(),
            vec!["studio/s1/s1.md".to_string(), "studio/s1/x-b.png".to_string()]
        );
        assert!(ctx.cache.get("studio/s1/s1.md").is_some());
    }

    #[tokio::test]
    async fn test_removing_middle_image_leaves_no_orphans() {
        let Entity::Studio(mut entry) = studio_entry() else {
            unreachable!()
        };
        entry.images = vec![image("a", 1), image("b", 2), image("c", 3)];
        let (ctx, fs) = exported(vec![Entity::Studio(entry.clone())]).await;

        let deleter = Deleter::new(&ctx, fs.clone());
        assert_eq!(deleter.delete_studio_image("s1", "a").await.unwrap(), 1);

        entry.images.remove(0);
        entry.updated_at = Utc::now();
        Exporter::new(&ctx, fs.clone())
            .write_entity(
                &Entity::Studio(entry),
                &StudioSerializer,
                &SerializeContext::default(),
            )
            .await
            .unwrap();

        let expected = vec![
            "studio/s1/b.png".to_string(),
            "studio/s1/c.png".to_string(),
            "studio/s1/s1.md".to_string(),
        ];
        assert_eq!(fs.file_paths(), expected);
        assert_eq!(ctx.cache.paths(), expected);
    }
}
