//! State shared by the export, import and deletion passes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::config::EngineSettings;
use crate::model::{Entity, EntityKind};
use crate::serializers::{EntitySerializer, SerializeContext, SerializerRegistry};
use crate::storage::EntityStore;
use crate::sync::events::{EventBus, SyncEvent};
use crate::sync::fs::SyncFs;
use crate::sync::hash_cache::HashCache;
use crate::sync::resolver::DirectoryResolver;
use crate::sync::types::{DirtySet, SyncResult};

/// Collaborators every pass needs, owned by the engine.
pub(crate) struct SyncContext {
    pub store: Arc<dyn EntityStore>,
    pub registry: SerializerRegistry,
    pub cache: HashCache,
    pub dirty: DirtySet,
    pub events: EventBus,
    pub settings: EngineSettings,
    pub writes: PathLocks,
}

/// One async lock per relative path.
///
/// Held from the hash check of a file until its digest is cached, so a live
/// write and a pass racing on the same path leave the cache matching disk.
#[derive(Default)]
pub(crate) struct PathLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub async fn lock(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

impl SyncContext {
    /// Cross-entity lookups, rebuilt from the current store state.
    pub fn serialize_context(&self) -> SyncResult<SerializeContext> {
        let mut ctx = SerializeContext::default();
        for entity in self.store.list(EntityKind::Agent)? {
            if let Entity::Agent(agent) = entity {
                if let Some(slug) = agent.slug.filter(|s| !s.trim().is_empty()) {
                    ctx.agent_slugs.insert(agent.id, slug);
                }
            }
        }
        Ok(ctx)
    }

    pub fn serializer(&self, kind: EntityKind) -> Option<&Arc<dyn EntitySerializer>> {
        self.registry.get(kind)
    }

    pub fn emit(&self, event: SyncEvent) {
        self.events.publish(&event);
    }
}

/// One session's view: the shared context plus the sync root.
pub(crate) struct Pass<'a> {
    pub ctx: &'a SyncContext,
    pub fs: Arc<dyn SyncFs>,
    pub resolver: DirectoryResolver,
}

impl<'a> Pass<'a> {
    pub fn new(ctx: &'a SyncContext, fs: Arc<dyn SyncFs>) -> Self {
        let resolver = DirectoryResolver::new(Arc::clone(&fs));
        Self { ctx, fs, resolver }
    }

    pub fn batch_size(&self) -> usize {
        self.ctx.settings.batch_size.max(1)
    }
}
