//! The sync engine.
//!
//! [`SyncEngine`] owns one session at a time: the sync root, its
//! [`SyncConfig`], the hash cache, the dirty set, every pending debounce
//! timer and the reconciliation loop. It is a cheap handle; clones share
//! the same state.
//!
//! # Lifecycle
//!
//! ```text
//! initialize(fs) -> verify permission -> export pass -> reconcile loop
//!                                                          | every interval
//!                                                          v
//! schedule_write(entity) --debounce--> single-entity write   import pass
//! stop() -> persist inactive config, cancel loop and timers, flush cache
//! ```
//!
//! # Mutual exclusion
//!
//! Export and import passes are serialized by one flag. A pass requested
//! while another runs is skipped and reported as [`PassOutcome::Skipped`].
//! Debounced single-entity writes are not gated; the hash cache makes
//! concurrent writes of the same content converge.
//!
//! # Errors
//!
//! Passes never return errors. Failures inside a pass are contained per
//! entity and counted; anything escaping is logged, published as a
//! `sync_error` event and returned as [`PassOutcome::Failed`]. Only
//! [`SyncEngine::initialize`] and the explicit delete operations return
//! `Err` to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineSettings;
use crate::model::Entity;
use crate::serializers::SerializerRegistry;
use crate::storage::{EntityStore, KeyValueStore};
use crate::sync::context::{PathLocks, SyncContext};
use crate::sync::delete::Deleter;
use crate::sync::events::{EventBus, SyncEvent, SyncEventType, Subscription};
use crate::sync::export::Exporter;
use crate::sync::fs::SyncFs;
use crate::sync::hash_cache::HashCache;
use crate::sync::import::Importer;
use crate::sync::snapshot::{self, DatabaseSnapshot};
use crate::sync::timers::TimerRegistry;
use crate::sync::types::{
    DirtySet, ExportStats, FileStats, ImportStats, SyncConfig, SyncError, SyncResult,
    SyncToggles, ToggleUpdate,
};

/// Key-value store key holding the JSON-encoded [`SyncConfig`].
pub const CONFIG_KEY: &str = "devs-folder-sync-config";

/// Read the persisted session config, if any.
///
/// Unreadable or corrupt values are logged and treated as absent.
#[must_use]
pub fn load_persisted_config(kv: &dyn KeyValueStore) -> Option<SyncConfig> {
    let json = match kv.get(CONFIG_KEY) {
        Ok(json) => json?,
        Err(e) => {
            warn!(error = %e, "failed to read sync config");
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(error = %e, "ignoring corrupt sync config");
            None
        }
    }
}

/// Result of a full export or import pass.
#[derive(Debug)]
pub enum PassOutcome<T> {
    /// The pass ran to the end. Per-entity failures are in the stats.
    Completed(T),
    /// The pass aborted; the error was logged and published.
    Failed(SyncError),
    /// Sync is inactive or another pass was running.
    Skipped,
}

impl<T> PassOutcome<T> {
    /// Stats of a completed pass.
    pub fn stats(self) -> Option<T> {
        match self {
            Self::Completed(stats) => Some(stats),
            Self::Failed(_) | Self::Skipped => None,
        }
    }

    /// `Ok(None)` when skipped.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed pass.
    pub fn into_result(self) -> SyncResult<Option<T>> {
        match self {
            Self::Completed(stats) => Ok(Some(stats)),
            Self::Failed(e) => Err(e),
            Self::Skipped => Ok(None),
        }
    }
}

struct Session {
    config: SyncConfig,
    fs: Arc<dyn SyncFs>,
}

struct Shared {
    ctx: SyncContext,
    kv: Arc<dyn KeyValueStore>,
    timers: TimerRegistry,
    session: RwLock<Option<Session>>,
    syncing: AtomicBool,
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

/// Releases the pass flag when dropped.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the folder sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    /// An engine with every built-in serializer and default settings.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(store, kv, SerializerRegistry::default(), EngineSettings::default())
    }

    #[must_use]
    pub fn with_options(
        store: Arc<dyn EntityStore>,
        kv: Arc<dyn KeyValueStore>,
        registry: SerializerRegistry,
        settings: EngineSettings,
    ) -> Self {
        let events = EventBus::new();
        // Kept for the engine's lifetime; the handle is never unsubscribed.
        let _ = events.subscribe(|event| {
            debug!(
                event = %event.event_type,
                entity = event.entity_id.as_deref().unwrap_or(""),
                file = event.filename.as_deref().unwrap_or(""),
                "sync event"
            );
        });

        let ctx = SyncContext {
            store,
            registry,
            cache: HashCache::new(Arc::clone(&kv), settings.cache_persist_delay),
            dirty: DirtySet::default(),
            events,
            settings,
            writes: PathLocks::default(),
        };

        Self {
            shared: Arc::new(Shared {
                ctx,
                kv,
                timers: TimerRegistry::new(),
                session: RwLock::new(None),
                syncing: AtomicBool::new(false),
                reconcile: Mutex::new(None),
            }),
        }
    }

    fn ctx(&self) -> &SyncContext {
        &self.shared.ctx
    }

    /// Root and toggles of the active session.
    fn active_session(&self) -> Option<(Arc<dyn SyncFs>, SyncToggles)> {
        let session = self
            .shared
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        session
            .as_ref()
            .filter(|s| s.config.is_active)
            .map(|s| (Arc::clone(&s.fs), s.config.toggles))
    }

    fn update_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut session = self
            .shared
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        session.as_mut().map(|s| {
            let result = f(s);
            self.persist_config(&s.config);
            result
        })
    }

    fn persist_config(&self, config: &SyncConfig) {
        let result = serde_json::to_string(config)
            .map_err(SyncError::from)
            .and_then(|json| {
                self.shared
                    .kv
                    .set(CONFIG_KEY, &json)
                    .map_err(SyncError::from)
            });
        if let Err(e) = result {
            warn!(error = %e, "failed to persist sync config");
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.ctx().emit(event);
    }

    /// Start syncing to `fs`.
    ///
    /// Verifies read-write access, replaces any running session, clears the
    /// hash cache when the root differs from the last one, runs a full export
    /// and starts the reconciliation loop. `toggles` defaults to the previous
    /// session's toggles for the same root, else all categories.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PermissionDenied`] or [`SyncError::NotFound`]
    /// when the root cannot be used. Export failures do not fail
    /// initialization; they are reported like any other pass.
    #[tracing::instrument(skip_all, fields(root = %fs.label()))]
    pub async fn initialize(
        &self,
        fs: Arc<dyn SyncFs>,
        toggles: Option<SyncToggles>,
    ) -> SyncResult<SyncConfig> {
        fs.verify_permission().await?;
        self.halt();

        let cache = &self.ctx().cache;
        cache.load();
        let label = fs.label();
        let previous = load_persisted_config(self.shared.kv.as_ref())
            .filter(|config| config.base_path == label);
        if previous.is_none() {
            cache.clear();
            info!(root = %label, "new sync root, hash cache reset");
        }

        let toggles = toggles
            .or_else(|| previous.as_ref().map(|config| config.toggles))
            .unwrap_or_default();
        let mut config = SyncConfig::new(label, toggles);
        config.last_sync = previous.and_then(|config| config.last_sync);
        self.persist_config(&config);
        *self
            .shared
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Session {
            config: config.clone(),
            fs,
        });

        info!("sync initialized");
        self.export_all().await;
        self.start_reconcile();
        Ok(self.get_config().unwrap_or(config))
    }

    /// Resume the persisted session on `fs` without an initial pass or the
    /// reconciliation loop.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] when no active session was persisted
    /// for this root.
    pub fn attach(&self, fs: Arc<dyn SyncFs>) -> SyncResult<SyncConfig> {
        let config = load_persisted_config(self.shared.kv.as_ref())
            .filter(|config| config.is_active && config.base_path == fs.label())
            .ok_or(SyncError::Inactive)?;
        self.halt();
        self.ctx().cache.load();
        *self
            .shared
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Session {
            config: config.clone(),
            fs,
        });
        Ok(config)
    }

    /// Release the session without deactivating it. Pending debounced writes
    /// are dropped; the hash cache is flushed.
    pub fn detach(&self) {
        self.halt();
    }

    /// Deactivate sync: persist the inactive config, cancel the loop and
    /// every pending debounced write, flush the hash cache.
    ///
    /// Writes already in progress finish. Also deactivates a persisted
    /// session this engine never attached to.
    pub fn stop(&self) {
        let config = self
            .get_config()
            .or_else(|| load_persisted_config(self.shared.kv.as_ref()));

        if let Some(mut config) = config {
            config.is_active = false;
            self.persist_config(&config);
        }
        self.halt();
        info!("sync stopped");
    }

    fn halt(&self) {
        if let Some(handle) = self
            .shared
            .reconcile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let cancelled = self.shared.timers.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "pending writes cancelled");
        }
        self.ctx().cache.flush();
        self.shared
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_session().is_some()
    }

    /// Whether a full pass is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::Acquire)
    }

    /// The current session's config.
    #[must_use]
    pub fn get_config(&self) -> Option<SyncConfig> {
        self.shared
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.config.clone())
    }

    /// Change toggles of the active session and persist them.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] without a session.
    pub fn update_config(&self, update: ToggleUpdate) -> SyncResult<SyncConfig> {
        self.update_session(|session| {
            update.apply(&mut session.config.toggles);
            session.config.clone()
        })
        .ok_or(SyncError::Inactive)
    }

    /// Subscribe to sync events.
    pub fn on_sync_event<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.ctx().events.subscribe(callback)
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.ctx().settings
    }

    /// `"kind:id"` markers of entities whose files may be stale.
    #[must_use]
    pub fn dirty_entities(&self) -> Vec<String> {
        self.ctx().dirty.snapshot()
    }

    /// Number of paths in the hash cache.
    #[must_use]
    pub fn cached_files(&self) -> usize {
        self.ctx().cache.len()
    }

    /// Persist the hash cache now.
    pub fn flush(&self) {
        self.ctx().cache.flush();
    }

    /// Queue a debounced write of `entity`.
    ///
    /// A later call for the same entity replaces the pending one, so only
    /// the latest state is written. Returns whether a write was queued; it is
    /// not when sync is inactive or the category is disabled.
    pub fn schedule_write(&self, entity: &Entity) -> bool {
        let Some((_, toggles)) = self.active_session() else {
            return false;
        };
        if !toggles.is_enabled(entity.kind()) {
            return false;
        }
        let Some(serializer) = self.ctx().serializer(entity.kind()) else {
            return false;
        };

        let key = format!("{}/{}", serializer.directory(), entity.id());
        self.ctx().dirty.mark(entity);
        let engine = self.clone();
        let entity = entity.clone();
        self.shared
            .timers
            .schedule(key, self.settings().debounce, async move {
                if let Err(e) = engine.write_now(&entity).await {
                    warn!(marker = %entity.marker(), error = %e, "debounced write failed");
                }
            })
    }

    /// Write `entity` immediately, skipping unchanged files.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] without a session, or the write error.
    pub async fn write_now(&self, entity: &Entity) -> SyncResult<FileStats> {
        let (fs, _) = self.active_session().ok_or(SyncError::Inactive)?;
        let Some(serializer) = self.ctx().serializer(entity.kind()) else {
            return Ok(FileStats::default());
        };
        let serialize_ctx = self.ctx().serialize_context()?;
        Exporter::new(self.ctx(), fs)
            .write_entity(entity, &**serializer, &serialize_ctx)
            .await
    }

    fn begin_pass(
        &self,
        pass: &'static str,
    ) -> Option<(Arc<dyn SyncFs>, SyncToggles, PassGuard<'_>)> {
        let Some((fs, toggles)) = self.active_session() else {
            debug!(pass, "sync inactive, pass skipped");
            return None;
        };
        let Some(guard) = PassGuard::acquire(&self.shared.syncing) else {
            debug!(pass, "another pass is running, pass skipped");
            return None;
        };
        self.emit(SyncEvent::new(SyncEventType::SyncStart));
        Some((fs, toggles, guard))
    }

    fn finish_pass<T>(&self, pass: &'static str, result: SyncResult<T>) -> PassOutcome<T> {
        match result {
            Ok(stats) => {
                self.update_session(|session| session.config.last_sync = Some(Utc::now()));
                self.emit(SyncEvent::new(SyncEventType::SyncComplete));
                PassOutcome::Completed(stats)
            }
            Err(e) => {
                error!(pass, error = %e, "sync pass failed");
                self.emit(SyncEvent::new(SyncEventType::SyncError).with_error(e.to_string()));
                PassOutcome::Failed(e)
            }
        }
    }

    /// Export every enabled category.
    pub async fn export_all(&self) -> PassOutcome<ExportStats> {
        let Some((fs, toggles, _guard)) = self.begin_pass("export") else {
            return PassOutcome::Skipped;
        };
        let result = Exporter::new(self.ctx(), fs).export(&toggles).await;
        self.finish_pass("export", result)
    }

    /// Import every enabled category.
    pub async fn import_all(&self) -> PassOutcome<ImportStats> {
        let Some((fs, toggles, _guard)) = self.begin_pass("import") else {
            return PassOutcome::Skipped;
        };
        let result = Importer::new(self.ctx(), fs).import(&toggles).await;
        self.finish_pass("import", result)
    }

    fn start_reconcile(&self) {
        let period = self.settings().reconcile_interval;
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let engine = SyncEngine { shared };
                if !engine.is_active() {
                    break;
                }
                if engine.is_syncing() {
                    debug!("reconcile skipped, pass running");
                    continue;
                }
                engine.import_all().await;
            }
        });

        let previous = self
            .shared
            .reconcile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn session_fs(&self) -> SyncResult<Arc<dyn SyncFs>> {
        self.active_session()
            .map(|(fs, _)| fs)
            .ok_or(SyncError::Inactive)
    }

    /// Remove the files of `entity` and cancel its pending write.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] without a session, or the filesystem
    /// error. Missing files are not errors.
    pub async fn delete_entity_file(&self, entity: &Entity) -> SyncResult<usize> {
        let fs = self.session_fs()?;
        let Some(serializer) = self.ctx().serializer(entity.kind()) else {
            return Ok(0);
        };
        self.shared
            .timers
            .cancel(&format!("{}/{}", serializer.directory(), entity.id()));
        Deleter::new(self.ctx(), fs)
            .delete_entity_file(entity, &**serializer)
            .await
    }

    /// Remove a studio entry's folder and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] without a session, or the filesystem
    /// error.
    pub async fn delete_studio_entry(&self, entry_id: &str) -> SyncResult<usize> {
        let fs = self.session_fs()?;
        Deleter::new(self.ctx(), fs).delete_studio_entry(entry_id).await
    }

    /// Remove one image file of a studio entry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] without a session, or the filesystem
    /// error.
    pub async fn delete_studio_image(&self, entry_id: &str, image_id: &str) -> SyncResult<usize> {
        let fs = self.session_fs()?;
        Deleter::new(self.ctx(), fs)
            .delete_studio_image(entry_id, image_id)
            .await
    }

    /// Decode the snapshot at the session root.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Inactive`] without a session, or the read error.
    pub async fn read_snapshot(&self) -> SyncResult<DatabaseSnapshot> {
        let fs = self.session_fs()?;
        snapshot::read_snapshot(fs.as_ref()).await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("active", &self.is_active())
            .field("syncing", &self.is_syncing())
            .field("cache", &self.ctx().cache)
            .finish_non_exhaustive()
    }
}
