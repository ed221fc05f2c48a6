//! Path to content-hash cache.
//!
//! The cache is the single source of truth for "is this file up to date".
//! It is loaded once from the key-value store, updated after every write
//! and read, and persisted back on a trailing debounce. Persistence is
//! best-effort: failures are logged and never surface to callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::storage::KeyValueStore;
use crate::sync::timers::TimerRegistry;

/// Key-value store key holding the JSON-encoded cache.
pub const HASH_CACHE_KEY: &str = "devs-folder-sync-hashes";

const PERSIST_TIMER: &str = "hash-cache-persist";

struct Inner {
    kv: Arc<dyn KeyValueStore>,
    entries: Mutex<HashMap<String, String>>,
    loaded: AtomicBool,
    timers: TimerRegistry,
    persist_delay: Duration,
}

/// Shared handle to the hash cache.
#[derive(Clone)]
pub struct HashCache {
    inner: Arc<Inner>,
}

impl HashCache {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, persist_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                kv,
                entries: Mutex::new(HashMap::new()),
                loaded: AtomicBool::new(false),
                timers: TimerRegistry::new(),
                persist_delay,
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the persisted map. Only the first call does any work.
    pub fn load(&self) {
        if self.inner.loaded.swap(true, Ordering::SeqCst) {
            return;
        }

        let stored = match self.inner.kv.get(HASH_CACHE_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read hash cache");
                return;
            }
        };

        match serde_json::from_str::<HashMap<String, String>>(&stored) {
            Ok(persisted) => {
                let mut entries = self.entries();
                debug!(count = persisted.len(), "hash cache loaded");
                for (path, hash) in persisted {
                    entries.entry(path).or_insert(hash);
                }
            }
            Err(e) => warn!(error = %e, "ignoring corrupt hash cache"),
        }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.entries().get(path).cloned()
    }

    /// Record the hash of `path` and schedule a persist.
    pub fn set(&self, path: &str, hash: &str) {
        self.entries().insert(path.to_string(), hash.to_string());
        self.schedule_persist();
    }

    /// Forget one path. Returns whether it was cached.
    pub fn remove(&self, path: &str) -> bool {
        let removed = self.entries().remove(path).is_some();
        if removed {
            self.schedule_persist();
        }
        removed
    }

    /// Forget every path under the directory `prefix`. Returns the count.
    pub fn remove_dir(&self, prefix: &str) -> usize {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let removed = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|path, _| !path.starts_with(&prefix));
            before - entries.len()
        };
        if removed > 0 {
            self.schedule_persist();
        }
        removed
    }

    /// Cached paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries().keys().cloned().collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wipe the in-memory map and the persisted copy.
    pub fn clear(&self) {
        self.inner.timers.cancel(PERSIST_TIMER);
        self.entries().clear();
        self.inner.loaded.store(true, Ordering::SeqCst);
        if let Err(e) = self.inner.kv.remove(HASH_CACHE_KEY) {
            warn!(error = %e, "failed to clear persisted hash cache");
        }
        debug!("hash cache cleared");
    }

    /// Persist now, cancelling any pending debounced persist.
    pub fn flush(&self) {
        self.inner.timers.cancel(PERSIST_TIMER);
        self.persist_now();
    }

    fn schedule_persist(&self) {
        let cache = self.clone();
        let scheduled = self.inner.timers.schedule(
            PERSIST_TIMER,
            self.inner.persist_delay,
            async move { cache.persist_now() },
        );
        if !scheduled {
            self.persist_now();
        }
    }

    fn persist_now(&self) {
        let json = {
            let entries = self.entries();
            match serde_json::to_string(&*entries) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to encode hash cache");
                    return;
                }
            }
        };
        match self.inner.kv.set(HASH_CACHE_KEY, &json) {
            Ok(()) => debug!("hash cache persisted"),
            Err(e) => warn!(error = %e, "failed to persist hash cache"),
        }
    }
}

impl std::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCache")
            .field("entries", &self.len())
            .field("persist_delay", &self.inner.persist_delay)
            .finish_non_exhaustive()
    }
}
