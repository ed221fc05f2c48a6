//! Keyed, cancellable one-shot timers.
//!
//! Scheduling a key that already has a pending timer aborts the old one, so
//! each key has at most one pending task (a trailing debounce). Once a timer
//! fires it leaves the registry before its work starts; cancelling the key
//! afterwards does not interrupt that work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Default)]
struct Inner {
    pending: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
    next_id: AtomicU64,
}

/// Map of key to pending scheduled task.
#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl TimerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (u64, JoinHandle<()>)>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` after `delay`, replacing any pending timer for `key`.
    ///
    /// Returns `false` (and drops `task`) when called outside a tokio
    /// runtime.
    pub fn schedule<F>(&self, key: impl Into<String>, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%key, "no async runtime, timer dropped");
            return false;
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = self.clone();
        let task_key = key.clone();

        let mut pending = self.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if registry.take_if_current(&task_key, id) {
                task.await;
            }
        });
        if let Some((_, previous)) = pending.insert(key, (id, handle)) {
            previous.abort();
        }
        true
    }

    fn take_if_current(&self, key: &str, id: u64) -> bool {
        let mut pending = self.lock();
        match pending.get(key) {
            Some((current, _)) if *current == id => {
                pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer. Returns how many were pending.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        drained.len()
    }

    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}
