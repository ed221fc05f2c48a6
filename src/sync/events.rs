//! Sync lifecycle events and their subscribers.
//!
//! Events are emitted and forgotten. Subscribers run synchronously on the
//! publishing task; a subscriber that panics is logged and skipped, and the
//! remaining subscribers still see the event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::model::EntityKind;

/// Event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    SyncStart,
    SyncComplete,
    FileWritten,
    FileRead,
    FileDeleted,
    SyncError,
}

impl SyncEventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SyncStart => "sync_start",
            Self::SyncComplete => "sync_complete",
            Self::FileWritten => "file_written",
            Self::FileRead => "file_read",
            Self::FileDeleted => "file_deleted",
            Self::SyncError => "sync_error",
        }
    }
}

impl std::fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub event_type: SyncEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Path of the file relative to the sync root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    #[must_use]
    pub fn new(event_type: SyncEventType) -> Self {
        Self {
            event_type,
            entity_type: None,
            entity_id: None,
            filename: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_entity(mut self, kind: EntityKind, id: &str) -> Self {
        self.entity_type = Some(kind);
        self.entity_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;
type Subscribers = Mutex<Vec<(u64, Callback)>>;

/// Fan-out of [`SyncEvent`]s to subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<(u64, Callback)>> {
        subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` until the returned handle is unsubscribed.
    ///
    /// Dropping the [`Subscription`] keeps the callback registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Self::lock(&self.subscribers).push((id, Arc::new(callback)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: &SyncEvent) {
        let current: Vec<Callback> = Self::lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in current {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(event = %event.event_type, "sync event subscriber panicked");
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        Self::lock(&self.subscribers).len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Remove the callback. A no-op if the bus is gone.
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            EventBus::lock(&subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            sink.lock().unwrap().push(event.event_type);
        });
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _other = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&SyncEvent::new(SyncEventType::SyncStart));
        bus.publish(&SyncEvent::new(SyncEventType::SyncComplete));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncEventType::SyncStart, SyncEventType::SyncComplete]
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let bus = EventBus::new();
        let _bad = bus.subscribe(|_| panic!("faulty observer"));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _good = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&SyncEvent::new(SyncEventType::FileWritten));
        bus.publish(&SyncEvent::new(SyncEventType::FileWritten));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let sub = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&SyncEvent::new(SyncEventType::FileRead));
        sub.unsubscribe();
        bus.publish(&SyncEvent::new(SyncEventType::FileRead));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SyncEvent::new(SyncEventType::FileWritten)
            .with_entity(EntityKind::Agent, "a1")
            .with_filename("agents/a1.md");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "file_written");
        assert_eq!(json["entity_type"], "agent");
        assert_eq!(json["filename"], "agents/a1.md");
        assert!(json.get("error").is_none());
    }
}
