//! Folder sync engine.
//!
//! Mirrors the entity store to a user-chosen directory as human-readable
//! files and pulls out-of-band edits back in:
//!
//! - **Export**: entities → Markdown files, skipped when the content hash
//!   is unchanged
//! - **Live writes**: per-entity debounced writes on every mutation
//! - **Import**: files → store with last-write-wins merging
//! - **Reconciliation**: periodic import while a session is active
//! - **Deletion**: entity files and studio folders, with their cache entries
//! - **Snapshot**: optional gzip-compressed JSON of the whole store
//!
//! # Architecture
//!
//! The engine never walks the filesystem directly; it talks to a
//! [`SyncFs`] capability ([`LocalFs`] on disk, [`MemoryFs`] in memory).
//! Which files are up to date is decided solely by the [`HashCache`], a
//! path → SHA-256 map persisted in the key-value store.
//!
//! # Example
//!
//! ```ignore
//! use devsync::sync::{LocalFs, SyncEngine};
//!
//! let engine = SyncEngine::new(store.clone(), store);
//! engine.initialize(Arc::new(LocalFs::new("/home/me/devs")), None).await?;
//!
//! // On every mutation
//! engine.schedule_write(&entity);
//!
//! engine.stop();
//! ```

mod context;
mod delete;
mod engine;
mod events;
mod export;
mod fs;
mod hash;
mod hash_cache;
mod import;
mod resolver;
mod snapshot;
mod status;
mod timers;
mod types;

pub use engine::{CONFIG_KEY, PassOutcome, SyncEngine, load_persisted_config};
pub use events::{EventBus, Subscription, SyncEvent, SyncEventType};
pub use fs::{DirEntry, DirHandle, EntryKind, FileContents, LocalFs, MemoryFs, SyncFs, atomic_write};
pub use hash::{content_hash, has_changed};
pub use hash_cache::{HASH_CACHE_KEY, HashCache};
pub use resolver::DirectoryResolver;
pub use snapshot::{DatabaseSnapshot, SNAPSHOT_FILENAME, compress, decompress, read_snapshot};
pub use status::{CategoryStatus, SyncStatus, get_sync_status, print_status};
pub use timers::TimerRegistry;
pub use types::{
    DirtySet, EntityStats, ExportStats, FileStats, ImportStats, SyncConfig, SyncError, SyncResult,
    SyncToggles, ToggleUpdate,
};
