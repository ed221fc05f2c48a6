//! Whole-database snapshot at the sync root.
//!
//! The snapshot is the JSON form of every record in the store, gzip
//! compressed into [`SNAPSHOT_FILENAME`]. It is hash-gated like every other
//! file: the hash is taken over the uncompressed JSON, which carries no
//! export timestamp, so an unchanged store never rewrites it.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Entity, EntityKind};
use crate::storage::EntityStore;
use crate::sync::context::Pass;
use crate::sync::events::{SyncEvent, SyncEventType};
use crate::sync::fs::SyncFs;
use crate::sync::hash::{content_hash, has_changed};
use crate::sync::types::{SyncError, SyncResult};

/// Fixed filename of the snapshot, at the sync root.
pub const SNAPSHOT_FILENAME: &str = "devs-database-export.json.gz";

const SNAPSHOT_VERSION: u32 = 1;

/// Decoded snapshot contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    /// Records keyed by category name, in store order.
    pub entities: BTreeMap<String, Vec<Entity>>,
}

impl DatabaseSnapshot {
    /// Capture every record of every category.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn capture(store: &dyn EntityStore) -> SyncResult<Self> {
        let mut entities = BTreeMap::new();
        for kind in EntityKind::ALL {
            entities.insert(kind.as_str().to_string(), store.list(kind)?);
        }
        Ok(Self {
            version: SNAPSHOT_VERSION,
            entities,
        })
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records of one category.
    #[must_use]
    pub fn of(&self, kind: EntityKind) -> &[Entity] {
        self.entities.get(kind.as_str()).map_or(&[], Vec::as_slice)
    }
}

/// Gzip `json`.
///
/// # Errors
///
/// Returns an error if compression fails.
pub fn compress(json: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes())?;
    encoder.finish()
}

/// Gunzip `bytes` into text.
///
/// # Errors
///
/// Returns an error if the data is not gzip or not UTF-8.
pub fn decompress(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = String::new();
    decoder.read_to_string(&mut json)?;
    Ok(json)
}

/// Write the snapshot if its content changed. Returns whether it was written.
pub(crate) async fn write_snapshot(pass: &Pass<'_>) -> SyncResult<bool> {
    let snapshot = DatabaseSnapshot::capture(pass.ctx.store.as_ref())?;
    let json = serde_json::to_string(&snapshot)?;
    let hash = content_hash(&json);

    if !has_changed(&hash, pass.ctx.cache.get(SNAPSHOT_FILENAME).as_deref()) {
        debug!("snapshot unchanged");
        return Ok(false);
    }

    let compressed = compress(&json)?;
    pass.fs
        .write_file(&pass.fs.root(), SNAPSHOT_FILENAME, &compressed)
        .await?;
    pass.ctx.cache.set(SNAPSHOT_FILENAME, &hash);
    pass.ctx
        .emit(SyncEvent::new(SyncEventType::FileWritten).with_filename(SNAPSHOT_FILENAME));
    debug!(records = snapshot.len(), bytes = compressed.len(), "snapshot written");
    Ok(true)
}

/// Read and decode the snapshot at the root of `fs`.
///
/// # Errors
///
/// Returns [`SyncError::NotFound`] if no snapshot exists, or a decode error
/// if it is corrupt.
pub async fn read_snapshot(fs: &dyn SyncFs) -> SyncResult<DatabaseSnapshot> {
    let file = fs.read_file(&fs.root(), SNAPSHOT_FILENAME).await?;
    let json = decompress(&file.bytes).map_err(|e| SyncError::Decode(e.to_string()))?;
    Ok(serde_json::from_str(&json)?)
}
