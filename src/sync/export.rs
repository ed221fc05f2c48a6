//! Export: store records to files.
//!
//! # Hash gating
//!
//! Every file of every entity is fingerprinted before it is written. When
//! the fingerprint matches the hash cache entry for the file's path the
//! write is skipped, so an export of an unchanged store touches nothing.
//! Multi-file entities (knowledge attachments, studio images) gate each file
//! on its own hash; base64 companions are decoded to raw bytes only when
//! they actually need writing.
//!
//! # Batching
//!
//! Entities of one category are processed in batches of
//! `EngineSettings::batch_size` running concurrently. Each item settles on
//! its own: a failed entity is logged and counted, the rest of its batch
//! still completes. Batches, and categories, run strictly one after the
//! other.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::model::Entity;
use crate::serializers::{CompanionContent, EntitySerializer, SerializeContext, join_path};
use crate::sync::context::{Pass, SyncContext};
use crate::sync::events::{SyncEvent, SyncEventType};
use crate::sync::fs::SyncFs;
use crate::sync::hash::{content_hash, has_changed};
use crate::sync::snapshot::write_snapshot;
use crate::sync::types::{ExportStats, FileStats, SyncError, SyncResult, SyncToggles};

/// Writes store records to the sync root.
pub(crate) struct Exporter<'a> {
    pass: Pass<'a>,
}

impl<'a> Exporter<'a> {
    pub fn new(ctx: &'a SyncContext, fs: Arc<dyn SyncFs>) -> Self {
        Self {
            pass: Pass::new(ctx, fs),
        }
    }

    /// Export every enabled category, then the snapshot when enabled.
    ///
    /// Per-entity failures are contained and counted; only store failures
    /// and snapshot failures abort the pass.
    #[tracing::instrument(skip_all, fields(root = %self.pass.fs.label()))]
    pub async fn export(&self, toggles: &SyncToggles) -> SyncResult<ExportStats> {
        let ctx = self.pass.ctx;
        let serialize_ctx = ctx.serialize_context()?;
        let mut stats = ExportStats::default();

        for kind in toggles.enabled() {
            let Some(serializer) = ctx.serializer(kind) else {
                continue;
            };
            let entities: Vec<Entity> = ctx
                .store
                .list(kind)?
                .into_iter()
                .filter(|e| !e.is_deleted())
                .collect();

            let mut kind_stats = FileStats::default();
            for batch in entities.chunks(self.pass.batch_size()) {
                for entity in batch {
                    ctx.dirty.mark(entity);
                }
                let results = join_all(
                    batch
                        .iter()
                        .map(|entity| self.write_entity(entity, &**serializer, &serialize_ctx)),
                )
                .await;

                for (entity, result) in batch.iter().zip(results) {
                    match result {
                        Ok(file_stats) => kind_stats.add(file_stats),
                        Err(e) => {
                            warn!(kind = %kind, id = entity.id(), error = %e, "entity export failed");
                            kind_stats.failed += 1;
                        }
                    }
                }
            }

            if !entities.is_empty() {
                info!(
                    kind = %kind,
                    written = kind_stats.written,
                    unchanged = kind_stats.unchanged,
                    failed = kind_stats.failed,
                    "category exported"
                );
            }
            stats.categories.insert(kind, kind_stats);
        }

        if toggles.full_export {
            stats.snapshot_written = Some(write_snapshot(&self.pass).await?);
        }

        Ok(stats)
    }

    /// Serialize one entity and write the files whose hash changed.
    ///
    /// The target directory is created only when something is written. The
    /// entity's dirty marker is cleared once every file is up to date.
    pub async fn write_entity(
        &self,
        entity: &Entity,
        serializer: &dyn EntitySerializer,
        serialize_ctx: &SerializeContext,
    ) -> SyncResult<FileStats> {
        let ctx = self.pass.ctx;
        let set = serializer.serialize(entity, serialize_ctx)?;

        let files = std::iter::once((
            set.metadata_filename.as_str(),
            set.metadata_content.as_str(),
            false,
        ))
        .chain(set.companions.iter().map(|c| {
            (
                c.filename.as_str(),
                c.content.as_str(),
                matches!(c.content, CompanionContent::Base64(_)),
            )
        }));

        let mut stats = FileStats::default();
        let mut dir = None;
        for (filename, content, is_base64) in files {
            let path = join_path(&set.directory, filename);
            let hash = content_hash(content);
            let _write = ctx.writes.lock(&path).await;
            if !has_changed(&hash, ctx.cache.get(&path).as_deref()) {
                stats.unchanged += 1;
                continue;
            }

            let bytes = if is_base64 {
                STANDARD
                    .decode(content)
                    .map_err(|e| SyncError::Decode(format!("{path}: {e}")))?
            } else {
                content.as_bytes().to_vec()
            };

            let handle = match dir.take() {
                Some(handle) => handle,
                None => self.pass.resolver.resolve(&set.directory, true).await?,
            };
            self.pass.fs.write_file(&handle, filename, &bytes).await?;
            dir = Some(handle);

            ctx.cache.set(&path, &hash);
            debug!(%path, "file written");
            ctx.emit(
                SyncEvent::new(SyncEventType::FileWritten)
                    .with_entity(entity.kind(), entity.id())
                    .with_filename(path),
            );
            stats.written += 1;
        }

        ctx.dirty.clear(entity);
        Ok(stats)
    }
}
