//! Logical path to directory handle resolution.

use std::sync::Arc;

use crate::sync::fs::{DirHandle, SyncFs};
use crate::sync::types::SyncResult;

/// Walks `/`-separated logical paths one directory level at a time.
#[derive(Clone)]
pub struct DirectoryResolver {
    fs: Arc<dyn SyncFs>,
}

impl DirectoryResolver {
    #[must_use]
    pub fn new(fs: Arc<dyn SyncFs>) -> Self {
        Self { fs }
    }

    /// Resolve `path` (e.g. `memories/ag_123`) below the sync root.
    ///
    /// Empty segments are ignored, so `""` and `"/"` resolve to the root.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`](crate::sync::SyncError::NotFound) when
    /// `create` is off and a level is missing.
    pub async fn resolve(&self, path: &str, create: bool) -> SyncResult<DirHandle> {
        let mut dir = self.fs.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            dir = self.fs.get_subdir(&dir, segment, create).await?;
        }
        Ok(dir)
    }
}

impl std::fmt::Debug for DirectoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryResolver")
            .field("root", &self.fs.label())
            .finish()
    }
}
