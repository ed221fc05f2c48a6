//! Directory capability used by the engine.
//!
//! The engine only ever talks to a [`SyncFs`]: list a directory, open or
//! create one child directory, read a file, write a file, remove an entry.
//! [`LocalFs`] implements it over `tokio::fs` with atomic writes (temp file,
//! fsync, rename). [`MemoryFs`] keeps everything in memory for hosts without
//! a real filesystem and for tests.
//!
//! Directories are addressed by [`DirHandle`], a `/`-separated path relative
//! to the sync root. Handles are only obtained through
//! [`SyncFs::get_subdir`], so every path segment has been validated.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::serializers::join_path;
use crate::sync::types::{SyncError, SyncResult};

/// A directory below the sync root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DirHandle {
    path: String,
}

impl DirHandle {
    /// The sync root itself.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Path relative to the sync root; empty for the root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Relative path of a child entry.
    #[must_use]
    pub fn child_path(&self, name: &str) -> String {
        join_path(&self.path, name)
    }

    fn child(&self, name: &str) -> Self {
        Self {
            path: self.child_path(name),
        }
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A file read back from the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl FileContents {
    /// The content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Decode`] if the bytes are not valid UTF-8.
    pub fn text(&self) -> SyncResult<String> {
        String::from_utf8(self.bytes.clone()).map_err(|e| SyncError::Decode(e.to_string()))
    }

    /// The content as standard base64.
    #[must_use]
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Minimal directory capability the engine needs.
#[async_trait]
pub trait SyncFs: Send + Sync {
    /// Human-readable label of the root, stored as the session base path.
    fn label(&self) -> String;

    /// Handle to the sync root.
    fn root(&self) -> DirHandle {
        DirHandle::root()
    }

    /// Confirm the root exists and accepts writes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PermissionDenied`] when writes are refused and
    /// [`SyncError::NotFound`] when the root is missing.
    async fn verify_permission(&self) -> SyncResult<()>;

    /// List the entries of `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if `dir` no longer exists.
    async fn list_entries(&self, dir: &DirHandle) -> SyncResult<Vec<DirEntry>>;

    /// Open (or with `create`, create) the child directory `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] when it is absent and `create` is off.
    async fn get_subdir(&self, dir: &DirHandle, name: &str, create: bool)
    -> SyncResult<DirHandle>;

    /// Read the file `name` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the file does not exist.
    async fn read_file(&self, dir: &DirHandle, name: &str) -> SyncResult<FileContents>;

    /// Replace the file `name` in `dir` with `content`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the previous file is untouched.
    async fn write_file(&self, dir: &DirHandle, name: &str, content: &[u8]) -> SyncResult<()>;

    /// Remove the file or directory `name` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the entry does not exist.
    async fn remove_entry(&self, dir: &DirHandle, name: &str, recursive: bool) -> SyncResult<()>;
}

fn validate_name(name: &str) -> SyncResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(SyncError::InvalidPath(name.to_string()));
    }
    Ok(())
}

const PROBE_FILE: &str = ".devsync-write-test";

/// [`SyncFs`] over a local directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, dir: &DirHandle) -> PathBuf {
        dir.path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a hidden temporary file next to the target, unique
///    to this call so concurrent writers never share one
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub async fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4());
    let temp_path = path.with_file_name(temp_name);

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

fn system_time_to_utc(time: std::io::Result<std::time::SystemTime>) -> DateTime<Utc> {
    time.map_or_else(|_| Utc::now(), DateTime::<Utc>::from)
}

#[async_trait]
impl SyncFs for LocalFs {
    fn label(&self) -> String {
        self.root.display().to_string()
    }

    async fn verify_permission(&self) -> SyncResult<()> {
        let label = self.label();
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| SyncError::from_io(e, &label))?;
        if !metadata.is_dir() {
            return Err(SyncError::InvalidPath(format!("{label} is not a directory")));
        }
        if metadata.permissions().readonly() {
            return Err(SyncError::PermissionDenied(label));
        }

        let probe = self.root.join(PROBE_FILE);
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(|e| SyncError::from_io(e, &label))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| SyncError::from_io(e, &label))?;
        Ok(())
    }

    async fn list_entries(&self, dir: &DirHandle) -> SyncResult<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(self.resolve(dir))
            .await
            .map_err(|e| SyncError::from_io(e, dir.path()))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| SyncError::from_io(e, dir.path()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SyncError::from_io(e, dir.path()))?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_subdir(
        &self,
        dir: &DirHandle,
        name: &str,
        create: bool,
    ) -> SyncResult<DirHandle> {
        validate_name(name)?;
        let child = dir.child(name);
        let path = self.resolve(&child);

        if create {
            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(child),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(SyncError::from_io(e, child.path())),
            }
        }

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| SyncError::from_io(e, child.path()))?;
        if metadata.is_dir() {
            Ok(child)
        } else {
            Err(SyncError::InvalidPath(format!(
                "{} is not a directory",
                child.path()
            )))
        }
    }

    async fn read_file(&self, dir: &DirHandle, name: &str) -> SyncResult<FileContents> {
        validate_name(name)?;
        let rel = dir.child_path(name);
        let path = self.resolve(dir).join(name);

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| SyncError::from_io(e, &rel))?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| SyncError::from_io(e, &rel))?;

        Ok(FileContents {
            size: metadata.len(),
            last_modified: system_time_to_utc(metadata.modified()),
            bytes,
        })
    }

    async fn write_file(&self, dir: &DirHandle, name: &str, content: &[u8]) -> SyncResult<()> {
        validate_name(name)?;
        let path = self.resolve(dir).join(name);
        atomic_write(&path, content)
            .await
            .map_err(|e| SyncError::from_io(e, &dir.child_path(name)))
    }

    async fn remove_entry(&self, dir: &DirHandle, name: &str, recursive: bool) -> SyncResult<()> {
        validate_name(name)?;
        let rel = dir.child_path(name);
        let path = self.resolve(dir).join(name);

        let metadata = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|e| SyncError::from_io(e, &rel))?;
        let result = if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            }
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| SyncError::from_io(e, &rel))
    }
}

#[derive(Debug, Default)]
struct MemoryTree {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, DateTime<Utc>)>,
}

impl MemoryTree {
    fn children_of<'a>(
        &'a self,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a str, EntryKind)> + 'a {
        let direct = move |path: &'a str| -> Option<&'a str> {
            let rest = if dir.is_empty() {
                path
            } else {
                path.strip_prefix(dir)?.strip_prefix('/')?
            };
            (!rest.is_empty() && !rest.contains('/')).then_some(rest)
        };
        let dirs = self
            .dirs
            .iter()
            .filter_map(move |p| direct(p.as_str()).map(|n| (n, EntryKind::Directory)));
        let files = self
            .files
            .keys()
            .filter_map(move |p| direct(p.as_str()).map(|n| (n, EntryKind::File)));
        dirs.chain(files)
    }
}

/// [`SyncFs`] kept entirely in memory.
#[derive(Debug)]
pub struct MemoryFs {
    label: String,
    tree: Mutex<MemoryTree>,
    read_only: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryFs {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let mut tree = MemoryTree::default();
        tree.dirs.insert(String::new());
        Self {
            label: label.into(),
            tree: Mutex::new(tree),
            read_only: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Refuse every write from now on.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of successful `write_file` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every file path currently stored, sorted.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Raw bytes of a file by relative path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).map(|(bytes, _)| bytes.clone())
    }

    /// Create or replace a file by relative path, creating parent
    /// directories, as an external editor would.
    pub fn put_file(&self, path: &str, content: &[u8], modified: DateTime<Utc>) {
        let mut tree = self.lock();
        let mut parent = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            parent = join_path(&parent, segment);
            tree.dirs.insert(parent.clone());
        }
        tree.files
            .insert(path.to_string(), (content.to_vec(), modified));
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> SyncResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(SyncError::PermissionDenied(self.label.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SyncFs for MemoryFs {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn verify_permission(&self) -> SyncResult<()> {
        self.check_writable()
    }

    async fn list_entries(&self, dir: &DirHandle) -> SyncResult<Vec<DirEntry>> {
        let tree = self.lock();
        if !tree.dirs.contains(dir.path()) {
            return Err(SyncError::NotFound(dir.path().to_string()));
        }
        let mut entries: Vec<DirEntry> = tree
            .children_of(dir.path())
            .map(|(name, kind)| DirEntry {
                name: name.to_string(),
                kind,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_subdir(
        &self,
        dir: &DirHandle,
        name: &str,
        create: bool,
    ) -> SyncResult<DirHandle> {
        validate_name(name)?;
        let child = dir.child(name);
        let mut tree = self.lock();
        if !tree.dirs.contains(dir.path()) {
            return Err(SyncError::NotFound(dir.path().to_string()));
        }
        if tree.dirs.contains(child.path()) {
            return Ok(child);
        }
        if tree.files.contains_key(child.path()) {
            return Err(SyncError::InvalidPath(format!(
                "{} is not a directory",
                child.path()
            )));
        }
        if !create {
            return Err(SyncError::NotFound(child.path().to_string()));
        }
        self.check_writable()?;
        tree.dirs.insert(child.path().to_string());
        Ok(child)
    }

    async fn read_file(&self, dir: &DirHandle, name: &str) -> SyncResult<FileContents> {
        validate_name(name)?;
        let path = dir.child_path(name);
        let tree = self.lock();
        let (bytes, modified) = tree
            .files
            .get(&path)
            .ok_or_else(|| SyncError::NotFound(path.clone()))?;
        Ok(FileContents {
            bytes: bytes.clone(),
            last_modified: *modified,
            size: bytes.len() as u64,
        })
    }

    async fn write_file(&self, dir: &DirHandle, name: &str, content: &[u8]) -> SyncResult<()> {
        validate_name(name)?;
        self.check_writable()?;
        let path = dir.child_path(name);
        let mut tree = self.lock();
        if !tree.dirs.contains(dir.path()) {
            return Err(SyncError::NotFound(dir.path().to_string()));
        }
        tree.files.insert(path, (content.to_vec(), Utc::now()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_entry(&self, dir: &DirHandle, name: &str, recursive: bool) -> SyncResult<()> {
        validate_name(name)?;
        self.check_writable()?;
        let path = dir.child_path(name);
        let mut tree = self.lock();

        if tree.files.remove(&path).is_some() {
            return Ok(());
        }
        if !tree.dirs.contains(&path) {
            return Err(SyncError::NotFound(path));
        }

        let prefix = format!("{path}/");
        let has_children = tree.dirs.iter().any(|d| d.starts_with(&prefix))
            || tree.files.keys().any(|f| f.starts_with(&prefix));
        if has_children && !recursive {
            return Err(SyncError::InvalidPath(format!("{path} is not empty")));
        }
        tree.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
        tree.files.retain(|f, _| !f.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_write_read_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFs::new(temp_dir.path());
        fs.verify_permission().await.unwrap();

        let agents = fs.get_subdir(&fs.root(), "agents", true).await.unwrap();
        assert_eq!(agents.path(), "agents");
        fs.write_file(&agents, "a1.md", b"hello").await.unwrap();
        fs.write_file(&agents, "a1.md", b"hello again").await.unwrap();

        let file = fs.read_file(&agents, "a1.md").await.unwrap();
        assert_eq!(file.text().unwrap(), "hello again");
        assert_eq!(file.size, 11);

        let entries = fs.list_entries(&agents).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry {
                name: "a1.md".into(),
                kind: EntryKind::File
            }]
        );
        assert!(!temp_dir.path().join(PROBE_FILE).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_local_concurrent_writes_to_one_path() {
        let temp_dir = TempDir::new().unwrap();
        let fs = std::sync::Arc::new(LocalFs::new(temp_dir.path()));
        let long = vec![b'a'; 200 * 1024];
        let short = vec![b'b'; 100 * 1024];

        for _ in 0..50 {
            let (fs_a, fs_b) = (fs.clone(), fs.clone());
            let (long_a, short_b) = (long.clone(), short.clone());
            let a = tokio::spawn(async move {
                fs_a.write_file(&fs_a.root(), "x.md", &long_a).await
            });
            let b = tokio::spawn(async move {
                fs_b.write_file(&fs_b.root(), "x.md", &short_b).await
            });
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let on_disk = std::fs::read(temp_dir.path().join("x.md")).unwrap();
            assert!(on_disk == long || on_disk == short);
        }

        let names: Vec<String> = fs
            .list_entries(&fs.root())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["x.md".to_string()]);
    }

    #[tokio::test]
    async fn test_local_missing_entries_are_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFs::new(temp_dir.path());

        let err = fs.get_subdir(&fs.root(), "memories", false).await.unwrap_err();
        assert!(err.is_not_found());
        let err = fs.read_file(&fs.root(), "nope.md").await.unwrap_err();
        assert!(err.is_not_found());
        let err = fs.remove_entry(&fs.root(), "nope.md", false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_local_missing_root_fails_verification() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFs::new(temp_dir.path().join("absent"));
        assert!(fs.verify_permission().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_local_recursive_remove() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFs::new(temp_dir.path());
        let studio = fs.get_subdir(&fs.root(), "studio", true).await.unwrap();
        let entry = fs.get_subdir(&studio, "s1", true).await.unwrap();
        fs.write_file(&entry, "s1.md", b"x").await.unwrap();

        fs.remove_entry(&studio, "s1", true).await.unwrap();
        assert!(!temp_dir.path().join("studio/s1").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let fs = MemoryFs::new("mem");
        let err = fs.get_subdir(&fs.root(), "..", true).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidPath(_)));
        let err = fs.write_file(&fs.root(), "a/b.md", b"").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_memory_fs_tree_operations() {
        let fs = MemoryFs::new("mem");
        let studio = fs.get_subdir(&fs.root(), "studio", true).await.unwrap();
        let entry = fs.get_subdir(&studio, "s1", true).await.unwrap();
        fs.write_file(&entry, "s1.md", b"meta").await.unwrap();
        fs.write_file(&entry, "img.png", &[0x89, 0x50]).await.unwrap();

        assert_eq!(fs.write_count(), 2);
        assert_eq!(
            fs.file_paths(),
            vec!["studio/s1/img.png", "studio/s1/s1.md"]
        );
        let listing = fs.list_entries(&studio).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].is_dir());

        assert!(fs.remove_entry(&studio, "s1", false).await.is_err());
        fs.remove_entry(&studio, "s1", true).await.unwrap();
        assert!(fs.file_paths().is_empty());
        assert!(fs.list_entries(&studio).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_fs_read_only() {
        let fs = MemoryFs::new("mem");
        fs.set_read_only(true);
        assert!(matches!(
            fs.verify_permission().await,
            Err(SyncError::PermissionDenied(_))
        ));
        assert!(fs.get_subdir(&fs.root(), "agents", true).await.is_err());
    }

    #[test]
    fn test_file_contents_encodings() {
        let file = FileContents {
            bytes: vec![0xff, 0x00],
            last_modified: Utc::now(),
            size: 2,
        };
        assert!(matches!(file.text(), Err(SyncError::Decode(_))));
        assert_eq!(file.base64(), "/wA=");
    }
}
