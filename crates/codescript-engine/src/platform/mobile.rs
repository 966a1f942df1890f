use std::sync::Arc;

use async_trait::async_trait;
use codescript_runtime::trim_query;
use dashmap::DashMap;
use tracing::warn;

use super::{FolderListing, PlatformAdapter, now};
use crate::cache::Timestamp;
use crate::error::{RequireError, RequireResult};
use crate::host::Host;
use crate::special::normalize_node_builtin;
use crate::types::ResolvedType;
use crate::value::ModuleExports;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    /// Modification time, when the filesystem reports one.
    pub mtime: Option<Timestamp>,
}

/// Asynchronous filesystem a mobile host exposes.
#[async_trait]
pub trait MobileFileSystem: Send + Sync {
    async fn exists(&self, path: &str) -> RequireResult<bool>;
    async fn stat(&self, path: &str) -> RequireResult<FileStat>;
    async fn read(&self, path: &str) -> RequireResult<String>;
    async fn read_binary(&self, path: &str) -> RequireResult<Vec<u8>>;
    async fn list(&self, path: &str) -> RequireResult<FolderListing>;
}

/// Adapter over a [`MobileFileSystem`].
///
/// Nothing can be loaded synchronously, native addons are unavailable and
/// `crypto` is replaced with an empty module.
#[derive(Clone)]
pub struct MobileAdapter {
    fs: Arc<dyn MobileFileSystem>,
}

impl MobileAdapter {
    pub fn new(fs: Arc<dyn MobileFileSystem>) -> Self {
        Self { fs }
    }

    async fn is_kind(&self, path: &str, kind: EntryKind) -> RequireResult<bool> {
        let path = trim_query(path);
        if !self.fs.exists(path).await? {
            return Ok(false);
        }
        Ok(self.fs.stat(path).await?.kind == kind)
    }
}

/// Capability checks shared with [`super::EmulatedMobileAdapter`].
pub(super) fn skips_special_module(id: &str) -> bool {
    if normalize_node_builtin(id) == Some("crypto") {
        warn!("Crypto module is not available on mobile. Consider using window.scrypt instead");
        return true;
    }
    false
}

pub(super) fn node_binary_unsupported() -> RequireError {
    RequireError::platform("Cannot require node binary on mobile")
}

#[async_trait]
impl PlatformAdapter for MobileAdapter {
    fn name(&self) -> &'static str {
        "mobile"
    }

    async fn exists_file(&self, path: &str) -> RequireResult<bool> {
        self.is_kind(path, EntryKind::File).await
    }

    async fn exists_folder(&self, path: &str) -> RequireResult<bool> {
        self.is_kind(path, EntryKind::Folder).await
    }

    async fn read_file(&self, path: &str) -> RequireResult<String> {
        self.fs.read(trim_query(path)).await
    }

    async fn read_file_binary(&self, path: &str) -> RequireResult<Vec<u8>> {
        self.fs.read_binary(trim_query(path)).await
    }

    async fn get_timestamp(&self, path: &str) -> RequireResult<Timestamp> {
        Ok(self.fs.stat(trim_query(path)).await?.mtime.unwrap_or_default())
    }

    async fn list_folder(&self, path: &str) -> RequireResult<FolderListing> {
        self.fs.list(trim_query(path)).await
    }

    fn can_require_non_cached(&self, _resolved_type: ResolvedType) -> bool {
        false
    }

    fn skips_special_module(&self, id: &str) -> bool {
        skips_special_module(id)
    }

    async fn require_node_binary(
        &self,
        _host: &dyn Host,
        _path: &str,
        _contents: Option<Vec<u8>>,
    ) -> RequireResult<ModuleExports> {
        Err(node_binary_unsupported())
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    mtime: Timestamp,
}

/// In-memory [`MobileFileSystem`]; folders are implied by file paths.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: DashMap<String, MemoryFile>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file, stamping it with the current time.
    pub fn write(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.write_with_mtime(path, contents, now());
    }

    pub fn write_with_mtime(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>, mtime: Timestamp) {
        self.files.insert(
            path.into(),
            MemoryFile {
                contents: contents.into(),
                mtime,
            },
        );
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    fn folder_prefix(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }

    fn is_folder(&self, path: &str) -> bool {
        let prefix = Self::folder_prefix(path);
        self.files.iter().any(|entry| entry.key().starts_with(&prefix))
    }

    fn not_found(path: &str) -> RequireError {
        RequireError::io(path, std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or folder"))
    }

    fn file(&self, path: &str) -> RequireResult<MemoryFile> {
        self.files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(path))
    }
}

#[async_trait]
impl MobileFileSystem for MemoryFileSystem {
    async fn exists(&self, path: &str) -> RequireResult<bool> {
        Ok(self.files.contains_key(path) || self.is_folder(path))
    }

    async fn stat(&self, path: &str) -> RequireResult<FileStat> {
        if let Some(file) = self.files.get(path) {
            return Ok(FileStat {
                kind: EntryKind::File,
                mtime: Some(file.mtime),
            });
        }
        if self.is_folder(path) {
            return Ok(FileStat {
                kind: EntryKind::Folder,
                mtime: None,
            });
        }
        Err(Self::not_found(path))
    }

    async fn read(&self, path: &str) -> RequireResult<String> {
        let file = self.file(path)?;
        String::from_utf8(file.contents).map_err(|e| {
            RequireError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    async fn read_binary(&self, path: &str) -> RequireResult<Vec<u8>> {
        Ok(self.file(path)?.contents)
    }

    async fn list(&self, path: &str) -> RequireResult<FolderListing> {
        let prefix = Self::folder_prefix(path);
        let mut files = Vec::new();
        let mut folders = Vec::new();

        for entry in self.files.iter() {
            let Some(rest) = entry.key().strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None => files.push(entry.key().clone()),
                Some((folder, _)) => {
                    let folder = format!("{prefix}{folder}");
                    if !folders.contains(&folder) {
                        folders.push(folder);
                    }
                }
            }
        }

        files.sort();
        folders.sort();
        Ok(FolderListing { files, folders })
    }
}
