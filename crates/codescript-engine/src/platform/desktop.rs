use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use codescript_runtime::trim_query;
use tracing::debug;

use super::{FolderListing, PlatformAdapter, to_timestamp};
use crate::cache::Timestamp;
use crate::error::{RequireError, RequireResult};
use crate::host::Host;
use crate::types::ResolvedType;
use crate::value::ModuleExports;

/// Local filesystem adapter.
#[derive(Debug, Clone, Default)]
pub struct DesktopAdapter {
    temp_folder: Option<PathBuf>,
}

impl DesktopAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folder downloaded native addons are written to before loading.
    /// Defaults to the system temp folder.
    pub fn with_temp_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.temp_folder = Some(folder.into());
        self
    }

    async fn metadata(path: &str) -> RequireResult<Option<std::fs::Metadata>> {
        match tokio::fs::metadata(trim_query(path)).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RequireError::io(path, e)),
        }
    }

    fn metadata_sync(path: &str) -> RequireResult<Option<std::fs::Metadata>> {
        match std::fs::metadata(trim_query(path)) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RequireError::io(path, e)),
        }
    }

    fn modified(path: &str, metadata: &std::fs::Metadata) -> RequireResult<Timestamp> {
        metadata
            .modified()
            .map(to_timestamp)
            .map_err(|e| RequireError::io(path, e))
    }
}

#[async_trait]
impl PlatformAdapter for DesktopAdapter {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn exists_file(&self, path: &str) -> RequireResult<bool> {
        Ok(Self::metadata(path).await?.is_some_and(|m| m.is_file()))
    }

    async fn exists_folder(&self, path: &str) -> RequireResult<bool> {
        Ok(Self::metadata(path).await?.is_some_and(|m| m.is_dir()))
    }

    async fn read_file(&self, path: &str) -> RequireResult<String> {
        tokio::fs::read_to_string(trim_query(path))
            .await
            .map_err(|e| RequireError::io(path, e))
    }

    async fn read_file_binary(&self, path: &str) -> RequireResult<Vec<u8>> {
        tokio::fs::read(trim_query(path))
            .await
            .map_err(|e| RequireError::io(path, e))
    }

    async fn get_timestamp(&self, path: &str) -> RequireResult<Timestamp> {
        let metadata = tokio::fs::metadata(trim_query(path))
            .await
            .map_err(|e| RequireError::io(path, e))?;
        Self::modified(path, &metadata)
    }

    async fn list_folder(&self, path: &str) -> RequireResult<FolderListing> {
        let mut listing = FolderListing::default();
        let mut entries = tokio::fs::read_dir(trim_query(path))
            .await
            .map_err(|e| RequireError::io(path, e))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| RequireError::io(path, e))? {
            let file_type = entry.file_type().await.map_err(|e| RequireError::io(path, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let full = crate::path::join(&[path, &name]);
            if file_type.is_dir() {
                listing.folders.push(full);
            } else if file_type.is_file() {
                listing.files.push(full);
            }
        }

        Ok(listing)
    }

    fn can_require_non_cached(&self, resolved_type: ResolvedType) -> bool {
        resolved_type != ResolvedType::Url
    }

    fn supports_sync_fallback(&self) -> bool {
        true
    }

    fn exists_file_sync(&self, path: &str) -> RequireResult<bool> {
        Ok(Self::metadata_sync(path)?.is_some_and(|m| m.is_file()))
    }

    fn exists_folder_sync(&self, path: &str) -> RequireResult<bool> {
        Ok(Self::metadata_sync(path)?.is_some_and(|m| m.is_dir()))
    }

    fn read_file_sync(&self, path: &str) -> RequireResult<String> {
        std::fs::read_to_string(trim_query(path)).map_err(|e| RequireError::io(path, e))
    }

    fn get_timestamp_sync(&self, path: &str) -> RequireResult<Timestamp> {
        let metadata = std::fs::metadata(trim_query(path)).map_err(|e| RequireError::io(path, e))?;
        Self::modified(path, &metadata)
    }

    async fn require_node_binary(
        &self,
        host: &dyn Host,
        path: &str,
        contents: Option<Vec<u8>>,
    ) -> RequireResult<ModuleExports> {
        let Some(contents) = contents else {
            return host.require_native(trim_query(path));
        };

        let mut builder = tempfile::Builder::new();
        builder.suffix(".node");
        let temp = match &self.temp_folder {
            Some(folder) => {
                tokio::fs::create_dir_all(folder)
                    .await
                    .map_err(|e| RequireError::io(folder.display().to_string(), e))?;
                builder.tempfile_in(folder)
            }
            None => builder.tempfile(),
        }
        .map_err(|e| RequireError::io(path, e))?;

        tokio::fs::write(temp.path(), &contents)
            .await
            .map_err(|e| RequireError::io(temp.path().display().to_string(), e))?;

        let temp_path = crate::path::to_posix(&temp.path().to_string_lossy());
        debug!(url = path, temp = %temp_path, "loading downloaded native module");
        // The temp file is removed when `temp` drops.
        host.require_native(&temp_path)
    }

    fn require_node_binary_sync(&self, host: &dyn Host, path: &str) -> RequireResult<ModuleExports> {
        host.require_native(trim_query(path))
    }
}
