use async_trait::async_trait;

use super::mobile::{node_binary_unsupported, skips_special_module};
use super::{DesktopAdapter, FolderListing, PlatformAdapter};
use crate::cache::Timestamp;
use crate::error::RequireResult;
use crate::host::Host;
use crate::types::ResolvedType;
use crate::value::ModuleExports;

/// Desktop file access with mobile restrictions.
///
/// Lets mobile behavior (no synchronous loads, no native addons, no
/// `crypto`) be exercised against a local folder.
#[derive(Debug, Clone, Default)]
pub struct EmulatedMobileAdapter {
    desktop: DesktopAdapter,
}

impl EmulatedMobileAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlatformAdapter for EmulatedMobileAdapter {
    fn name(&self) -> &'static str {
        "emulated mobile"
    }

    async fn exists_file(&self, path: &str) -> RequireResult<bool> {
        self.desktop.exists_file(path).await
    }

    async fn exists_folder(&self, path: &str) -> RequireResult<bool> {
        self.desktop.exists_folder(path).await
    }

    async fn read_file(&self, path: &str) -> RequireResult<String> {
        self.desktop.read_file(path).await
    }

    async fn read_file_binary(&self, path: &str) -> RequireResult<Vec<u8>> {
        self.desktop.read_file_binary(path).await
    }

    async fn get_timestamp(&self, path: &str) -> RequireResult<Timestamp> {
        self.desktop.get_timestamp(path).await
    }

    async fn list_folder(&self, path: &str) -> RequireResult<FolderListing> {
        self.desktop.list_folder(path).await
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_desktop_io_with_mobile_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.ts");
        tokio::fs::write(&file, "1").await.unwrap();
        let file = crate::path::to_posix(&file.to_string_lossy());

        let adapter = EmulatedMobileAdapter::new();
        assert!(adapter.exists_file(&file).await.unwrap());
        assert_eq!(adapter.read_file(&file).await.unwrap(), "1");
        assert!(!adapter.can_require_non_cached(ResolvedType::Path));
        assert!(adapter.exists_file_sync(&file).is_err());
        assert!(adapter.skips_special_module("node:crypto"));
    }
}
