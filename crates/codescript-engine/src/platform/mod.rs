//! Platform adapters.
//!
//! The require algorithm is shared; adapters supply file access and decide
//! what the platform can do synchronously.
//!
//! - [`DesktopAdapter`]: local filesystem, synchronous I/O available.
//! - [`MobileAdapter`]: any [`MobileFileSystem`], asynchronous only.
//! - [`EmulatedMobileAdapter`]: desktop I/O with mobile capabilities, for
//!   testing mobile behavior on a desktop.

mod desktop;
mod emulated;
mod mobile;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

pub use desktop::DesktopAdapter;
pub use emulated::EmulatedMobileAdapter;
pub use mobile::{EntryKind, FileStat, MemoryFileSystem, MobileAdapter, MobileFileSystem};

use crate::cache::Timestamp;
use crate::error::{RequireError, RequireResult};
use crate::host::Host;
use crate::types::ResolvedType;
use crate::value::ModuleExports;

/// Immediate children of a folder, as full paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

/// Current time in milliseconds since the Unix epoch.
pub fn now() -> Timestamp {
    to_timestamp(SystemTime::now())
}

pub(crate) fn to_timestamp(time: SystemTime) -> Timestamp {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// Filesystem access and capabilities of one platform.
///
/// Paths may carry a `?query`; adapters ignore it.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Short platform name for logs and errors.
    fn name(&self) -> &'static str;

    async fn exists_file(&self, path: &str) -> RequireResult<bool>;
    async fn exists_folder(&self, path: &str) -> RequireResult<bool>;
    async fn read_file(&self, path: &str) -> RequireResult<String>;
    async fn read_file_binary(&self, path: &str) -> RequireResult<Vec<u8>>;
    /// Modification time of `path`.
    async fn get_timestamp(&self, path: &str) -> RequireResult<Timestamp>;
    async fn list_folder(&self, path: &str) -> RequireResult<FolderListing>;

    /// Whether a module of this type can be loaded fresh by a synchronous
    /// require.
    fn can_require_non_cached(&self, resolved_type: ResolvedType) -> bool;

    /// Retry failed async requires synchronously when the user enabled it.
    fn supports_sync_fallback(&self) -> bool {
        false
    }

    /// Special modules this platform replaces with an empty module.
    fn skips_special_module(&self, _id: &str) -> bool {
        false
    }

    fn exists_file_sync(&self, _path: &str) -> RequireResult<bool> {
        Err(self.sync_unsupported())
    }

    fn exists_folder_sync(&self, _path: &str) -> RequireResult<bool> {
        Err(self.sync_unsupported())
    }

    fn read_file_sync(&self, _path: &str) -> RequireResult<String> {
        Err(self.sync_unsupported())
    }

    fn get_timestamp_sync(&self, _path: &str) -> RequireResult<Timestamp> {
        Err(self.sync_unsupported())
    }

    /// Load a native addon from `path`, or from `contents` when the addon
    /// was downloaded.
    async fn require_node_binary(
        &self,
        host: &dyn Host,
        path: &str,
        contents: Option<Vec<u8>>,
    ) -> RequireResult<ModuleExports>;

    fn require_node_binary_sync(&self, _host: &dyn Host, _path: &str) -> RequireResult<ModuleExports> {
        Err(self.sync_unsupported())
    }

    fn sync_unsupported(&self) -> RequireError {
        RequireError::unsupported_sync(format!("Cannot require synchronously on {}.", self.name()))
    }
}
