//! Adapter access in the I/O discipline of the current require.
//!
//! `require` and `require_async` share one async algorithm. In
//! [`IoMode::Sync`] every adapter call goes through the `*_sync` methods, so
//! the algorithm's futures never suspend and can be driven to completion
//! with `now_or_never`.

use codescript_runtime::split_query;

use crate::cache::Timestamp;
use crate::error::RequireResult;
use crate::platform::PlatformAdapter;
use crate::types::path_suffixes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Sync,
    Async,
}

impl IoMode {
    pub fn is_sync(self) -> bool {
        self == Self::Sync
    }
}

/// Platform adapter bound to an [`IoMode`].
#[derive(Clone, Copy)]
pub(crate) struct ModeIo<'a> {
    pub adapter: &'a dyn PlatformAdapter,
    pub mode: IoMode,
}

impl<'a> ModeIo<'a> {
    pub fn new(adapter: &'a dyn PlatformAdapter, mode: IoMode) -> Self {
        Self { adapter, mode }
    }

    pub async fn exists_file(&self, path: &str) -> RequireResult<bool> {
        match self.mode {
            IoMode::Sync => self.adapter.exists_file_sync(path),
            IoMode::Async => self.adapter.exists_file(path).await,
        }
    }

    pub async fn exists_folder(&self, path: &str) -> RequireResult<bool> {
        match self.mode {
            IoMode::Sync => self.adapter.exists_folder_sync(path),
            IoMode::Async => self.adapter.exists_folder(path).await,
        }
    }

    pub async fn read_file(&self, path: &str) -> RequireResult<String> {
        match self.mode {
            IoMode::Sync => self.adapter.read_file_sync(path),
            IoMode::Async => self.adapter.read_file(path).await,
        }
    }

    pub async fn get_timestamp(&self, path: &str) -> RequireResult<Timestamp> {
        match self.mode {
            IoMode::Sync => self.adapter.get_timestamp_sync(path),
            IoMode::Async => self.adapter.get_timestamp(path).await,
        }
    }

    /// First existing file among `path` and its suffixed variants. The
    /// query of `path` is carried over to the result.
    pub async fn find_existing_file_path(&self, path: &str) -> RequireResult<Option<String>> {
        let (clean_path, query) = split_query(path);
        for suffix in path_suffixes() {
            let candidate = format!("{clean_path}{suffix}");
            if self.exists_file(&candidate).await? {
                return Ok(Some(format!("{candidate}{query}")));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DesktopAdapter;
    use futures_util::FutureExt;

    #[test]
    fn test_sync_mode_completes_without_polling() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().replace('\\', "/");
        std::fs::write(dir.path().join("a.ts"), "").unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg").join("index.js"), "").unwrap();

        let adapter = DesktopAdapter::new();
        let io = ModeIo::new(&adapter, IoMode::Sync);

        let found = io
            .find_existing_file_path(&format!("{root}/a?x=1"))
            .now_or_never()
            .unwrap()
            .unwrap();
        assert_eq!(found, Some(format!("{root}/a.ts?x=1")));

        let index = io.find_existing_file_path(&format!("{root}/pkg")).now_or_never().unwrap().unwrap();
        assert_eq!(index, Some(format!("{root}/pkg/index.js")));

        let missing = io.find_existing_file_path(&format!("{root}/nope")).now_or_never().unwrap().unwrap();
        assert_eq!(missing, None);
    }
}
