//! Services the embedding application provides.

use async_trait::async_trait;

use crate::error::{RequireError, RequireResult};
use crate::types::RequireOptions;
use crate::value::ModuleExports;

/// Application hooks used while loading modules.
///
/// Every method has a default so hosts only implement what they support.
#[async_trait]
pub trait Host: Send + Sync {
    /// Application handle exposed to scripts as `app` and `obsidian/app`.
    fn app(&self) -> ModuleExports {
        ModuleExports::Empty
    }

    /// Path of the note or file currently focused, used as a last-resort
    /// parent for relative identifiers.
    fn active_file_path(&self) -> Option<String> {
        None
    }

    /// Module the host itself bundles (`obsidian`, `@codemirror/view`, ...).
    fn builtin_module(&self, id: &str, _options: &RequireOptions) -> RequireResult<ModuleExports> {
        Err(RequireError::platform(format!("Host does not provide builtin module '{id}'")))
    }

    /// Node builtin such as `fs` or `path`, without the `node:` prefix.
    fn node_builtin(&self, id: &str) -> RequireResult<ModuleExports> {
        Err(RequireError::platform(format!("Host does not provide node builtin '{id}'")))
    }

    /// Load a native addon from a file.
    fn require_native(&self, path: &str) -> RequireResult<ModuleExports> {
        Err(RequireError::platform(format!("Host cannot load native module '{path}'")))
    }

    /// Instantiate a WebAssembly module.
    async fn instantiate_wasm(&self, path: &str, _bytes: Vec<u8>) -> RequireResult<ModuleExports> {
        Err(RequireError::platform(format!("Host cannot instantiate WebAssembly module '{path}'")))
    }
}

/// Host with no services.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl Host for NoopHost {}
