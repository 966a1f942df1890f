//! Codescript module loading engine.
//!
//! This crate implements `require` / `requireAsync` for user scripts kept
//! inside a data folder: identifier resolution, `package.json` exports,
//! a timestamp-validated module cache, and platform adapters for desktop
//! and mobile filesystems.
//!
//! # Features
//!
//! - **Resolution**: relative paths, `//` data-root and `/` modules-root
//!   prefixes, `~/` system paths, bare package names, URLs
//! - **Packages**: `exports` / `imports` maps with condition priority and
//!   wildcard subpaths
//! - **Caching**: reload when a file or any dependency changed, with
//!   `always` / `never` / `whenPossible` modes
//! - **Sync and async**: one algorithm, run synchronously when the platform
//!   allows it
//! - **Markdown**: load a named code block out of a note
//!
//! # Example
//!
//! ```no_run
//! use codescript_engine::{RequireHandler, RequireHandlerConfig, RequireOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = RequireHandler::builder(RequireHandlerConfig::new("/path/to/vault")).build();
//!
//!     let resolved = handler.resolve("./lib/util.ts", Some("/path/to/vault/scripts/main.ts"))?;
//!     println!("{} ({})", resolved.resolved_id, resolved.resolved_type);
//!
//!     let exports = handler.require_async("//scripts/data.json", RequireOptions::default()).await?;
//!     println!("{exports:?}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod caller;
pub mod console;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod handler;
pub mod host;
mod io;
mod loader;
pub mod package;
pub mod path;
pub mod platform;
pub mod require;
pub mod resolver;
mod scripts;
pub mod settings;
pub mod special;
pub mod types;
pub mod value;

pub use cache::{ModuleCache, Timestamp};
pub use caller::{CallerLocator, StackTraceLocator, parse_caller_from_stack};
pub use console::{ConsoleEntry, ConsoleLevel, ScriptConsole, set_console_handler};
pub use context::ModuleContext;
pub use error::{RequireError, RequireResult, SYNC_REQUIRE_ADVICE};
pub use evaluator::{CompiledUnit, Evaluation, Evaluator, NoEvaluator};
pub use handler::{DEFAULT_RESOURCE_URL_PREFIX, RequireHandler, RequireHandlerBuilder, RequireHandlerConfig};
pub use host::{Host, NoopHost};
pub use io::IoMode;
pub use package::{CONDITION_PRIORITY, ModuleName, PackageManifest, split_module_name};
pub use platform::{
    DesktopAdapter, EmulatedMobileAdapter, EntryKind, FileStat, FolderListing, MemoryFileSystem, MobileAdapter,
    MobileFileSystem, PlatformAdapter,
};
pub use require::{AsyncWrapperBinding, ChildRequire};
pub use resolver::Resolver;
pub use settings::Settings;
pub use special::{SpecialModuleKind, SpecialModules};
pub use types::{CacheInvalidationMode, ModuleType, RequireOptions, ResolveResult, ResolvedType};
pub use value::{ExportsObject, HostValue, ModuleExports, ModuleRecord, PendingExports, ScriptFunction};

// Re-export the transform configuration for embedders
pub use codescript_runtime::{TransformConfig, TransformError};
