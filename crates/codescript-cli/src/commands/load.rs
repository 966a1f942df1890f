//! Load command - require a module and print its exports.
//!
//! No JavaScript engine is attached, so this loads data modules (JSON) and
//! reports what script modules would need.

use anyhow::Result;
use clap::Args;
use codescript_engine::console::format_value;
use codescript_engine::{CacheInvalidationMode, ModuleType, RequireHandler, RequireOptions};
use std::path::PathBuf;

#[derive(Args)]
pub struct LoadCommand {
    /// Identifier as passed to require()
    pub id: String,

    /// Path of the requiring module
    #[arg(long, value_name = "PATH")]
    pub parent: Option<PathBuf>,

    /// Override the module type (json, jsTs, md, node, wasm)
    #[arg(long = "type", value_name = "TYPE")]
    pub module_type: Option<ModuleType>,

    /// Cache invalidation mode (always, never, whenPossible)
    #[arg(long, value_name = "MODE")]
    pub mode: Option<CacheInvalidationMode>,

    /// Load synchronously, as require() would
    #[arg(long)]
    pub sync: bool,
}

impl LoadCommand {
    pub async fn run(&self, handler: &RequireHandler) -> Result<()> {
        let mut options = RequireOptions::new();
        if let Some(parent) = &self.parent {
            options = options.parent_path(parent.to_string_lossy().replace('\\', "/"));
        }
        if let Some(module_type) = self.module_type {
            options = options.module_type(module_type);
        }
        if let Some(mode) = self.mode {
            options = options.cache_invalidation_mode(mode);
        }

        let exports = if self.sync {
            handler.require(&self.id, options)?
        } else {
            handler.require_async(&self.id, options).await?
        };

        match exports.as_json() {
            Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
            None => println!("{}", format_value(&exports)),
        }
        Ok(())
    }
}
