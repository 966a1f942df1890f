//! Resolve command - show what an identifier resolves to.

use anyhow::Result;
use clap::Args;
use codescript_engine::RequireHandler;
use std::path::PathBuf;

#[derive(Args)]
pub struct ResolveCommand {
    /// Identifier as passed to require()
    pub id: String,

    /// Path of the requiring module
    #[arg(long, value_name = "PATH")]
    pub parent: Option<PathBuf>,
}

impl ResolveCommand {
    pub fn run(&self, handler: &RequireHandler) -> Result<()> {
        let parent = self.parent.as_ref().map(|path| path.to_string_lossy().replace('\\', "/"));
        let resolved = handler.resolve(&self.id, parent.as_deref())?;
        println!("{}\t{}", resolved.resolved_type, resolved.resolved_id);
        Ok(())
    }
}
