//! Requires command - list the literal require() calls of a file.

use anyhow::Result;
use clap::Args;
use codescript_runtime::extract_require_args;
use std::path::PathBuf;

#[derive(Args)]
pub struct RequiresCommand {
    /// Script to scan
    pub file: PathBuf,
}

impl RequiresCommand {
    pub fn run(&self) -> Result<()> {
        let source = std::fs::read_to_string(&self.file)?;
        for call in extract_require_args(&source)? {
            match call.options {
                Some(options) => println!("{}\t{}", call.id, options),
                None => println!("{}", call.id),
            }
        }
        Ok(())
    }
}
