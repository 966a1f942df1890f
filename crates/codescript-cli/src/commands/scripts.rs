//! Scripts command - list invocable scripts and the startup script.

use anyhow::Result;
use clap::Args;
use codescript_engine::RequireHandler;

#[derive(Args)]
pub struct ScriptsCommand {
    /// Also print the configured startup script
    #[arg(long)]
    pub startup: bool,
}

impl ScriptsCommand {
    pub async fn run(&self, handler: &RequireHandler) -> Result<()> {
        let settings = handler.settings();
        let folder = settings.invocable_scripts_folder();
        if folder.is_empty() {
            tracing::info!("No invocable scripts folder configured");
        }

        for script in handler.list_invocable_scripts().await? {
            println!("{folder}/{script}");
        }

        if self.startup {
            match settings.startup_script_path() {
                path if path.is_empty() => println!("startup: (not configured)"),
                path => println!("startup: {path}"),
            }
        }
        Ok(())
    }
}
