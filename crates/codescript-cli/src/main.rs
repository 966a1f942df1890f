use anyhow::Result;
use clap::{Parser, Subcommand};
use codescript_engine::{ConsoleLevel, RequireHandler, RequireHandlerConfig, set_console_handler};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::{
    load::LoadCommand, requires::RequiresCommand, resolve::ResolveCommand, scripts::ScriptsCommand,
    transform::TransformCommand,
};

#[derive(Parser)]
#[command(name = "codescript", version, about = "Inspect how a vault's scripts are resolved and loaded")]
struct Cli {
    /// Configuration file (defaults to codescript.toml in the current or a parent directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Vault directory, overriding the configuration
    #[arg(long, global = true, value_name = "DIR")]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an identifier to a module, path or URL
    Resolve(ResolveCommand),
    /// Require a module and print its exports
    Load(LoadCommand),
    /// Print the evaluable form of a script or markdown code block
    Transform(TransformCommand),
    /// List the literal require() calls of a script
    Requires(RequiresCommand),
    /// List invocable scripts
    Scripts(ScriptsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    set_console_handler(|level, script, message| match level {
        ConsoleLevel::Warn | ConsoleLevel::Error => eprintln!("[{script}] {message}"),
        _ => println!("[{script}] {message}"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Transform(cmd) => return cmd.run(&config.transform_config()),
        Commands::Requires(cmd) => return cmd.run(),
        _ => {}
    }

    let vault = config.vault_path(cli.vault.as_deref())?;
    let data_root = vault.to_string_lossy().replace('\\', "/");
    let handler = RequireHandler::builder(
        RequireHandlerConfig::new(data_root)
            .settings(config.settings().await?)
            .transform(config.transform_config()),
    )
    .build();

    match &cli.command {
        Commands::Resolve(cmd) => cmd.run(&handler)?,
        Commands::Load(cmd) => cmd.run(&handler).await?,
        Commands::Scripts(cmd) => cmd.run(&handler).await?,
        Commands::Transform(_) | Commands::Requires(_) => {}
    }

    Ok(())
}
