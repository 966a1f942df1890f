//! Configuration file parsing for codescript.toml.

use codescript_engine::Settings;
use codescript_runtime::TransformConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Data root the scripts live in. Defaults to the current directory.
    pub vault: Option<PathBuf>,

    /// Host settings file (JSON, camelCase keys) to start from
    pub settings_file: Option<PathBuf>,

    /// Overrides applied on top of the settings file
    #[serde(default)]
    pub settings: SettingsConfig,

    #[serde(default)]
    pub transform: TransformSection,
}

/// Require handler settings.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsConfig {
    pub modules_root: Option<String>,
    pub invocable_scripts_folder: Option<String>,
    pub startup_script_path: Option<String>,
    pub should_use_sync_fallback: Option<bool>,
}

/// Transform settings.
#[derive(Debug, Deserialize)]
pub struct TransformSection {
    /// Append inline source maps
    #[serde(default = "default_true")]
    pub source_maps: bool,

    /// Enable decorator syntax
    #[serde(default = "default_true")]
    pub decorators: bool,
}

impl Default for TransformSection {
    fn default() -> Self {
        Self {
            source_maps: true,
            decorators: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Data root, with a leading `~` expanded to the home directory.
    pub fn vault_path(&self, override_path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = match override_path.or(self.vault.as_deref()) {
            Some(path) => expand_home(path),
            None => std::env::current_dir()?,
        };
        Ok(path)
    }

    pub async fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.settings_file {
            Some(path) => Settings::load(path).await?,
            None => Settings::default(),
        };

        let overrides = &self.settings;
        if let Some(modules_root) = &overrides.modules_root {
            settings.modules_root = modules_root.clone();
        }
        if let Some(folder) = &overrides.invocable_scripts_folder {
            settings.invocable_scripts_folder = folder.clone();
        }
        if let Some(path) = &overrides.startup_script_path {
            settings.startup_script_path = path.clone();
        }
        if let Some(fallback) = overrides.should_use_sync_fallback {
            settings.should_use_sync_fallback = fallback;
        }

        Ok(settings)
    }

    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig::new()
            .source_maps(self.transform.source_maps)
            .decorators(self.transform.decorators)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            Ok(config)
        }
        _ => Ok(Config::default()),
    }
}

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    const CONFIG_NAMES: &[&str] = &["codescript.toml", ".codescriptrc.toml"];

    let mut dir = Some(cwd.as_path());
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}
