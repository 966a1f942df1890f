//! User-facing settings.
//!
//! Stored by the host as camelCase JSON; unknown keys are ignored and
//! missing ones take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RequireError, RequireResult};
use crate::path::join;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Folder listed for script invocation, relative to `modules_root`.
    pub invocable_scripts_folder: String,
    /// Polling interval hint for hosts without a filesystem watcher.
    pub mobile_changes_checking_interval_in_seconds: u64,
    /// Folder, relative to the data root, that `/` and bare module names
    /// resolve against.
    pub modules_root: String,
    pub should_handle_protocol_urls: bool,
    /// Retry a failed async require synchronously on desktop.
    pub should_use_sync_fallback: bool,
    /// Script invoked on startup, relative to `modules_root`.
    pub startup_script_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            invocable_scripts_folder: String::new(),
            mobile_changes_checking_interval_in_seconds: 30,
            modules_root: String::new(),
            should_handle_protocol_urls: false,
            should_use_sync_fallback: false,
            startup_script_path: String::new(),
        }
    }
}

impl Settings {
    pub fn invocable_scripts_folder(&self) -> String {
        self.relative_to_modules_root(&self.invocable_scripts_folder)
    }

    pub fn startup_script_path(&self) -> String {
        self.relative_to_modules_root(&self.startup_script_path)
    }

    fn relative_to_modules_root(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        if self.modules_root.is_empty() {
            return path.to_string();
        }
        join(&[&self.modules_root, path])
    }

    /// Load settings from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> RequireResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RequireError::io(&display, e))?;
        serde_json::from_str(&content).map_err(|e| RequireError::json(display, e))
    }
}
