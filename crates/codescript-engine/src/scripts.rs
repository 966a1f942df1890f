//! Invocable and startup scripts.
//!
//! Script paths are relative to the data root. A script exports an
//! `invoke(app)` function and, for the startup script, an optional
//! `cleanup(app)`.

use codescript_runtime::{NoteSettings, note_settings_from_content};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::error::{RequireError, RequireResult};
use crate::handler::RequireHandler;
use crate::path::{basename, join};
use crate::types::{RequireOptions, VAULT_ROOT_PREFIX};
use crate::value::ModuleExports;

const SCRIPT_EXTENSIONS: [&str; 6] = [".js", ".cjs", ".mjs", ".ts", ".cts", ".mts"];

fn is_markdown(path: &str) -> bool {
    path.to_lowercase().ends_with(".md")
}

fn sorted_base_names(paths: &[String]) -> Vec<String> {
    let mut names: Vec<String> = paths.iter().map(|path| basename(path).to_string()).collect();
    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    names
}

impl RequireHandler {
    fn absolute_script_path(&self, path: &str) -> String {
        join(&[self.data_root(), path])
    }

    async fn note_settings(&self, path: &str) -> RequireResult<NoteSettings> {
        let content = self.adapter.read_file(&self.absolute_script_path(path)).await?;
        Ok(note_settings_from_content(&content))
    }

    /// Scripts under the invocable scripts folder, relative to it.
    ///
    /// Empty when no folder is configured.
    pub async fn list_invocable_scripts(&self) -> RequireResult<Vec<String>> {
        let folder = self.settings().invocable_scripts_folder();
        if folder.is_empty() {
            return Ok(Vec::new());
        }

        if !self.adapter.exists_folder(&self.absolute_script_path(&folder)).await? {
            return Err(RequireError::resolution(format!(
                "Invocable scripts folder not found: {folder}"
            )));
        }

        self.collect_scripts(&folder, "").await
    }

    fn collect_scripts<'a>(&'a self, scripts_folder: &'a str, folder: &'a str) -> BoxFuture<'a, RequireResult<Vec<String>>> {
        async move {
            let listing = self
                .adapter
                .list_folder(&self.absolute_script_path(&join(&[scripts_folder, folder])))
                .await?;

            let mut scripts = Vec::new();
            for name in sorted_base_names(&listing.files) {
                let relative = join(&[folder, &name]);
                let lower = name.to_lowercase();
                let is_script = SCRIPT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
                let is_invocable_note = is_markdown(&name)
                    && self.note_settings(&join(&[scripts_folder, &relative])).await?.is_invocable;
                if is_script || is_invocable_note {
                    scripts.push(relative);
                }
            }

            for name in sorted_base_names(&listing.folders) {
                let nested = self.collect_scripts(scripts_folder, &join(&[folder, &name])).await?;
                scripts.extend(nested);
            }

            Ok(scripts)
        }
        .boxed()
    }

    /// Load the script at `path` and return its exports.
    async fn require_script(&self, path: &str) -> RequireResult<ModuleExports> {
        if !self.adapter.exists_file(&self.absolute_script_path(path)).await? {
            return Err(RequireError::resolution(format!("Script not found: '{path}'.")));
        }

        let mut id = format!("{VAULT_ROOT_PREFIX}{path}");
        if is_markdown(path) {
            let settings = self.note_settings(path).await?;
            if !settings.is_invocable {
                return Err(RequireError::resolution(format!("Script is not invocable: '{path}'.")));
            }
            if !settings.invocable_code_script_name.is_empty() {
                id.push_str(&format!("?codeScriptName={}", settings.invocable_code_script_name));
            }
        }

        self.require_async(&id, RequireOptions::default()).await
    }

    /// Call the `invoke` export of the script at `path`.
    pub async fn invoke_script(&self, path: &str) -> RequireResult<ModuleExports> {
        debug!(path, "invoking script");
        let script = self.require_script(path).await?;
        let Some(ModuleExports::Function(invoke)) = script.get("invoke") else {
            return Err(RequireError::evaluation(format!("{path} does not export invoke() function")));
        };

        let result = invoke.call(vec![self.host.app()]).await?;
        debug!(path, "script executed successfully");
        Ok(result)
    }

    /// Configured startup script, if it exists.
    async fn startup_script(&self, warn_if_not_configured: bool) -> RequireResult<Option<String>> {
        let path = self.settings().startup_script_path();
        if path.is_empty() {
            if warn_if_not_configured {
                warn!("Startup script is not configured");
            }
            return Ok(None);
        }

        if !self.adapter.exists_file(&self.absolute_script_path(&path)).await? {
            error!("Startup script not found: {path}");
            return Ok(None);
        }

        Ok(Some(path))
    }

    pub async fn invoke_startup_script(&self) -> RequireResult<()> {
        let Some(path) = self.startup_script(false).await? else {
            return Ok(());
        };

        info!(path = %path, "invoking startup script");
        self.invoke_script(&path).await?;
        Ok(())
    }

    /// Call the optional `cleanup` export of the startup script.
    pub async fn cleanup_startup_script(&self) -> RequireResult<()> {
        let Some(path) = self.startup_script(false).await? else {
            return Ok(());
        };

        let script = self.require_script(&path).await?;
        if let Some(ModuleExports::Function(cleanup)) = script.get("cleanup") {
            debug!(path = %path, "cleaning up startup script");
            cleanup.call(vec![self.host.app()]).await?;
        }
        Ok(())
    }

    pub async fn reload_startup_script(&self) -> RequireResult<()> {
        if self.startup_script(true).await?.is_none() {
            return Ok(());
        }

        self.cleanup_startup_script().await?;
        self.invoke_startup_script().await
    }
}
