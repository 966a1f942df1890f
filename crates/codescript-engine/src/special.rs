//! Identifiers served by the host instead of the filesystem.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{RequireError, RequireResult};
use crate::types::{NODE_BUILTIN_MODULE_PREFIX, RequireOptions};
use crate::value::ModuleExports;

/// Resolves to the host application handle.
pub const APP_MODULE: &str = "obsidian/app";
/// Resolves to the list of [`HOST_BUILTIN_MODULES`].
pub const BUILTIN_MODULE_NAMES_MODULE: &str = "obsidian/builtInModuleNames";

/// Modules the host application bundles.
pub const HOST_BUILTIN_MODULES: &[&str] = &[
    "obsidian",
    "@codemirror/autocomplete",
    "@codemirror/collab",
    "@codemirror/commands",
    "@codemirror/language",
    "@codemirror/lint",
    "@codemirror/search",
    "@codemirror/state",
    "@codemirror/text",
    "@codemirror/view",
    "@lezer/common",
    "@lezer/lr",
    "@lezer/highlight",
];

/// Known Node.js builtin modules
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Normalize a Node.js builtin specifier.
///
/// `node:fs/promises` and `fs/promises` both give `Some("fs/promises")`;
/// unknown names give `None`.
pub fn normalize_node_builtin(specifier: &str) -> Option<&str> {
    let name = specifier.strip_prefix(NODE_BUILTIN_MODULE_PREFIX).unwrap_or(specifier);
    let base = name.split('/').next()?;

    if NODE_BUILTINS.contains(&base) {
        Some(name)
    } else {
        None
    }
}

/// Produces a registered module's exports.
pub type SpecialModuleFactory = Arc<dyn Fn(&RequireOptions) -> RequireResult<ModuleExports> + Send + Sync>;

/// What kind of special module an identifier names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialModuleKind {
    App,
    BuiltinModuleNames,
    /// Registered with [`SpecialModules::register`].
    Registered,
    /// Registered with [`SpecialModules::forbid`]; holds the reason.
    Forbidden(String),
    HostBuiltin,
    /// Node builtin, normalized without the `node:` prefix.
    NodeBuiltin(String),
    /// Electron and modules packed inside the application archive.
    HostInternal,
}

/// Registry of special identifiers.
#[derive(Default)]
pub struct SpecialModules {
    factories: DashMap<String, SpecialModuleFactory>,
    forbidden: DashMap<String, String>,
}

impl SpecialModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `id` from `factory`. Replaces any earlier registration.
    pub fn register<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn(&RequireOptions) -> RequireResult<ModuleExports> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Make requiring `id` fail with `reason`.
    pub fn forbid(&self, id: impl Into<String>, reason: impl Into<String>) {
        self.forbidden.insert(id.into(), reason.into());
    }

    pub fn unregister(&self, id: &str) -> bool {
        let removed_factory = self.factories.remove(id).is_some();
        let removed_forbidden = self.forbidden.remove(id).is_some();
        removed_factory || removed_forbidden
    }

    pub fn builtin_module_names(&self) -> Vec<String> {
        HOST_BUILTIN_MODULES.iter().map(|name| name.to_string()).collect()
    }

    /// Classify `id` (without query). `None` means a regular module.
    pub fn classify(&self, id: &str) -> Option<SpecialModuleKind> {
        if let Some(reason) = self.forbidden.get(id) {
            return Some(SpecialModuleKind::Forbidden(reason.value().clone()));
        }
        if self.factories.contains_key(id) {
            return Some(SpecialModuleKind::Registered);
        }
        if id == APP_MODULE {
            return Some(SpecialModuleKind::App);
        }
        if id == BUILTIN_MODULE_NAMES_MODULE {
            return Some(SpecialModuleKind::BuiltinModuleNames);
        }
        if HOST_BUILTIN_MODULES.contains(&id) {
            return Some(SpecialModuleKind::HostBuiltin);
        }
        if id == "electron" || id.starts_with("electron/") || id.contains("app.asar") {
            return Some(SpecialModuleKind::HostInternal);
        }
        if let Some(name) = normalize_node_builtin(id) {
            return Some(SpecialModuleKind::NodeBuiltin(name.to_string()));
        }
        if id.starts_with(NODE_BUILTIN_MODULE_PREFIX) {
            return Some(SpecialModuleKind::NodeBuiltin(
                id[NODE_BUILTIN_MODULE_PREFIX.len()..].to_string(),
            ));
        }
        None
    }

    pub fn is_special(&self, id: &str) -> bool {
        self.classify(id).is_some()
    }

    pub(crate) fn call_registered(&self, id: &str, options: &RequireOptions) -> RequireResult<ModuleExports> {
        let factory = self
            .factories
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RequireError::resolution(format!("Special module '{id}' is not registered")))?;
        factory(options)
    }
}
