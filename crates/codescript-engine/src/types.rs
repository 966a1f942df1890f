//! Core enumerations, constants and require options.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{RequireError, RequireResult};
use crate::value::HostValue;

/// Relative name of a package's own entry point.
pub const ENTRY_POINT: &str = ".";
/// Extensions tried when a path has none.
pub const EXTENSIONS: [&str; 7] = [".js", ".cjs", ".mjs", ".ts", ".cts", ".mts", ".md"];
/// Separates the parent folder from the bare name in a module resolved id.
pub const MODULE_NAME_SEPARATOR: char = '*';
pub const NODE_MODULES_FOLDER: &str = "node_modules";
pub const PACKAGE_JSON: &str = "package.json";
/// Prefix of package-private `imports` names.
pub const PRIVATE_MODULE_PREFIX: &str = "#";
pub const RELATIVE_MODULE_PATH_SEPARATOR: char = '/';
pub const SCOPED_MODULE_PREFIX: &str = "@";
/// Prefix for paths relative to the data root.
pub const VAULT_ROOT_PREFIX: &str = "//";
/// Prefix for paths from the filesystem root.
pub const SYSTEM_ROOT_PREFIX: &str = "~/";
/// Prefix for paths relative to the configured modules root.
pub const MODULES_ROOT_PREFIX: &str = "/";
/// Suffix of a wildcard subpath key in a package exports map.
pub const WILDCARD_SUBPATH_SUFFIX: &str = "/*";
pub const NODE_BUILTIN_MODULE_PREFIX: &str = "node:";
/// Parent path used when nothing better is known.
pub const FAKE_ROOT_PATH: &str = "fakeRoot.js";

/// Suffixes tried, in order, when looking for an existing file.
pub fn path_suffixes() -> impl Iterator<Item = String> {
    std::iter::once(String::new())
        .chain(EXTENSIONS.iter().map(|ext| ext.to_string()))
        .chain(EXTENSIONS.iter().map(|ext| format!("/index{ext}")))
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RequireError;

            fn from_str(s: &str) -> RequireResult<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(RequireError::UnknownEnumValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Classification of a resolved identifier.
    ResolvedType ("resolved type") {
        Module => "module",
        Path => "path",
        SpecialModule => "specialModule",
        Url => "url",
    }
}

string_enum! {
    /// How a module's content is interpreted.
    ModuleType ("module type") {
        Json => "json",
        JsTs => "jsTs",
        Markdown => "md",
        Node => "node",
        Wasm => "wasm",
    }
}

string_enum! {
    /// Whether a cached module may be reused.
    CacheInvalidationMode ("cache invalidation mode") {
        /// Reload whenever the platform can.
        Always => "always",
        /// Return the cached value when present.
        Never => "never",
        /// Reload when a timestamp in the dependency graph changed.
        WhenPossible => "whenPossible",
    }
}

impl Default for CacheInvalidationMode {
    fn default() -> Self {
        Self::WhenPossible
    }
}

impl ModuleType {
    /// Pick the module type from a path's extension, ignoring any query.
    pub fn from_path(path: &str) -> RequireResult<Self> {
        let ext = crate::path::extname(codescript_runtime::trim_query(path));
        match ext {
            ".cjs" | ".cts" | ".js" | ".mjs" | ".mts" | ".ts" => Ok(Self::JsTs),
            ".json" => Ok(Self::Json),
            ".md" => Ok(Self::Markdown),
            ".node" => Ok(Self::Node),
            ".wasm" => Ok(Self::Wasm),
            other => Err(RequireError::resolution(format!(
                "Unsupported file extension: {other}"
            ))),
        }
    }

    /// Pick the module type from an HTTP `Content-Type` header.
    pub fn from_content_type(content_type: Option<&str>, url: &str) -> Self {
        let essence = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match essence.as_str() {
            "application/javascript" | "application/typescript" | "text/javascript" => Self::JsTs,
            "application/json" => Self::Json,
            "application/octet-stream" => Self::Node,
            "application/wasm" => Self::Wasm,
            "text/markdown" => Self::Markdown,
            _ => {
                tracing::warn!(
                    url,
                    content_type = essence.as_str(),
                    "Unknown content type, treating the module as JavaScript/TypeScript"
                );
                Self::JsTs
            }
        }
    }
}

/// Result of identifier resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    pub resolved_id: String,
    pub resolved_type: ResolvedType,
}

impl ResolveResult {
    pub fn new(resolved_id: impl Into<String>, resolved_type: ResolvedType) -> Self {
        Self {
            resolved_id: resolved_id.into(),
            resolved_type,
        }
    }
}

/// Options accepted by `require` and `require_async`.
#[derive(Debug, Clone, Default)]
pub struct RequireOptions {
    pub cache_invalidation_mode: Option<CacheInvalidationMode>,
    /// Overrides the type derived from the extension or content type.
    pub module_type: Option<ModuleType>,
    /// Path the identifier is resolved against.
    pub parent_path: Option<String>,
    /// Host-side handle of the requiring module, passed to builtin lookups.
    pub parent_module: Option<HostValue>,
}

impl RequireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_invalidation_mode(mut self, mode: CacheInvalidationMode) -> Self {
        self.cache_invalidation_mode = Some(mode);
        self
    }

    pub fn module_type(mut self, module_type: ModuleType) -> Self {
        self.module_type = Some(module_type);
        self
    }

    pub fn parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = Some(parent_path.into());
        self
    }

    /// Effective cache mode.
    pub fn mode(&self) -> CacheInvalidationMode {
        self.cache_invalidation_mode.unwrap_or_default()
    }

    /// Read options from a JSON object as written in script source.
    pub fn from_json(value: &Value) -> RequireResult<Self> {
        let mut options = Self::default();
        let Some(object) = value.as_object() else {
            return Ok(options);
        };

        if let Some(mode) = object.get("cacheInvalidationMode").and_then(Value::as_str) {
            options.cache_invalidation_mode = Some(mode.parse()?);
        }
        if let Some(module_type) = object.get("moduleType").and_then(Value::as_str) {
            options.module_type = Some(module_type.parse()?);
        }
        if let Some(parent_path) = object.get("parentPath").and_then(Value::as_str) {
            options.parent_path = Some(parent_path.to_string());
        }

        Ok(options)
    }

    /// Merge as `{ ...prepend, ...self, ...append }`: set fields of later
    /// layers win.
    pub fn merged(self, prepend: &RequireOptions, append: &RequireOptions) -> Self {
        Self {
            cache_invalidation_mode: append
                .cache_invalidation_mode
                .or(self.cache_invalidation_mode)
                .or(prepend.cache_invalidation_mode),
            module_type: append.module_type.or(self.module_type).or(prepend.module_type),
            parent_path: append
                .parent_path
                .clone()
                .or(self.parent_path)
                .or_else(|| prepend.parent_path.clone()),
            parent_module: append
                .parent_module
                .clone()
                .or(self.parent_module)
                .or_else(|| prepend.parent_module.clone()),
        }
    }
}
