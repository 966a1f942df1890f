//! Package resolution through `node_modules` and package manifests.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{RequireError, RequireResult};
use crate::io::ModeIo;
use crate::path::{dirname, join, to_posix};
use crate::types::{
    ENTRY_POINT, MODULE_NAME_SEPARATOR, NODE_MODULES_FOLDER, PACKAGE_JSON, PRIVATE_MODULE_PREFIX,
    RELATIVE_MODULE_PATH_SEPARATOR, SCOPED_MODULE_PREFIX, WILDCARD_SUBPATH_SUFFIX,
};

/// Export conditions in the order they are tried. Conditions not listed
/// come after these, in manifest order.
pub const CONDITION_PRIORITY: &[&str] = &[
    "obsidian",
    "electron",
    "browser",
    "import",
    "module",
    "default",
    "require",
    "node",
    "node-addons",
];

const TYPES_CONDITION: &str = "types";

/// Fields of `package.json` used for resolution.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub main: Option<String>,
    pub exports: Option<Value>,
    pub imports: Option<Value>,
}

impl PackageManifest {
    pub fn parse(path: &str, content: &str) -> RequireResult<Self> {
        serde_json::from_str(content).map_err(|e| RequireError::json(path, e))
    }
}

/// A bare module name split at the package boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleName {
    /// Package folder name under `node_modules`, e.g. `@scope/pkg`.
    pub base: String,
    /// Subpath inside the package, `.` or `./sub/path`.
    pub relative: String,
}

/// Split `lodash/fp` into `lodash` and `./fp`. Scoped names keep their
/// first two segments as the base.
pub fn split_module_name(name: &str) -> RequireResult<ModuleName> {
    let mut separator = name.find(RELATIVE_MODULE_PATH_SEPARATOR);

    if name.starts_with(SCOPED_MODULE_PREFIX) {
        let Some(scope_end) = separator else {
            return Err(RequireError::resolution(format!("Invalid scoped module name: '{name}'.")));
        };
        separator = name[scope_end + 1..]
            .find(RELATIVE_MODULE_PATH_SEPARATOR)
            .map(|index| scope_end + 1 + index);
    }

    Ok(match separator {
        Some(index) => ModuleName {
            base: name[..index].to_string(),
            relative: format!("{ENTRY_POINT}{}", &name[index..]),
        },
        None => ModuleName {
            base: name.to_string(),
            relative: ENTRY_POINT.to_string(),
        },
    })
}

/// Split a module resolved id back into parent folder and module name.
pub fn split_module_id(id: &str) -> (&str, &str) {
    id.rsplit_once(MODULE_NAME_SEPARATOR).unwrap_or(("", id))
}

/// Candidate paths, relative to the package folder, for `relative`.
pub fn relative_module_paths(manifest: &PackageManifest, relative: &str) -> Vec<String> {
    let is_private = relative.starts_with(PRIVATE_MODULE_PREFIX);
    let map = if is_private { manifest.imports.as_ref() } else { manifest.exports.as_ref() };
    let mut paths = exports_relative_paths(map, relative);

    if relative == ENTRY_POINT {
        paths.push(manifest.main.clone().unwrap_or_else(|| ENTRY_POINT.to_string()));
    }

    if map.is_none() && !is_private {
        paths.push(relative.to_string());
    }

    paths
}

fn exports_relative_paths(node: Option<&Value>, relative: &str) -> Vec<String> {
    match node {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(target)) => {
            let pattern = if target.contains(MODULE_NAME_SEPARATOR) {
                target.clone()
            } else {
                join(&[target, "*"])
            };
            vec![pattern.replace(MODULE_NAME_SEPARATOR, relative)]
        }
        Some(Value::Array(items)) => items
            .iter()
            .flat_map(|item| exports_relative_paths(Some(item), relative))
            .collect(),
        Some(Value::Object(entries)) => {
            let mut entries: Vec<(&String, &Value)> = entries.iter().collect();
            entries.sort_by_key(|(key, _)| key_rank(key));
            entries
                .into_iter()
                .flat_map(|(key, child)| apply_condition(key, child, relative))
                .collect()
        }
        Some(_) => Vec::new(),
    }
}

fn is_subpath_key(key: &str) -> bool {
    key.starts_with(ENTRY_POINT) || key.starts_with(PRIVATE_MODULE_PREFIX)
}

/// Subpath keys keep their order; conditions follow [`CONDITION_PRIORITY`].
fn key_rank(key: &str) -> usize {
    if is_subpath_key(key) {
        return 0;
    }
    CONDITION_PRIORITY
        .iter()
        .position(|condition| *condition == key)
        .unwrap_or(CONDITION_PRIORITY.len())
}

fn apply_condition(key: &str, child: &Value, relative: &str) -> Vec<String> {
    if key == TYPES_CONDITION {
        return Vec::new();
    }

    if key == relative {
        return exports_relative_paths(Some(child), ENTRY_POINT);
    }

    if !is_subpath_key(key) {
        return exports_relative_paths(Some(child), relative);
    }

    if let Some(parent_key) = key.strip_suffix(WILDCARD_SUBPATH_SUFFIX) {
        let (parent, leaf) = relative
            .rsplit_once(RELATIVE_MODULE_PATH_SEPARATOR)
            .unwrap_or((relative, ""));
        if parent_key == parent && !leaf.is_empty() {
            return exports_relative_paths(Some(child), &join(&[ENTRY_POINT, leaf]));
        }
    }

    Vec::new()
}

/// Nearest ancestor of `folder`, itself included, holding a package.json.
pub(crate) async fn root_folder(io: ModeIo<'_>, folder: &str) -> RequireResult<Option<String>> {
    let mut current = to_posix(folder);
    while current != "." && current != "/" {
        if io.exists_file(&join(&[&current, PACKAGE_JSON])).await? {
            return Ok(Some(current));
        }
        current = dirname(&current);
    }
    Ok(None)
}

/// Package roots searched for modules required from `folder`: the one
/// enclosing `folder`, then the one enclosing the modules root.
pub(crate) async fn root_folders(
    io: ModeIo<'_>,
    folder: &str,
    modules_root_folder: Option<&str>,
) -> RequireResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut roots = Vec::new();

    for candidate in std::iter::once(folder).chain(modules_root_folder) {
        if !seen.insert(candidate.to_string()) {
            continue;
        }
        if let Some(root) = root_folder(io, candidate).await? {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }

    Ok(roots)
}

/// Find the file a bare module name refers to.
pub(crate) async fn resolve_module_path(
    io: ModeIo<'_>,
    module_name: &str,
    parent_folder: &str,
    modules_root_folder: Option<&str>,
) -> RequireResult<String> {
    let name = split_module_name(module_name)?;
    let is_root_package = module_name.starts_with(PRIVATE_MODULE_PREFIX) || module_name == ENTRY_POINT;

    for root in root_folders(io, parent_folder, modules_root_folder).await? {
        let (package_folder, relative) = if is_root_package {
            (root.clone(), module_name.to_string())
        } else {
            (join(&[&root, NODE_MODULES_FOLDER, &name.base]), name.relative.clone())
        };

        if !io.exists_folder(&package_folder).await? {
            continue;
        }

        let manifest_path = join(&[&package_folder, PACKAGE_JSON]);
        if !io.exists_file(&manifest_path).await? {
            continue;
        }

        let content = io.read_file(&manifest_path).await?;
        let manifest = PackageManifest::parse(&manifest_path, &content)?;

        for relative_path in relative_module_paths(&manifest, &relative) {
            let full_path = join(&[&package_folder, &relative_path]);
            if let Some(existing) = io.find_existing_file_path(&full_path).await? {
                debug!(module = module_name, path = %existing, "resolved package module");
                return Ok(existing);
            }
        }
    }

    Err(RequireError::resolution(format!("Could not resolve module: {module_name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IoMode;
    use crate::platform::DesktopAdapter;
    use serde_json::json;

    fn manifest(value: Value) -> PackageManifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_split_module_name() {
        assert_eq!(
            split_module_name("lodash").unwrap(),
            ModuleName { base: "lodash".into(), relative: ".".into() }
        );
        assert_eq!(
            split_module_name("lodash/fp/map").unwrap(),
            ModuleName { base: "lodash".into(), relative: "./fp/map".into() }
        );
        assert_eq!(
            split_module_name("@scope/pkg/sub").unwrap(),
            ModuleName { base: "@scope/pkg".into(), relative: "./sub".into() }
        );
        assert_eq!(
            split_module_name("@scope/pkg").unwrap(),
            ModuleName { base: "@scope/pkg".into(), relative: ".".into() }
        );
        assert!(split_module_name("@scope").is_err());
    }

    #[test]
    fn test_split_module_id() {
        assert_eq!(split_module_id("/vault/a*lodash"), ("/vault/a", "lodash"));
    }

    #[test]
    fn test_wildcard_subpath() {
        let manifest = manifest(json!({ "exports": { "./feature/*": "./dist/feature/*.js" } }));
        assert_eq!(relative_module_paths(&manifest, "./feature/x"), vec!["./dist/feature/x.js"]);
        assert!(relative_module_paths(&manifest, "./other/x").is_empty());
    }

    #[test]
    fn test_string_exports_and_main() {
        let manifest = manifest(json!({ "main": "lib/main.js", "exports": "./index.js" }));
        // Joined with the package folder, `index.js/.` normalizes to `index.js`.
        let paths = relative_module_paths(&manifest, ".");
        assert_eq!(paths, vec!["index.js/.", "lib/main.js"]);
    }

    #[test]
    fn test_no_exports_falls_back_to_subpath() {
        let manifest = manifest(json!({ "name": "plain" }));
        assert_eq!(relative_module_paths(&manifest, "."), vec![".", "."]);
        assert_eq!(relative_module_paths(&manifest, "./lib/x"), vec!["./lib/x"]);
    }

    #[test]
    fn test_conditions_follow_priority() {
        let manifest = manifest(json!({
            "exports": {
                ".": {
                    "types": "./index.d.ts",
                    "custom": "./custom.js",
                    "require": "./index.cjs",
                    "import": "./index.mjs"
                }
            }
        }));
        let paths = relative_module_paths(&manifest, ".");
        assert_eq!(paths, vec!["index.mjs/.", "index.cjs/.", "custom.js/.", "."]);
    }

    #[test]
    fn test_subpath_exact_key() {
        let manifest = manifest(json!({
            "exports": {
                ".": "./main.js",
                "./utils": { "default": "./lib/utils.js" }
            }
        }));
        assert_eq!(relative_module_paths(&manifest, "./utils"), vec!["lib/utils.js/."]);
    }

    #[test]
    fn test_private_imports() {
        let manifest = manifest(json!({
            "imports": { "#internal/*": "./src/internal/*.js" },
            "exports": "./index.js"
        }));
        assert_eq!(relative_module_paths(&manifest, "#internal/a"), vec!["./src/internal/a.js"]);
        assert!(relative_module_paths(&manifest, "#missing").is_empty());
    }

    #[tokio::test]
    async fn test_resolve_module_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().replace('\\', "/");
        let package = dir.path().join("node_modules").join("@scope").join("pkg");
        std::fs::create_dir_all(package.join("dist")).unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(
            package.join("package.json"),
            r#"{ "exports": { ".": "./dist/index.js", "./feature/*": "./dist/*.js" } }"#,
        )
        .unwrap();
        std::fs::write(package.join("dist").join("index.js"), "").unwrap();
        std::fs::write(package.join("dist").join("x.js"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let adapter = DesktopAdapter::new();
        let io = ModeIo::new(&adapter, IoMode::Async);
        let src = format!("{root}/src");

        let entry = resolve_module_path(io, "@scope/pkg", &src, None).await.unwrap();
        assert_eq!(entry, format!("{root}/node_modules/@scope/pkg/dist/index.js"));

        let feature = resolve_module_path(io, "@scope/pkg/feature/x", &src, None).await.unwrap();
        assert_eq!(feature, format!("{root}/node_modules/@scope/pkg/dist/x.js"));

        let err = resolve_module_path(io, "missing", &src, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not resolve module: missing");
    }
}
