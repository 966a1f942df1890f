//! Identifier resolution.
//!
//! Turns a `require` identifier into a [`ResolveResult`]. Rules, in order:
//!
//! 1. Special modules (host builtins, node builtins, registered ids).
//! 2. URLs. `file:` and app resource URLs become paths.
//! 3. `//x` is relative to the data root.
//! 4. `~/x` is `/x` on the filesystem.
//! 5. `/x` is relative to the modules root under the data root.
//! 6. Absolute paths (`C:/x`) are used as is.
//! 7. `./x` and `../x` are relative to the parent folder; anything else is
//!    a package name, encoded as `{parent_folder}*{name}`.

use std::sync::Arc;

use codescript_runtime::split_query;
use tracing::trace;
use url::Url;

use crate::caller::CallerLocator;
use crate::error::RequireResult;
use crate::host::Host;
use crate::package::split_module_name;
use crate::path::{dirname, is_absolute, join, to_posix};
use crate::special::SpecialModules;
use crate::types::{
    FAKE_ROOT_PATH, MODULE_NAME_SEPARATOR, MODULES_ROOT_PREFIX, ResolveResult, ResolvedType, SYSTEM_ROOT_PREFIX,
    VAULT_ROOT_PREFIX,
};

const FILE_URL_PREFIX: &str = "file://";

/// App resource URL of a local path, as used in source maps.
pub fn to_resource_url(resource_url_prefix: &str, path: &str) -> String {
    if !is_absolute(path) {
        return path.to_string();
    }
    format!("{resource_url_prefix}{}", to_posix(path).trim_start_matches('/'))
}

/// Local path of an app resource URL, if `url` is one.
pub fn from_resource_url(resource_url_prefix: &str, url: &str) -> Option<String> {
    let prefix_len = resource_url_prefix.len();
    let head = url.get(..prefix_len)?;
    if !head.eq_ignore_ascii_case(resource_url_prefix) {
        return None;
    }
    Some(rooted(&url[prefix_len..]))
}

fn rooted(path: &str) -> String {
    if is_absolute(path) {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Whether `id` is a URL. Single-letter schemes are drive letters.
pub fn is_url(id: &str) -> bool {
    Url::parse(id).is_ok_and(|url| url.scheme().len() > 1)
}

/// Resolves identifiers against the data root.
pub struct Resolver {
    data_root: String,
    resource_url_prefix: String,
    special_modules: Arc<SpecialModules>,
    caller_locator: Option<Arc<dyn CallerLocator>>,
    host: Arc<dyn Host>,
}

impl Resolver {
    pub fn new(
        data_root: impl Into<String>,
        resource_url_prefix: impl Into<String>,
        special_modules: Arc<SpecialModules>,
        caller_locator: Option<Arc<dyn CallerLocator>>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            data_root: to_posix(&data_root.into()),
            resource_url_prefix: resource_url_prefix.into(),
            special_modules,
            caller_locator,
            host,
        }
    }

    pub fn data_root(&self) -> &str {
        &self.data_root
    }

    /// Resolve `id` requested from `parent_path`.
    ///
    /// `modules_root` is the current setting, relative to the data root.
    /// When `parent_path` is `None` the caller is located from the stack,
    /// then from the host's active file.
    pub fn resolve(&self, id: &str, parent_path: Option<&str>, modules_root: &str) -> RequireResult<ResolveResult> {
        let id = to_posix(id);
        let result = self.resolve_posix(&id, parent_path, modules_root)?;
        trace!(id = %id, resolved = %result.resolved_id, kind = %result.resolved_type, "resolved");
        Ok(result)
    }

    fn resolve_posix(&self, id: &str, parent_path: Option<&str>, modules_root: &str) -> RequireResult<ResolveResult> {
        let (clean_id, _) = split_query(id);
        if self.special_modules.is_special(clean_id) {
            return Ok(ResolveResult::new(clean_id, ResolvedType::SpecialModule));
        }

        if is_url(id) {
            return Ok(self.resolve_url(id));
        }

        if let Some(rest) = id.strip_prefix(VAULT_ROOT_PREFIX) {
            return Ok(ResolveResult::new(join(&[&self.data_root, rest]), ResolvedType::Path));
        }

        if let Some(rest) = id.strip_prefix(SYSTEM_ROOT_PREFIX) {
            return Ok(ResolveResult::new(format!("/{rest}"), ResolvedType::Path));
        }

        if let Some(rest) = id.strip_prefix(MODULES_ROOT_PREFIX) {
            return Ok(ResolveResult::new(
                join(&[&self.data_root, modules_root, rest]),
                ResolvedType::Path,
            ));
        }

        if is_absolute(id) {
            return Ok(ResolveResult::new(id, ResolvedType::Path));
        }

        let parent_folder = dirname(&self.parent_path(parent_path));

        if id.starts_with("./") || id.starts_with("../") {
            return Ok(ResolveResult::new(join(&[&parent_folder, id]), ResolvedType::Path));
        }

        split_module_name(clean_id)?;
        Ok(ResolveResult::new(
            format!("{parent_folder}{MODULE_NAME_SEPARATOR}{id}"),
            ResolvedType::Module,
        ))
    }

    fn resolve_url(&self, id: &str) -> ResolveResult {
        let file_url_rest = id
            .get(..FILE_URL_PREFIX.len())
            .filter(|head| head.eq_ignore_ascii_case(FILE_URL_PREFIX))
            .map(|_| &id[FILE_URL_PREFIX.len()..]);
        if let Some(rest) = file_url_rest {
            let rest = rest.trim_start_matches('/');
            return ResolveResult::new(rooted(rest), ResolvedType::Path);
        }

        if let Some(path) = from_resource_url(&self.resource_url_prefix, id) {
            return ResolveResult::new(path, ResolvedType::Path);
        }

        ResolveResult::new(id, ResolvedType::Url)
    }

    /// Absolute path of the requiring module.
    fn parent_path(&self, explicit: Option<&str>) -> String {
        let parent = explicit
            .map(to_posix)
            .or_else(|| self.caller_locator.as_ref().and_then(|locator| locator.caller_path()))
            .or_else(|| self.host.active_file_path())
            .unwrap_or_else(|| FAKE_ROOT_PATH.to_string());

        if is_absolute(&parent) {
            parent
        } else {
            join(&[&self.data_root, &parent])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::StackTraceLocator;
    use crate::host::NoopHost;

    const PREFIX: &str = "app://local/";

    fn resolver() -> Resolver {
        Resolver::new("/vault", PREFIX, Arc::new(SpecialModules::new()), None, Arc::new(NoopHost))
    }

    fn resolve(id: &str, parent: Option<&str>) -> (String, ResolvedType) {
        let result = resolver().resolve(id, parent, "scripts").unwrap();
        (result.resolved_id, result.resolved_type)
    }

    #[test]
    fn test_special_modules() {
        assert_eq!(resolve("obsidian", None), ("obsidian".into(), ResolvedType::SpecialModule));
        assert_eq!(resolve("node:fs?x=1", None), ("node:fs".into(), ResolvedType::SpecialModule));
        assert_eq!(resolve("path", None), ("path".into(), ResolvedType::SpecialModule));
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            resolve("https://example.com/a.js", None),
            ("https://example.com/a.js".into(), ResolvedType::Url)
        );
        assert_eq!(resolve("file:///home/me/a.js", None), ("/home/me/a.js".into(), ResolvedType::Path));
        assert_eq!(resolve("FILE:///C:/a.js", None), ("C:/a.js".into(), ResolvedType::Path));
        assert_eq!(resolve("APP://LOCAL/home/me/a.js", None), ("/home/me/a.js".into(), ResolvedType::Path));
    }

    #[test]
    fn test_url_with_multibyte_prefix() {
        // `é` straddles the end of the `file://` and `app://local/` prefixes.
        assert_eq!(resolve("ab:cdeé", None), ("ab:cdeé".into(), ResolvedType::Url));
        assert_eq!(resolve("ab:cdefghijé/x", None), ("ab:cdefghijé/x".into(), ResolvedType::Url));
    }

    #[test]
    fn test_root_prefixes() {
        assert_eq!(resolve("//notes/a.ts", None), ("/vault/notes/a.ts".into(), ResolvedType::Path));
        assert_eq!(resolve("~/etc/a.ts", None), ("/etc/a.ts".into(), ResolvedType::Path));
        assert_eq!(resolve("/lib/a.ts", None), ("/vault/scripts/lib/a.ts".into(), ResolvedType::Path));
        assert_eq!(resolve("C:/code/a.ts", None), ("C:/code/a.ts".into(), ResolvedType::Path));
        assert_eq!(resolve("C:\\code\\a.ts", None), ("C:/code/a.ts".into(), ResolvedType::Path));
    }

    #[test]
    fn test_relative_and_module() {
        assert_eq!(
            resolve("./b.ts?x", Some("/vault/dir/a.ts")),
            ("/vault/dir/b.ts?x".into(), ResolvedType::Path)
        );
        assert_eq!(resolve("../b", Some("dir/sub/a.ts")), ("/vault/dir/b".into(), ResolvedType::Path));
        assert_eq!(
            resolve("lodash/fp", Some("/vault/dir/a.ts")),
            ("/vault/dir*lodash/fp".into(), ResolvedType::Module)
        );
        assert_eq!(resolve("./b.ts", None), ("/vault/b.ts".into(), ResolvedType::Path));
    }

    #[test]
    fn test_invalid_scoped_name() {
        let err = resolver().resolve("@scope", Some("/vault/a.ts"), "").unwrap_err();
        assert!(err.to_string().contains("Invalid scoped module name"));
        assert!(resolver().resolve("@scope/pkg", Some("/vault/a.ts"), "").is_ok());
    }

    #[test]
    fn test_parent_from_caller_stack() {
        let locator = StackTraceLocator::new(|| {
            Some("Error\n    at a (x:1:1)\n    at b (x:1:1)\n    at c (x:1:1)\n    at d (/vault/from-stack/main.ts:1:1)".into())
        });
        let resolver = Resolver::new(
            "/vault",
            PREFIX,
            Arc::new(SpecialModules::new()),
            Some(Arc::new(locator)),
            Arc::new(NoopHost),
        );
        let result = resolver.resolve("./b.ts", None, "").unwrap();
        assert_eq!(result.resolved_id, "/vault/from-stack/b.ts");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let first = resolver().resolve("pkg/sub", Some("/vault/a/b.ts"), "m").unwrap();
        let second = resolver().resolve("pkg/sub", Some("/vault/a/b.ts"), "m").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resource_url_round_trip() {
        let url = to_resource_url(PREFIX, "/vault/a.ts");
        assert_eq!(url, "app://local/vault/a.ts");
        assert_eq!(from_resource_url(PREFIX, &url).as_deref(), Some("/vault/a.ts"));
        assert_eq!(to_resource_url(PREFIX, "relative.ts"), "relative.ts");
        assert!(!is_url("C:/a.ts"));
        assert!(!is_url("lodash"));
    }
}
