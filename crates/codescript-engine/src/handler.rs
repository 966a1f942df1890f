//! The require handler: configuration and public entry points.
//!
//! One handler owns one module cache. `require` and `require_async` share
//! the loading algorithm in [`crate::loader`]; the sync entry point runs it
//! with synchronous adapter I/O and drives it without an executor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use codescript_runtime::{TransformConfig, extract_require_args};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{ModuleCache, ResolutionChain};
use crate::caller::CallerLocator;
use crate::error::{RequireError, RequireResult};
use crate::evaluator::{Evaluator, NoEvaluator};
use crate::host::{Host, NoopHost};
use crate::io::IoMode;
use crate::platform::{DesktopAdapter, PlatformAdapter};
use crate::require::ChildRequire;
use crate::resolver::Resolver;
use crate::settings::Settings;
use crate::special::{SpecialModuleKind, SpecialModules};
use crate::types::{CacheInvalidationMode, RequireOptions, ResolveResult};
use crate::value::ModuleExports;

/// Prefix of app resource URLs, used in source maps.
pub const DEFAULT_RESOURCE_URL_PREFIX: &str = "app://local/";

/// Require handler configuration
#[derive(Clone)]
pub struct RequireHandlerConfig {
    /// Absolute path of the data root (the vault folder).
    pub data_root: String,

    /// Initial settings; replaceable later with
    /// [`RequireHandler::update_settings`].
    pub settings: Settings,

    pub transform: TransformConfig,

    pub resource_url_prefix: String,

    /// How long `require_async` waits for another in-flight load of the same
    /// module before treating it as circular.
    pub in_flight_timeout: Duration,

    pub in_flight_poll_interval: Duration,

    /// Finds the requiring module when no parent path is given.
    pub caller_locator: Option<Arc<dyn CallerLocator>>,
}

impl Default for RequireHandlerConfig {
    fn default() -> Self {
        Self {
            data_root: std::env::current_dir()
                .map(|dir| crate::path::to_posix(&dir.to_string_lossy()))
                .unwrap_or_else(|_| "/".to_string()),
            settings: Settings::default(),
            transform: TransformConfig::default(),
            resource_url_prefix: DEFAULT_RESOURCE_URL_PREFIX.to_string(),
            in_flight_timeout: Duration::from_millis(2000),
            in_flight_poll_interval: Duration::from_millis(100),
            caller_locator: None,
        }
    }
}

impl RequireHandlerConfig {
    pub fn new(data_root: impl Into<String>) -> Self {
        Self {
            data_root: crate::path::to_posix(&data_root.into()),
            ..Default::default()
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transform(mut self, transform: TransformConfig) -> Self {
        self.transform = transform;
        self
    }

    pub fn resource_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_url_prefix = prefix.into();
        self
    }

    pub fn in_flight_timeout(mut self, timeout: Duration) -> Self {
        self.in_flight_timeout = timeout;
        self
    }

    pub fn in_flight_poll_interval(mut self, interval: Duration) -> Self {
        self.in_flight_poll_interval = interval;
        self
    }

    pub fn caller_locator(mut self, locator: Arc<dyn CallerLocator>) -> Self {
        self.caller_locator = Some(locator);
        self
    }
}

/// Builds a [`RequireHandler`]. Unset parts default to the desktop adapter,
/// a host with no services and an evaluator that refuses to run code.
pub struct RequireHandlerBuilder {
    config: RequireHandlerConfig,
    adapter: Option<Arc<dyn PlatformAdapter>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    host: Option<Arc<dyn Host>>,
    special_modules: Option<Arc<SpecialModules>>,
}

impl RequireHandlerBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn special_modules(mut self, special_modules: Arc<SpecialModules>) -> Self {
        self.special_modules = Some(special_modules);
        self
    }

    pub fn build(self) -> Arc<RequireHandler> {
        let host = self.host.unwrap_or_else(|| Arc::new(NoopHost));
        let special_modules = self.special_modules.unwrap_or_default();
        let resolver = Resolver::new(
            self.config.data_root.clone(),
            self.config.resource_url_prefix.clone(),
            special_modules.clone(),
            self.config.caller_locator.clone(),
            host.clone(),
        );

        Arc::new_cyclic(|this| RequireHandler {
            this: this.clone(),
            settings: RwLock::new(self.config.settings.clone()),
            adapter: self.adapter.unwrap_or_else(|| Arc::new(DesktopAdapter::new())),
            evaluator: self.evaluator.unwrap_or_else(|| Arc::new(NoEvaluator)),
            host,
            special_modules,
            resolver,
            state: Arc::new(Mutex::new(ModuleCache::new())),
            config: self.config,
        })
    }
}

/// Loads modules through a platform adapter and keeps them cached.
pub struct RequireHandler {
    pub(crate) this: Weak<RequireHandler>,
    pub(crate) config: RequireHandlerConfig,
    pub(crate) settings: RwLock<Settings>,
    pub(crate) adapter: Arc<dyn PlatformAdapter>,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) special_modules: Arc<SpecialModules>,
    pub(crate) resolver: Resolver,
    pub(crate) state: Arc<Mutex<ModuleCache>>,
}

impl RequireHandler {
    pub fn builder(config: RequireHandlerConfig) -> RequireHandlerBuilder {
        RequireHandlerBuilder {
            config,
            adapter: None,
            evaluator: None,
            host: None,
            special_modules: None,
        }
    }

    pub fn data_root(&self) -> &str {
        self.resolver.data_root()
    }

    pub fn adapter(&self) -> &Arc<dyn PlatformAdapter> {
        &self.adapter
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn special_modules(&self) -> &Arc<SpecialModules> {
        &self.special_modules
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
        update(&mut self.settings.write());
    }

    /// Resolve `id` as a require from `parent_path` would.
    pub fn resolve(&self, id: &str, parent_path: Option<&str>) -> RequireResult<ResolveResult> {
        let modules_root = self.settings.read().modules_root.clone();
        self.resolver.resolve(id, parent_path, &modules_root)
    }

    /// `require` with no parent module, for hosts to hand to top-level code.
    pub fn root_require(&self) -> RequireResult<ChildRequire> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| RequireError::platform("Require handler is no longer available"))?;
        Ok(ChildRequire::root(&this))
    }

    /// Synchronous require.
    ///
    /// Fails for URLs, for modules the platform cannot load synchronously,
    /// and for code with top-level await.
    pub fn require(&self, id: &str, options: RequireOptions) -> RequireResult<ModuleExports> {
        self.require_in(id, options, None)
    }

    /// Asynchronous require.
    pub async fn require_async(&self, id: &str, options: RequireOptions) -> RequireResult<ModuleExports> {
        self.require_async_in(id, options, None).await
    }

    /// Synchronous require that joins `chain` while its root is running.
    pub(crate) fn require_in(
        &self,
        id: &str,
        options: RequireOptions,
        chain: Option<Arc<ResolutionChain>>,
    ) -> RequireResult<ModuleExports> {
        self.require_with_mode(id, options, IoMode::Sync, chain)
            .now_or_never()
            .unwrap_or_else(|| {
                Err(RequireError::unsupported_sync(format!(
                    "Cannot require '{id}' synchronously."
                )))
            })
    }

    pub(crate) async fn require_async_in(
        &self,
        id: &str,
        options: RequireOptions,
        chain: Option<Arc<ResolutionChain>>,
    ) -> RequireResult<ModuleExports> {
        match self.require_with_mode(id, options.clone(), IoMode::Async, chain).await {
            Ok(exports) => Ok(exports),
            Err(e) if self.uses_sync_fallback() => {
                warn!(id, error = %e, "requireAsync failed, trying a synchronous fallback");
                self.require(id, options)
            }
            Err(e) => Err(e),
        }
    }

    fn uses_sync_fallback(&self) -> bool {
        self.adapter.supports_sync_fallback() && self.settings.read().should_use_sync_fallback
    }

    /// Load `code` as the module at `path`, synchronously.
    pub fn require_string(&self, code: &str, path: &str, url_suffix: Option<&str>) -> RequireResult<ModuleExports> {
        self.require_string_with_mode(code, path, url_suffix, IoMode::Sync)
            .now_or_never()
            .unwrap_or_else(|| Err(RequireError::TopLevelSuspend { path: path.to_string() }))
    }

    /// Load `code` as the module at `path`.
    pub async fn require_string_async(
        &self,
        code: &str,
        path: &str,
        url_suffix: Option<&str>,
    ) -> RequireResult<ModuleExports> {
        self.require_string_with_mode(code, path, url_suffix, IoMode::Async).await
    }

    /// Preload the literal requires found in `source`, then run `body`.
    ///
    /// Each `require("id", options?)` call in `source` is loaded with
    /// `require_async` first. `body` receives a require that serves those
    /// modules from the cache and replays their load errors.
    pub async fn require_async_wrapper<F, Fut>(
        &self,
        source: &str,
        body: F,
        require: Option<ChildRequire>,
    ) -> RequireResult<ModuleExports>
    where
        F: FnOnce(ChildRequire) -> Fut,
        Fut: Future<Output = RequireResult<ModuleExports>>,
    {
        let calls = extract_require_args(source).map_err(|source| RequireError::Transform {
            path: "requireAsyncWrapper".to_string(),
            source,
        })?;
        let base = match require {
            Some(require) => require,
            None => self.root_require()?,
        };

        let mut preload_errors = HashMap::new();
        for call in calls {
            let options = match call.options.as_ref().map(RequireOptions::from_json) {
                Some(Ok(options)) => options,
                Some(Err(e)) => {
                    preload_errors.insert(call.id, Arc::new(e));
                    continue;
                }
                None => RequireOptions::default(),
            };
            let prepend = RequireOptions {
                parent_path: base.parent_path().map(str::to_string),
                ..RequireOptions::default()
            };
            let options = options.merged(&prepend, &RequireOptions::default());

            if let Err(e) = self.require_async(&call.id, options).await {
                debug!(id = %call.id, error = %e, "preload failed");
                preload_errors.insert(call.id, Arc::new(e));
            }
        }

        body(base.with_preload(preload_errors, CacheInvalidationMode::Never)).await
    }

    /// Value of a special module. Platforms may skip some, giving
    /// [`ModuleExports::Empty`].
    pub(crate) fn require_special_module(&self, id: &str, options: &RequireOptions) -> RequireResult<ModuleExports> {
        if self.adapter.skips_special_module(id) {
            return Ok(ModuleExports::Empty);
        }

        match self.special_modules.classify(id) {
            Some(SpecialModuleKind::Forbidden(reason)) => {
                Err(RequireError::resolution(format!("Cannot require '{id}': {reason}")))
            }
            Some(SpecialModuleKind::Registered) => self.special_modules.call_registered(id, options),
            Some(SpecialModuleKind::App) => Ok(self.host.app()),
            Some(SpecialModuleKind::BuiltinModuleNames) => Ok(ModuleExports::json(Value::from(
                self.special_modules.builtin_module_names(),
            ))),
            Some(SpecialModuleKind::HostBuiltin | SpecialModuleKind::HostInternal) => {
                self.host.builtin_module(id, options)
            }
            Some(SpecialModuleKind::NodeBuiltin(name)) => self.host.node_builtin(&name),
            None => Err(RequireError::resolution(format!("'{id}' is not a special module"))),
        }
    }

    /// Drop every cached module except host-internal ones, along with the
    /// dependency graph and timestamps. Returns how many entries went.
    pub fn clear_cache(&self) -> usize {
        let removed = self
            .state
            .lock()
            .clear_where(|id| id.starts_with("electron") || id.contains("app.asar"));
        debug!(removed, "cleared module cache");
        removed
    }

    pub fn cached_ids(&self) -> Vec<String> {
        let mut ids = self.state.lock().ids();
        ids.sort();
        ids
    }

    /// Identifiers `id` required, as written.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.state.lock().dependencies(id)
    }

    /// Whether `id` holds a fully loaded value.
    pub fn is_cached(&self, id: &str) -> bool {
        self.state.lock().loaded(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::EmulatedMobileAdapter;
    use serde_json::json;

    fn handler() -> Arc<RequireHandler> {
        RequireHandler::builder(RequireHandlerConfig::new("/vault")).build()
    }

    #[test]
    fn test_config_builder() {
        let config = RequireHandlerConfig::new("C:\\vault")
            .in_flight_timeout(Duration::from_millis(50))
            .resource_url_prefix("app://x/");
        assert_eq!(config.data_root, "C:/vault");
        assert_eq!(config.in_flight_timeout, Duration::from_millis(50));
        assert_eq!(config.in_flight_poll_interval, Duration::from_millis(100));
        assert_eq!(config.resource_url_prefix, "app://x/");
    }

    #[test]
    fn test_special_modules() {
        let handler = handler();
        handler
            .special_modules()
            .register("answer", |_| Ok(ModuleExports::json(json!(42))));
        handler.special_modules().forbid("legacy", "use 'answer' instead");

        let answer = handler.require("answer", RequireOptions::new()).unwrap();
        assert_eq!(answer.as_json(), Some(&json!(42)));

        let names = handler.require("obsidian/builtInModuleNames", RequireOptions::new()).unwrap();
        assert!(names.as_json().unwrap().as_array().unwrap().contains(&json!("obsidian")));

        let err = handler.require("legacy", RequireOptions::new()).unwrap_err();
        assert!(err.to_string().contains("use 'answer' instead"));

        // NoopHost provides no node builtins.
        assert!(handler.require("node:fs", RequireOptions::new()).is_err());
        assert!(handler.cached_ids().is_empty());
    }

    #[tokio::test]
    async fn test_mobile_skips_crypto() {
        let handler = RequireHandler::builder(RequireHandlerConfig::new("/vault"))
            .adapter(Arc::new(EmulatedMobileAdapter::new()))
            .build();
        let crypto = handler.require_async("crypto", RequireOptions::new()).await.unwrap();
        assert!(crypto.is_empty());
    }

    #[test]
    fn test_sync_url_refused() {
        let err = handler()
            .require("https://example.com/mod.js", RequireOptions::new())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Cannot require 'https://example.com/mod.js' synchronously."));
        assert!(message.contains("requireAsync"));
    }

    #[test]
    fn test_update_settings() {
        let handler = handler();
        handler.update_settings(|settings| settings.modules_root = "scripts".into());
        let resolved = handler.resolve("/lib.ts", None).unwrap();
        assert_eq!(resolved.resolved_id, "/vault/scripts/lib.ts");
    }
}
