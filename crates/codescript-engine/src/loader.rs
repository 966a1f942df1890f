//! Loading algorithm shared by `require` and `require_async`.
//!
//! Every step is an async function parameterized by [`IoMode`]. In sync
//! mode adapter calls are synchronous and nothing below awaits a pending
//! future, so the whole load completes on the first poll.

use std::sync::Arc;

use codescript_runtime::{
    TransformRequest, code_script_module_path, extract_code_script, split_query, transform, trim_query,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, trace, warn};

use crate::cache::{CacheLookup, ResolutionChain, Timestamp};
use crate::console::ScriptConsole;
use crate::context::ModuleContext;
use crate::error::{RequireError, RequireResult, SYNC_REQUIRE_ADVICE};
use crate::evaluator::{CompiledUnit, Evaluation};
use crate::handler::RequireHandler;
use crate::io::{IoMode, ModeIo};
use crate::package::{resolve_module_path, root_folders, split_module_id};
use crate::path::{dirname, join};
use crate::platform::now;
use crate::require::{AsyncWrapperBinding, ChildRequire};
use crate::resolver::{is_url, to_resource_url};
use crate::types::{CacheInvalidationMode, ModuleType, PACKAGE_JSON, RequireOptions, ResolvedType};
use crate::value::{ModuleExports, ModuleRecord, PendingExports};

/// Source handed to [`RequireHandler::require_string_impl`].
struct StringModule<'a> {
    code: &'a str,
    path: &'a str,
    /// Appended to the source URL and evaluation name, `/suffix` or empty.
    url_suffix: &'a str,
    /// Module that child requires are recorded against.
    dependency_owner: &'a str,
}

impl RequireHandler {
    pub(crate) fn io(&self, mode: IoMode) -> ModeIo<'_> {
        ModeIo::new(self.adapter.as_ref(), mode)
    }

    fn modules_root(&self) -> String {
        self.settings.read().modules_root.clone()
    }

    /// Absolute modules root, when one is configured.
    fn modules_root_folder(&self) -> Option<String> {
        let modules_root = self.modules_root();
        (!modules_root.is_empty()).then(|| join(&[self.data_root(), modules_root.as_str()]))
    }

    /// Require `id` inside `parent_chain`, or as a new root when the parent
    /// chain is absent or closed.
    pub(crate) fn require_with_mode<'a>(
        &'a self,
        id: &'a str,
        options: RequireOptions,
        mode: IoMode,
        parent_chain: Option<Arc<ResolutionChain>>,
    ) -> BoxFuture<'a, RequireResult<ModuleExports>> {
        async move {
            let (chain, is_root) = ResolutionChain::join_or_start(parent_chain);
            let result = self.require_in_chain(id, options, mode, &chain).await;
            if is_root {
                chain.close();
            }
            result
        }
        .boxed()
    }

    async fn require_in_chain(
        &self,
        id: &str,
        options: RequireOptions,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        let cache_mode = options.mode();
        let resolved = self.resolver.resolve(id, options.parent_path.as_deref(), &self.modules_root())?;
        let resolved_id = resolved.resolved_id.as_str();
        let resolved_type = resolved.resolved_type;

        if resolved_type == ResolvedType::SpecialModule {
            return self.require_special_module(resolved_id, &options);
        }

        if mode.is_sync() && resolved_type == ResolvedType::Url {
            return Err(RequireError::unsupported_sync(format!(
                "Cannot require '{resolved_id}' synchronously."
            )));
        }

        let (clean_id, query) = if resolved_type == ResolvedType::Url {
            (resolved_id, "")
        } else {
            split_query(resolved_id)
        };

        let lookup = match mode {
            IoMode::Sync => self.lookup(resolved_id),
            IoMode::Async => self.wait_for_in_flight(resolved_id).await,
        };

        match lookup {
            CacheLookup::Pending => {
                warn!(
                    "Circular dependency detected: {resolved_id} -> ... -> {} -> {resolved_id}",
                    options.parent_path.as_deref().unwrap_or_default()
                );
                return Ok(self.pending_exports(resolved_id));
            }
            CacheLookup::Loaded(exports) => {
                if chain.contains(resolved_id) {
                    return Ok(exports);
                }

                match cache_mode {
                    CacheInvalidationMode::Never => return Ok(exports),
                    CacheInvalidationMode::WhenPossible => {
                        if !query.is_empty() {
                            return Ok(exports);
                        }
                        if mode.is_sync() && !self.adapter.can_require_non_cached(resolved_type) {
                            warn!(
                                id = resolved_id,
                                "Cached module cannot be invalidated synchronously. The cached version will be used."
                            );
                            return Ok(exports);
                        }
                    }
                    CacheInvalidationMode::Always => {}
                }
            }
            CacheLookup::Missing => {}
        }

        if mode.is_sync() && !self.adapter.can_require_non_cached(resolved_type) {
            return Err(RequireError::unsupported_sync(format!(
                "Cannot require '{resolved_id}' synchronously."
            )));
        }

        let key = if clean_id.ends_with(".md") { resolved_id } else { clean_id };
        let exports = self
            .load_into_cache(
                key,
                self.require_non_cached(key, resolved_type, cache_mode, options.module_type, mode, chain),
            )
            .await?;

        if resolved_id != key {
            let alias = exports.clone();
            self.load_into_cache(resolved_id, async move { Ok(alias) }).await?;
        }

        Ok(exports)
    }

    pub(crate) async fn require_string_with_mode(
        &self,
        code: &str,
        path: &str,
        url_suffix: Option<&str>,
        mode: IoMode,
    ) -> RequireResult<ModuleExports> {
        let url_suffix = url_suffix.map(|suffix| format!("/{suffix}")).unwrap_or_default();
        let module = StringModule {
            code,
            path,
            url_suffix: &url_suffix,
            dependency_owner: path,
        };

        let (chain, _) = ResolutionChain::join_or_start(None);
        let result = self
            .load_into_cache(path, self.require_string_impl(module, mode, &chain))
            .await
            .map_err(|e| RequireError::load_failed(path, e));
        chain.close();
        result
    }

    /// Cache lookup that waits, bounded, for another load of `id` to finish.
    async fn wait_for_in_flight(&self, id: &str) -> CacheLookup {
        let start = tokio::time::Instant::now();
        loop {
            let lookup = self.lookup(id);
            if !matches!(lookup, CacheLookup::Pending) || start.elapsed() >= self.config.in_flight_timeout {
                return lookup;
            }
            tokio::time::sleep(self.config.in_flight_poll_interval).await;
        }
    }

    fn lookup(&self, id: &str) -> CacheLookup {
        self.state.lock().lookup(id)
    }

    fn pending_exports(&self, id: &str) -> ModuleExports {
        ModuleExports::Pending(PendingExports::new(id, Arc::downgrade(&self.state)))
    }

    /// Current value of `id`: the loaded exports, or a placeholder.
    fn exports_of(&self, id: &str) -> ModuleExports {
        match self.lookup(id) {
            CacheLookup::Loaded(exports) => exports,
            CacheLookup::Pending => self.pending_exports(id),
            CacheLookup::Missing => ModuleExports::Empty,
        }
    }

    /// Run `load` with `id` marked as loading.
    ///
    /// A failed load drops the entry. If a nested load already stored `id`,
    /// that value wins.
    async fn load_into_cache<F>(&self, id: &str, load: F) -> RequireResult<ModuleExports>
    where
        F: std::future::Future<Output = RequireResult<ModuleExports>>,
    {
        self.state.lock().begin_load(id);

        match load.await {
            Ok(exports) => {
                let mut state = self.state.lock();
                if let Some(cached) = state.loaded(id) {
                    return Ok(cached);
                }
                if exports.is_pending() {
                    state.release_load(id);
                } else {
                    state.finish_load(id, exports.clone());
                }
                Ok(exports)
            }
            Err(e) => {
                self.state.lock().abort_load(id);
                Err(e)
            }
        }
    }

    async fn require_non_cached(
        &self,
        id: &str,
        resolved_type: ResolvedType,
        cache_mode: CacheInvalidationMode,
        module_type: Option<ModuleType>,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        match resolved_type {
            ResolvedType::Module => {
                let (parent_folder, module_name) = split_module_id(id);
                let modules_root_folder = self.modules_root_folder();
                let path =
                    resolve_module_path(self.io(mode), module_name, parent_folder, modules_root_folder.as_deref())
                        .await?;
                self.require_path(&path, cache_mode, module_type, mode, chain).await
            }
            ResolvedType::Path => self.require_path(id, cache_mode, module_type, mode, chain).await,
            ResolvedType::Url => self.require_url(id, module_type, chain).await,
            ResolvedType::SpecialModule => self.require_special_module(id, &RequireOptions::default()),
        }
    }

    async fn require_path(
        &self,
        path: &str,
        cache_mode: CacheInvalidationMode,
        module_type: Option<ModuleType>,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        let existing = self
            .io(mode)
            .find_existing_file_path(path)
            .await?
            .ok_or_else(|| RequireError::FileNotFound(path.to_string()))?;

        self.reload_if_needed(&existing, cache_mode, module_type, mode, chain)
            .await?;

        Ok(self.exports_of(&existing))
    }

    /// Newest timestamp across `path` and its dependencies, reloading
    /// `path` when it is newer than the cached copy.
    fn reload_if_needed<'a>(
        &'a self,
        path: &'a str,
        cache_mode: CacheInvalidationMode,
        module_type: Option<ModuleType>,
        mode: IoMode,
        chain: &'a Arc<ResolutionChain>,
    ) -> BoxFuture<'a, RequireResult<Timestamp>> {
        async move {
            let first_visit = chain.insert(path);
            let cached_timestamp = self.state.lock().timestamp(path).unwrap_or_default();
            if !first_visit {
                return Ok(cached_timestamp);
            }

            let io = self.io(mode);
            let mut timestamp = io.get_timestamp(path).await?;
            self.state.lock().bump_timestamp(path, timestamp);

            let dependencies = self.state.lock().dependencies(path);
            let modules_root = self.modules_root();
            for dependency in dependencies {
                let resolved = self.resolver.resolve(&dependency, Some(path), &modules_root)?;
                let dependency_timestamp = match resolved.resolved_type {
                    ResolvedType::Module => {
                        let folder = dirname(trim_query(path));
                        let modules_root_folder = self.modules_root_folder();
                        let mut newest = 0;
                        for root in root_folders(io, &folder, modules_root_folder.as_deref()).await? {
                            let manifest = join(&[root.as_str(), PACKAGE_JSON]);
                            if !io.exists_file(&manifest).await? {
                                continue;
                            }
                            newest = newest.max(self.reload_if_needed(&manifest, cache_mode, None, mode, chain).await?);
                        }
                        newest
                    }
                    ResolvedType::Path => match io.find_existing_file_path(&resolved.resolved_id).await? {
                        Some(existing) => self.reload_if_needed(&existing, cache_mode, None, mode, chain).await?,
                        None => {
                            debug!(path, dependency = %dependency, "dependency is missing, forcing reload");
                            now()
                        }
                    },
                    ResolvedType::Url => self.url_dependency_timestamp(path, &resolved.resolved_id, cache_mode, mode)?,
                    ResolvedType::SpecialModule => 0,
                };
                timestamp = timestamp.max(dependency_timestamp);
                self.state.lock().bump_timestamp(path, timestamp);
            }

            let needs_reload = {
                let state = self.state.lock();
                cache_mode == CacheInvalidationMode::Always
                    || timestamp > cached_timestamp
                    || !state.has_reusable_value(path)
            };

            if needs_reload {
                debug!(path, "loading module");
                self.load_into_cache(path, self.require_path_impl(path, module_type, mode, chain))
                    .await?;
            } else {
                trace!(path, "module is up to date");
                self.state.lock().restore_previous(path);
            }

            Ok(timestamp)
        }
        .boxed()
    }

    /// URLs carry no timestamp; a URL dependency counts as changed now.
    fn url_dependency_timestamp(
        &self,
        path: &str,
        url: &str,
        cache_mode: CacheInvalidationMode,
        mode: IoMode,
    ) -> RequireResult<Timestamp> {
        if cache_mode == CacheInvalidationMode::Never {
            return Ok(0);
        }
        if !mode.is_sync() {
            return Ok(now());
        }

        let message = format!(
            "Module {path} depends on URL {url}.\nURL dependencies validation is not supported when cacheInvalidationMode={cache_mode}.\nConsider using cacheInvalidationMode={}.\n{SYNC_REQUIRE_ADVICE}",
            CacheInvalidationMode::Never
        );
        match cache_mode {
            CacheInvalidationMode::Always => Err(RequireError::unsupported_sync(message)),
            _ => {
                warn!("{message}");
                Ok(0)
            }
        }
    }

    async fn require_path_impl(
        &self,
        path: &str,
        module_type: Option<ModuleType>,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        let module_type = match module_type {
            Some(module_type) => module_type,
            None => ModuleType::from_path(path)?,
        };
        let io = self.io(mode);

        match module_type {
            ModuleType::Json => {
                let text = io.read_file(path).await?;
                parse_json(path, &text)
            }
            ModuleType::JsTs => {
                let code = io.read_file(path).await?;
                let module = StringModule {
                    code: &code,
                    path,
                    url_suffix: "",
                    dependency_owner: path,
                };
                self.require_code(module, mode, chain).await
            }
            ModuleType::Markdown => {
                let markdown = io.read_file(path).await?;
                self.require_markdown(path, &markdown, mode, chain).await
            }
            ModuleType::Node => match mode {
                IoMode::Sync => self.adapter.require_node_binary_sync(self.host.as_ref(), path),
                IoMode::Async => self.adapter.require_node_binary(self.host.as_ref(), path, None).await,
            },
            ModuleType::Wasm => match mode {
                IoMode::Sync => Err(RequireError::unsupported_sync(format!(
                    "Cannot require WebAssembly module '{path}' synchronously."
                ))),
                IoMode::Async => {
                    let bytes = self.adapter.read_file_binary(path).await?;
                    self.host.instantiate_wasm(trim_query(path), bytes).await
                }
            },
        }
    }

    async fn require_markdown(
        &self,
        path: &str,
        markdown: &str,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        let script = extract_code_script(markdown, path).map_err(|e| RequireError::resolution(e.to_string()))?;
        let module_path = code_script_module_path(trim_query(path), script.name.as_deref());
        let module = StringModule {
            code: &script.code,
            path: &module_path,
            url_suffix: "",
            dependency_owner: path,
        };
        self.require_code(module, mode, chain).await
    }

    async fn require_url(
        &self,
        url: &str,
        module_type: Option<ModuleType>,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        debug!(url, "fetching module");
        let response = reqwest::get(url).await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let module_type = module_type.unwrap_or_else(|| ModuleType::from_content_type(content_type.as_deref(), url));

        match module_type {
            ModuleType::Node => {
                let bytes = response.bytes().await?.to_vec();
                self.adapter
                    .require_node_binary(self.host.as_ref(), url, Some(bytes))
                    .await
            }
            ModuleType::Wasm => {
                let bytes = response.bytes().await?.to_vec();
                self.host.instantiate_wasm(url, bytes).await
            }
            ModuleType::Json => {
                let text = response.text().await?;
                parse_json(url, &text)
            }
            ModuleType::JsTs => {
                let code = response.text().await?;
                let module = StringModule {
                    code: &code,
                    path: url,
                    url_suffix: "",
                    dependency_owner: url,
                };
                self.require_code(module, IoMode::Async, chain).await
            }
            ModuleType::Markdown => {
                let markdown = response.text().await?;
                self.require_markdown(url, &markdown, IoMode::Async, chain).await
            }
        }
    }

    /// [`Self::require_string_impl`] with failures reported as
    /// "Failed to load module: <path>".
    async fn require_code(
        &self,
        module: StringModule<'_>,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        let path = module.path;
        self.require_string_impl(module, mode, chain)
            .await
            .map_err(|e| RequireError::load_failed(path, e))
    }

    /// Transform and evaluate module source, returning `module.exports`.
    async fn require_string_impl(
        &self,
        module: StringModule<'_>,
        mode: IoMode,
        chain: &Arc<ResolutionChain>,
    ) -> RequireResult<ModuleExports> {
        let path = module.path;
        let is_remote = is_url(path);
        let source_url = format!(
            "{}{}",
            to_resource_url(&self.config.resource_url_prefix, path),
            module.url_suffix
        );
        let wrap_in_async_function = !mode.is_sync();

        let output = transform(
            &TransformRequest {
                code: module.code,
                path,
                source_url: &source_url,
                wrap_in_async_function,
                context_keys: ModuleContext::KEYS,
            },
            &self.config.transform,
        )
        .map_err(|source| RequireError::Transform {
            path: path.to_string(),
            source,
        })?;

        if output.has_top_level_await && mode.is_sync() {
            return Err(RequireError::TopLevelSuspend { path: path.to_string() });
        }

        let eval_prefix = if mode.is_sync() { "requireString" } else { "requireStringAsync" };
        let unit = CompiledUnit {
            path: path.to_string(),
            eval_name: format!("{eval_prefix}/{path}{}", module.url_suffix),
            source_url,
            code: output.code,
            has_top_level_await: output.has_top_level_await,
            is_async: wrap_in_async_function,
        };

        let record = ModuleRecord::new();
        let require = ChildRequire::new(self.this.clone(), path, module.dependency_owner, chain.clone());
        let context = ModuleContext {
            app: self.host.app(),
            console: ScriptConsole::new(path),
            container: None,
            exports: record.exports_object(),
            module: record.clone(),
            require: require.clone(),
            require_async: require,
            require_async_wrapper: AsyncWrapperBinding::new(self.this.clone()),
            dirname: if is_remote { String::new() } else { dirname(path) },
            filename: path.to_string(),
        };

        trace!(path, name = %unit.eval_name, "evaluating module");
        match self.evaluator.evaluate(&unit, context)? {
            Evaluation::Completed => {}
            Evaluation::Pending(_) if mode.is_sync() => {
                return Err(RequireError::TopLevelSuspend { path: path.to_string() });
            }
            Evaluation::Pending(completion) => completion.await?,
        }

        Ok(record.exports())
    }
}

fn parse_json(path: &str, text: &str) -> RequireResult<ModuleExports> {
    serde_json::from_str(text)
        .map(ModuleExports::json)
        .map_err(|e| RequireError::json(path, e))
}
