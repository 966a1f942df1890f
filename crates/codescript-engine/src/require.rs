//! `require` functions handed to module bodies.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use crate::cache::ResolutionChain;
use crate::error::{RequireError, RequireResult};
use crate::handler::RequireHandler;
use crate::types::{CacheInvalidationMode, RequireOptions};
use crate::value::ModuleExports;

/// `require` / `requireAsync` bound to the module that uses them.
///
/// Every call records the identifier as a dependency of the owning module
/// and resolves relative identifiers against its path.
#[derive(Clone)]
pub struct ChildRequire {
    handler: Weak<RequireHandler>,
    parent_path: Option<Arc<str>>,
    /// Module the calls are recorded as dependencies of.
    dependency_owner: Option<Arc<str>>,
    /// Errors from a `requireAsyncWrapper` preload, replayed on require.
    preload_errors: Arc<HashMap<String, Arc<RequireError>>>,
    forced_mode: Option<CacheInvalidationMode>,
    /// Chain of the root require that loaded the owning module.
    chain: Option<Arc<ResolutionChain>>,
}

impl ChildRequire {
    pub(crate) fn new(
        handler: Weak<RequireHandler>,
        parent_path: &str,
        dependency_owner: &str,
        chain: Arc<ResolutionChain>,
    ) -> Self {
        Self {
            handler,
            parent_path: Some(parent_path.into()),
            dependency_owner: Some(dependency_owner.into()),
            preload_errors: Arc::default(),
            forced_mode: None,
            chain: Some(chain),
        }
    }

    /// Require with no parent module: identifiers are resolved against the
    /// caller location and nothing is recorded.
    pub fn root(handler: &Arc<RequireHandler>) -> Self {
        Self {
            handler: Arc::downgrade(handler),
            parent_path: None,
            dependency_owner: None,
            preload_errors: Arc::default(),
            forced_mode: None,
            chain: None,
        }
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.parent_path.as_deref()
    }

    pub(crate) fn with_preload(
        &self,
        preload_errors: HashMap<String, Arc<RequireError>>,
        forced_mode: CacheInvalidationMode,
    ) -> Self {
        Self {
            preload_errors: Arc::new(preload_errors),
            forced_mode: Some(forced_mode),
            ..self.clone()
        }
    }

    fn handler(&self) -> RequireResult<Arc<RequireHandler>> {
        self.handler
            .upgrade()
            .ok_or_else(|| RequireError::platform("Require handler is no longer available"))
    }

    fn before_require(
        &self,
        handler: &RequireHandler,
        id: &str,
        options: RequireOptions,
    ) -> RequireResult<RequireOptions> {
        if let Some(error) = self.preload_errors.get(id) {
            return Err(RequireError::Shared(error.clone()));
        }

        if let Some(owner) = &self.dependency_owner {
            handler.state.lock().record_dependency(owner, id);
        }

        let prepend = RequireOptions {
            parent_path: self.parent_path.as_deref().map(str::to_string),
            ..RequireOptions::default()
        };
        let append = RequireOptions {
            cache_invalidation_mode: self.forced_mode,
            ..RequireOptions::default()
        };
        Ok(options.merged(&prepend, &append))
    }

    pub fn require(&self, id: &str, options: RequireOptions) -> RequireResult<ModuleExports> {
        let handler = self.handler()?;
        let options = self.before_require(&handler, id, options)?;
        handler.require_in(id, options, self.chain.clone())
    }

    pub async fn require_async(&self, id: &str, options: RequireOptions) -> RequireResult<ModuleExports> {
        let handler = self.handler()?;
        let options = self.before_require(&handler, id, options)?;
        handler.require_async_in(id, options, self.chain.clone()).await
    }
}

/// The `requireAsyncWrapper` binding.
#[derive(Clone)]
pub struct AsyncWrapperBinding {
    handler: Weak<RequireHandler>,
}

impl AsyncWrapperBinding {
    pub(crate) fn new(handler: Weak<RequireHandler>) -> Self {
        Self { handler }
    }

    /// Preload every literal `require` in `source` asynchronously, then run
    /// `body` with a `require` that serves the preloaded modules.
    pub async fn call<F, Fut>(&self, source: &str, body: F, require: Option<ChildRequire>) -> RequireResult<ModuleExports>
    where
        F: FnOnce(ChildRequire) -> Fut,
        Fut: Future<Output = RequireResult<ModuleExports>>,
    {
        let handler = self
            .handler
            .upgrade()
            .ok_or_else(|| RequireError::platform("Require handler is no longer available"))?;
        handler.require_async_wrapper(source, body, require).await
    }
}
