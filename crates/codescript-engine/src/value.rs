//! Values a module can export.
//!
//! Evaluation happens in a host engine, so exports are modelled as a small
//! tree of shared values. Every variant is cheap to clone and clones share
//! identity: [`ModuleExports::ptr_eq`] tells whether two handles refer to
//! the same underlying value, which is what cache hits are checked against.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::cache::ModuleCache;
use crate::error::RequireResult;

/// Opaque host-side value (an app handle, a native addon, a wasm instance).
#[derive(Clone)]
pub struct HostValue(Arc<dyn Any + Send + Sync>);

impl HostValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostValue(..)")
    }
}

type ScriptFn = dyn Fn(Vec<ModuleExports>) -> BoxFuture<'static, RequireResult<ModuleExports>> + Send + Sync;

/// Callable export, such as a script's `invoke`.
#[derive(Clone)]
pub struct ScriptFunction {
    name: Arc<str>,
    f: Arc<ScriptFn>,
}

impl ScriptFunction {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Vec<ModuleExports>) -> BoxFuture<'static, RequireResult<ModuleExports>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: Vec<ModuleExports>) -> RequireResult<ModuleExports> {
        (self.f)(args).await
    }

    pub fn ptr_eq(&self, other: &ScriptFunction) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

/// Mutable export object shared by every holder.
#[derive(Clone, Default)]
pub struct ExportsObject(Arc<RwLock<IndexMap<String, ModuleExports>>>);

impl ExportsObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ModuleExports> {
        self.0.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: ModuleExports) {
        self.0.write().insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &ExportsObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Placeholder handed out while a module is still loading.
///
/// Resolves to the real exports once the module finishes, and to an empty
/// "loading" object until then.
#[derive(Clone)]
pub struct PendingExports {
    id: Arc<str>,
    cache: Weak<Mutex<ModuleCache>>,
    loading: ExportsObject,
}

impl PendingExports {
    pub(crate) fn new(id: &str, cache: Weak<Mutex<ModuleCache>>) -> Self {
        Self {
            id: id.into(),
            cache,
            loading: ExportsObject::new(),
        }
    }

    /// Cache key of the module this placeholder stands for.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn loaded(&self) -> Option<ModuleExports> {
        let cache = self.cache.upgrade()?;
        let loaded = cache.lock().loaded(&self.id);
        loaded.filter(|exports| !exports.is_pending())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded().is_some()
    }

    /// Current value behind the placeholder.
    pub fn current(&self) -> ModuleExports {
        self.loaded()
            .unwrap_or_else(|| ModuleExports::Object(self.loading.clone()))
    }
}

/// Exported value of a module.
#[derive(Clone, Default)]
pub enum ModuleExports {
    /// Nothing exported (a skipped special module, a missing cache entry).
    #[default]
    Empty,
    /// JSON document, from `.json` files or host data.
    Json(Arc<Value>),
    /// CommonJS-style export object.
    Object(ExportsObject),
    Function(ScriptFunction),
    Host(HostValue),
    /// Module still loading; see [`PendingExports`].
    Pending(PendingExports),
}

impl ModuleExports {
    pub fn json(value: Value) -> Self {
        Self::Json(Arc::new(value))
    }

    pub fn host<T: Any + Send + Sync>(value: T) -> Self {
        Self::Host(HostValue::new(value))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Follow a pending placeholder to its current value.
    pub fn resolve(&self) -> ModuleExports {
        match self {
            Self::Pending(pending) => pending.current(),
            other => other.clone(),
        }
    }

    /// Look up a named export.
    pub fn get(&self, key: &str) -> Option<ModuleExports> {
        match self {
            Self::Object(object) => object.get(key),
            Self::Json(value) => value.get(key).cloned().map(ModuleExports::json),
            Self::Pending(pending) => pending.current().get(key),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ExportsObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ScriptFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_host<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Host(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Whether both handles share the same underlying value.
    pub fn ptr_eq(&self, other: &ModuleExports) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Json(a), Self::Json(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Host(a), Self::Host(b)) => a.ptr_eq(b),
            (Self::Pending(a), Self::Pending(b)) => a.loading.ptr_eq(&b.loading),
            _ => false,
        }
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(&object.keys()).finish(),
            Self::Function(func) => f.debug_tuple("Function").field(&func.name()).finish(),
            Self::Host(_) => f.write_str("Host(..)"),
            Self::Pending(pending) => f.debug_tuple("Pending").field(&pending.id()).finish(),
        }
    }
}

impl From<Value> for ModuleExports {
    fn from(value: Value) -> Self {
        Self::json(value)
    }
}

impl From<ExportsObject> for ModuleExports {
    fn from(object: ExportsObject) -> Self {
        Self::Object(object)
    }
}

/// The `module` binding a module body writes its exports through.
#[derive(Clone)]
pub struct ModuleRecord {
    initial: ExportsObject,
    exports: Arc<RwLock<ModuleExports>>,
}

impl ModuleRecord {
    pub fn new() -> Self {
        let initial = ExportsObject::new();
        Self {
            exports: Arc::new(RwLock::new(ModuleExports::Object(initial.clone()))),
            initial,
        }
    }

    /// Current `module.exports`.
    pub fn exports(&self) -> ModuleExports {
        self.exports.read().clone()
    }

    /// Replace `module.exports`.
    pub fn set_exports(&self, exports: ModuleExports) {
        *self.exports.write() = exports;
    }

    /// The object bound as `exports`, which stays the same even after
    /// `module.exports` is replaced.
    pub fn exports_object(&self) -> ExportsObject {
        self.initial.clone()
    }
}

impl Default for ModuleRecord {
    fn default() -> Self {
        Self::new()
    }
}
