//! Module cache and dependency bookkeeping.
//!
//! Guarded by a `parking_lot::Mutex` owned by the require handler. The lock
//! is only taken for short synchronous sections and never held across an
//! `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::value::ModuleExports;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

#[derive(Debug, Clone)]
pub(crate) enum CacheEntry {
    /// Load in progress. `previous` keeps the value being replaced so it can
    /// be restored when the reload turns out to be unnecessary.
    Pending { previous: Option<ModuleExports> },
    Loaded(ModuleExports),
}

/// What a cache lookup found.
#[derive(Debug, Clone)]
pub(crate) enum CacheLookup {
    Missing,
    Pending,
    Loaded(ModuleExports),
}

#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: HashMap<String, CacheEntry>,
    /// Specifiers each module required, exactly as written.
    dependencies: HashMap<String, IndexSet<String>>,
    timestamps: HashMap<String, Timestamp>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lookup(&self, id: &str) -> CacheLookup {
        match self.entries.get(id) {
            None => CacheLookup::Missing,
            Some(CacheEntry::Pending { .. }) => CacheLookup::Pending,
            Some(CacheEntry::Loaded(exports)) => CacheLookup::Loaded(exports.clone()),
        }
    }

    /// Exports of a fully loaded entry.
    pub fn loaded(&self, id: &str) -> Option<ModuleExports> {
        match self.entries.get(id) {
            Some(CacheEntry::Loaded(exports)) => Some(exports.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        matches!(self.entries.get(id), Some(CacheEntry::Pending { .. }))
    }

    /// Whether the entry is loaded, or pending over a value that can be put
    /// back.
    pub(crate) fn has_reusable_value(&self, id: &str) -> bool {
        matches!(
            self.entries.get(id),
            Some(CacheEntry::Loaded(_)) | Some(CacheEntry::Pending { previous: Some(_) })
        )
    }

    /// Mark `id` as loading. An existing pending entry is left alone.
    pub(crate) fn begin_load(&mut self, id: &str) {
        let previous = match self.entries.get(id) {
            Some(CacheEntry::Pending { .. }) => return,
            Some(CacheEntry::Loaded(exports)) => Some(exports.clone()),
            None => None,
        };
        self.entries.insert(id.to_string(), CacheEntry::Pending { previous });
    }

    pub(crate) fn finish_load(&mut self, id: &str, exports: ModuleExports) {
        self.entries.insert(id.to_string(), CacheEntry::Loaded(exports));
    }

    /// Drop a failed load. The value it was replacing is discarded too, so
    /// the next require retries instead of serving stale exports.
    pub(crate) fn abort_load(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Turn a pending entry back into the value it was replacing.
    pub(crate) fn restore_previous(&mut self, id: &str) {
        if let Some(CacheEntry::Pending { previous: Some(previous) }) = self.entries.get(id) {
            let previous = previous.clone();
            self.entries.insert(id.to_string(), CacheEntry::Loaded(previous));
        }
    }

    /// End a load that produced no value of its own: restore the value it
    /// was replacing, or drop the entry when there is none.
    pub(crate) fn release_load(&mut self, id: &str) {
        match self.entries.get(id) {
            Some(CacheEntry::Pending { previous: Some(_) }) => self.restore_previous(id),
            Some(CacheEntry::Pending { previous: None }) => {
                self.entries.remove(id);
            }
            _ => {}
        }
    }

    pub fn insert(&mut self, id: &str, exports: ModuleExports) {
        self.finish_load(id, exports);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn record_dependency(&mut self, parent: &str, specifier: &str) {
        self.dependencies
            .entry(parent.to_string())
            .or_default()
            .insert(specifier.to_string());
    }

    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.dependencies
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn timestamp(&self, id: &str) -> Option<Timestamp> {
        self.timestamps.get(id).copied()
    }

    /// Raise the stored timestamp of `id` to at least `timestamp`.
    pub fn bump_timestamp(&mut self, id: &str, timestamp: Timestamp) {
        let stored = self.timestamps.entry(id.to_string()).or_default();
        *stored = (*stored).max(timestamp);
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Drop every entry except those `keep` accepts, along with all
    /// dependency and timestamp records.
    pub fn clear_where(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| keep(id));
        self.dependencies.clear();
        self.timestamps.clear();
        before - self.entries.len()
    }
}

/// Paths visited by one root require call.
///
/// Requires nested inside the root share its chain. The root closes the
/// chain when it returns; a module `require` used after that starts a new
/// chain.
#[derive(Debug, Default)]
pub(crate) struct ResolutionChain {
    inner: Mutex<ChainState>,
}

#[derive(Debug, Default)]
struct ChainState {
    visited: HashSet<String>,
    closed: bool,
}

impl ResolutionChain {
    /// The chain a require runs in, and whether that require is its root.
    pub(crate) fn join_or_start(parent: Option<Arc<ResolutionChain>>) -> (Arc<ResolutionChain>, bool) {
        match parent {
            Some(chain) if !chain.inner.lock().closed => (chain, false),
            _ => (Arc::default(), true),
        }
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.inner.lock().visited.contains(id)
    }

    /// Add `id`. Returns false when it was already visited.
    pub(crate) fn insert(&self, id: &str) -> bool {
        self.inner.lock().visited.insert(id.to_string())
    }

    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.visited.clear();
        inner.closed = true;
    }
}
