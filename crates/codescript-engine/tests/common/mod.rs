//! Shared fixtures: a scripted evaluator and a temporary vault.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use codescript_engine::{
    CompiledUnit, Evaluation, Evaluator, ModuleContext, PlatformAdapter, RequireHandler, RequireHandlerConfig,
    RequireResult,
};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tempfile::TempDir;

type SyncBody = Arc<dyn Fn(ModuleContext) -> RequireResult<()> + Send + Sync>;
type AsyncBody = Arc<dyn Fn(ModuleContext) -> BoxFuture<'static, RequireResult<()>> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Sync(SyncBody),
    Async(AsyncBody),
}

/// Evaluator that runs Rust closures instead of JavaScript.
///
/// Bodies are matched by path suffix; unmatched modules run as empty
/// modules. Every evaluation is counted and its unit kept.
#[derive(Default)]
pub struct FakeEvaluator {
    bodies: Mutex<Vec<(String, Body)>>,
    units: Mutex<Vec<CompiledUnit>>,
}

impl FakeEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn module(&self, suffix: &str, body: impl Fn(ModuleContext) -> RequireResult<()> + Send + Sync + 'static) {
        self.bodies.lock().push((suffix.to_string(), Body::Sync(Arc::new(body))));
    }

    pub fn async_module(
        &self,
        suffix: &str,
        body: impl Fn(ModuleContext) -> BoxFuture<'static, RequireResult<()>> + Send + Sync + 'static,
    ) {
        self.bodies.lock().push((suffix.to_string(), Body::Async(Arc::new(body))));
    }

    pub fn count(&self, suffix: &str) -> usize {
        self.units.lock().iter().filter(|unit| unit.path.ends_with(suffix)).count()
    }

    pub fn units(&self) -> Vec<CompiledUnit> {
        self.units.lock().clone()
    }
}

impl Evaluator for FakeEvaluator {
    fn evaluate(&self, unit: &CompiledUnit, context: ModuleContext) -> RequireResult<Evaluation> {
        self.units.lock().push(unit.clone());
        let body = self
            .bodies
            .lock()
            .iter()
            .find(|(suffix, _)| unit.path.ends_with(suffix.as_str()))
            .map(|(_, body)| body.clone());

        match body {
            None => Ok(Evaluation::Completed),
            Some(Body::Sync(body)) => {
                body(context)?;
                Ok(Evaluation::Completed)
            }
            Some(Body::Async(body)) => Ok(Evaluation::Pending(body(context))),
        }
    }
}

/// Temporary data root with helpers for writing files into it.
pub struct Vault {
    dir: TempDir,
}

impl Vault {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> String {
        self.dir.path().to_string_lossy().replace('\\', "/")
    }

    /// Absolute path, with `/` separators, of a vault-relative path.
    pub fn path(&self, relative: &str) -> String {
        format!("{}/{relative}", self.root())
    }

    fn fs_path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> String {
        let path = self.fs_path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        self.path(relative)
    }

    /// Move the modification time of a file forward.
    pub fn touch_later(&self, relative: &str, seconds: u64) {
        touch(&self.fs_path(relative), SystemTime::now() + Duration::from_secs(seconds));
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.fs_path(relative)).unwrap();
    }

    pub fn config(&self) -> RequireHandlerConfig {
        RequireHandlerConfig::new(self.root())
            .in_flight_timeout(Duration::from_millis(60))
            .in_flight_poll_interval(Duration::from_millis(5))
    }

    pub fn handler(&self, evaluator: Arc<FakeEvaluator>) -> Arc<RequireHandler> {
        RequireHandler::builder(self.config()).evaluator(evaluator).build()
    }

    pub fn handler_with_adapter(
        &self,
        evaluator: Arc<FakeEvaluator>,
        adapter: Arc<dyn PlatformAdapter>,
    ) -> Arc<RequireHandler> {
        RequireHandler::builder(self.config())
            .evaluator(evaluator)
            .adapter(adapter)
            .build()
    }
}

fn touch(path: &Path, time: SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

/// Counts of evaluations keyed by path, for readable assertion failures.
pub fn evaluation_counts(evaluator: &FakeEvaluator) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for unit in evaluator.units() {
        *counts.entry(unit.path).or_default() += 1;
    }
    counts
}
