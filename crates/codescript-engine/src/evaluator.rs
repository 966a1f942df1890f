//! Boundary to the JavaScript engine that runs compiled modules.

use futures_util::future::BoxFuture;

use crate::context::ModuleContext;
use crate::error::{RequireError, RequireResult};

/// A transformed module ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Module path, or URL for remote modules.
    pub path: String,
    /// Name to register the evaluated source under, e.g.
    /// `requireStringAsync//vault/a.ts`.
    pub eval_name: String,
    /// URL the inline source map points back to.
    pub source_url: String,
    /// Wrapper function source. Its parameters destructure the bindings
    /// listed in [`ModuleContext::KEYS`].
    pub code: String,
    pub has_top_level_await: bool,
    /// Whether the body is wrapped in an async `requireAsyncWrapper` call.
    pub is_async: bool,
}

/// Outcome of starting an evaluation.
pub enum Evaluation {
    /// The module body ran to completion.
    Completed,
    /// The module body is async; the future completes with it.
    Pending(BoxFuture<'static, RequireResult<()>>),
}

impl std::fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("Completed"),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Runs compiled modules.
///
/// The engine calls the wrapper function in [`CompiledUnit::code`] with the
/// bindings of `context`. Exports are written through `context.module` and
/// `context.exports`.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, unit: &CompiledUnit, context: ModuleContext) -> RequireResult<Evaluation>;
}

/// Evaluator for handlers that only resolve and transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvaluator;

impl Evaluator for NoEvaluator {
    fn evaluate(&self, unit: &CompiledUnit, _context: ModuleContext) -> RequireResult<Evaluation> {
        Err(RequireError::evaluation(format!(
            "No evaluator configured to run {}",
            unit.path
        )))
    }
}
