//! Wraps converted module code into a function expression.
//!
//! The synchronous form is
//!
//! ```js
//! (function scriptWrapper({ require, module, exports, ... }) { <body> });
//! ```
//!
//! and the asynchronous form hands the body to `requireAsyncWrapper` so
//! every `require` call can be preloaded before the body runs:
//!
//! ```js
//! (function scriptWrapper({ require, requireAsyncWrapper, ... }) {
//!     return requireAsyncWrapper(async function requireFn(require) { <body> }, require);
//! });
//! ```

use swc_ecma_ast::{FnExpr, Stmt};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::error::{TransformError, TransformResult};
use crate::template::{self, is_identifier};

const WRAPPER_FUNCTION_NAME: &str = "scriptWrapper";
const REQUIRE_FUNCTION_NAME: &str = "requireFn";

/// Context keys the asynchronous wrapper cannot work without.
const ASYNC_REQUIRED_KEYS: [&str; 2] = ["require", "requireAsyncWrapper"];

struct BodyInjector {
    target: &'static str,
    body: Option<Vec<Stmt>>,
}

impl VisitMut for BodyInjector {
    fn visit_mut_fn_expr(&mut self, fn_expr: &mut FnExpr) {
        let is_target = fn_expr
            .ident
            .as_ref()
            .is_some_and(|ident| ident.sym.as_str() == self.target);

        if is_target {
            if let (Some(block), Some(body)) = (fn_expr.function.body.as_mut(), self.body.take()) {
                block.stmts = body;
            }
            return;
        }

        fn_expr.visit_mut_children_with(self);
    }
}

/// Wrap `body` in the module function whose single parameter destructures `keys`.
pub(crate) fn wrap(body: Vec<Stmt>, keys: &[&str], wrap_in_async_function: bool) -> TransformResult<Vec<Stmt>> {
    if let Some(key) = keys.iter().find(|key| !is_identifier(key)) {
        return Err(TransformError::Transform(format!(
            "Context key '{key}' is not a valid identifier"
        )));
    }

    let pattern = keys.join(", ");
    let (code, target) = if wrap_in_async_function {
        if let Some(missing) = ASYNC_REQUIRED_KEYS.iter().find(|key| !keys.contains(key)) {
            return Err(TransformError::Transform(format!(
                "Asynchronous wrapper needs the '{missing}' context key"
            )));
        }
        (
            format!(
                "(function {WRAPPER_FUNCTION_NAME}({{ {pattern} }}) {{ \
                 return requireAsyncWrapper(async function {REQUIRE_FUNCTION_NAME}(require) {{}}, require); \
                 }});"
            ),
            REQUIRE_FUNCTION_NAME,
        )
    } else {
        (
            format!("(function {WRAPPER_FUNCTION_NAME}({{ {pattern} }}) {{}});"),
            WRAPPER_FUNCTION_NAME,
        )
    };

    let mut stmts = template::parse_stmts(&code)?;
    let mut injector = BodyInjector {
        target,
        body: Some(body),
    };
    stmts.visit_mut_with(&mut injector);

    if injector.body.is_some() {
        return Err(TransformError::Transform(format!(
            "Wrapper function '{target}' not found"
        )));
    }

    Ok(stmts)
}
