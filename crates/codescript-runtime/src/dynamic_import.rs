//! Dynamic `import()` rewriting.

use swc_ecma_ast::{Callee, Expr, Ident};
use swc_ecma_visit::{VisitMut, VisitMutWith};

/// Name of the context binding dynamic imports are redirected to.
pub const REQUIRE_ASYNC_BINDING: &str = "requireAsync";

/// Rewrites `import(specifier)` into `requireAsync(specifier)`.
pub(crate) struct DynamicImportRewriter;

impl VisitMut for DynamicImportRewriter {
    fn visit_mut_callee(&mut self, callee: &mut Callee) {
        callee.visit_mut_children_with(self);

        if let Callee::Import(import) = callee {
            let ident = Ident::new(REQUIRE_ASYNC_BINDING.into(), import.span, Default::default());
            *callee = Callee::Expr(Box::new(Expr::Ident(ident)));
        }
    }
}
