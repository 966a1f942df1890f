//! Helpers for building AST fragments from JavaScript snippets.
//!
//! Generated code is written as source text and parsed with a throwaway
//! `SourceMap`. Spans are reset so the fragments never leak bogus positions
//! into the module's source map.

use swc_common::{DUMMY_SP, FileName, SourceMap, Span, sync::Lrc};
use swc_ecma_ast::{EsVersion, Expr, Stmt};
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, lexer::Lexer};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::error::{TransformError, TransformResult};

struct DropSpans;

impl VisitMut for DropSpans {
    fn visit_mut_span(&mut self, span: &mut Span) {
        *span = DUMMY_SP;
    }
}

/// Parse a sequence of statements.
pub(crate) fn parse_stmts(code: &str) -> TransformResult<Vec<Stmt>> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), code.to_string());

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let mut script = parser.parse_script().map_err(|e| {
        TransformError::Transform(format!("Invalid generated code `{code}`: {:?}", e.kind()))
    })?;
    script.visit_mut_with(&mut DropSpans);

    Ok(script.body)
}

/// Parse a single expression.
pub(crate) fn parse_expr(code: &str) -> TransformResult<Box<Expr>> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), code.to_string());

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let mut expr = parser.parse_expr().map_err(|e| {
        TransformError::Transform(format!("Invalid generated code `{code}`: {:?}", e.kind()))
    })?;
    expr.visit_mut_with(&mut DropSpans);

    Ok(expr)
}

/// Whether `name` can be written as a bare identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Render a string as a JavaScript string literal.
pub(crate) fn string_literal(value: &str) -> String {
    // JSON string syntax is a subset of JavaScript string syntax.
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// Render `object.name`, falling back to `object["name"]`.
pub(crate) fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", string_literal(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("require"));
        assert!(is_identifier("__dirname"));
        assert!(is_identifier("$el"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_member() {
        assert_eq!(member("exports", "foo"), "exports.foo");
        assert_eq!(member("exports", "foo-bar"), "exports[\"foo-bar\"]");
    }

    #[test]
    fn test_parse_stmts() {
        let stmts = parse_stmts("const a = 1; exports.a = a;").expect("parse failed");
        assert_eq!(stmts.len(), 2);
        assert!(parse_stmts("const = ;").is_err());
    }
}
