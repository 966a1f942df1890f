//! Static extraction of `require` calls from a callback's source.
//!
//! Used to preload everything an async-wrapped body will `require` before
//! the body runs. Only calls whose first argument is a string literal (or a
//! template literal without substitutions) are collected.

use serde_json::{Map, Number, Value};
use swc_common::{FileName, SourceMap, sync::Lrc};
use swc_ecma_ast::*;
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, lexer::Lexer};
use swc_ecma_visit::{Visit, VisitWith};

use crate::error::{TransformError, TransformResult};

const REQUIRE_BINDING: &str = "require";

/// One statically known `require(id, options?)` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequireArgs {
    pub id: String,
    /// Literal properties of the options object, if one was passed.
    pub options: Option<Value>,
}

/// Collect the `require` calls in `source`, in source order.
///
/// `source` is usually the text of a function, so it is first parsed as a
/// parenthesized expression and then as a script.
pub fn extract_require_args(source: &str) -> TransformResult<Vec<RequireArgs>> {
    let mut collector = RequireCallCollector::default();

    if let Some(expr) = parse_as_expression(source) {
        expr.visit_with(&mut collector);
        return Ok(collector.calls);
    }

    let script = parse_as_script(source)?;
    script.visit_with(&mut collector);
    Ok(collector.calls)
}

fn parse_as_expression(source: &str) -> Option<Box<Expr>> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), format!("({source})"));

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let expr = parser.parse_expr().ok()?;

    if parser.take_errors().is_empty() { Some(expr) } else { None }
}

fn parse_as_script(source: &str) -> TransformResult<Script> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), source.to_string());

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    parser
        .parse_script()
        .map_err(|e| TransformError::parse("extract-requires.js", format!("{:?}", e.kind())))
}

#[derive(Default)]
struct RequireCallCollector {
    calls: Vec<RequireArgs>,
}

impl Visit for RequireCallCollector {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if let Some(args) = require_args(call) {
            self.calls.push(args);
        }
        call.visit_children_with(self);
    }
}

fn require_args(call: &CallExpr) -> Option<RequireArgs> {
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    let Expr::Ident(ident) = &**callee else {
        return None;
    };
    if ident.sym.as_str() != REQUIRE_BINDING {
        return None;
    }

    let first = call.args.first().filter(|arg| arg.spread.is_none())?;
    let id = static_string(&first.expr)?;
    let options = call
        .args
        .get(1)
        .filter(|arg| arg.spread.is_none())
        .and_then(|arg| literal_value(&arg.expr));

    Some(RequireArgs { id, options })
}

fn static_string(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(Lit::Str(s)) => s.value.as_str().map(str::to_string),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => {
            Some(tpl.quasis.iter().map(|q| q.raw.as_str()).collect())
        }
        Expr::Paren(paren) => static_string(&paren.expr),
        _ => None,
    }
}

/// Convert a literal expression into JSON, skipping anything dynamic.
fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),
        Expr::Lit(Lit::Num(n)) => Number::from_f64(n.value).map(Value::Number),
        Expr::Lit(Lit::Str(_)) | Expr::Tpl(_) => static_string(expr).map(Value::String),
        Expr::Paren(paren) => literal_value(&paren.expr),
        Expr::Array(array) => Some(Value::Array(
            array
                .elems
                .iter()
                .flatten()
                .filter(|elem| elem.spread.is_none())
                .filter_map(|elem| literal_value(&elem.expr))
                .collect(),
        )),
        Expr::Object(object) => {
            let mut map = Map::new();
            for prop in &object.props {
                let PropOrSpread::Prop(prop) = prop else {
                    continue;
                };
                let Prop::KeyValue(kv) = &**prop else {
                    continue;
                };
                let Some(key) = prop_name(&kv.key) else {
                    continue;
                };
                if let Some(value) = literal_value(&kv.value) {
                    map.insert(key, value);
                }
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

fn prop_name(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(ident) => Some(ident.sym.as_str().to_string()),
        PropName::Str(s) => s.value.as_str().map(str::to_string),
        PropName::Num(n) => Some(n.value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_literal_calls_in_order() {
        let source = r#"async function requireFn(require) {
            const a = require("./a.js");
            const b = require(`./b.ts`);
            const c = require(dynamicName);
            return helper(require("pkg/sub"));
        }"#;

        let args = extract_require_args(source).expect("extract failed");
        let ids: Vec<_> = args.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["./a.js", "./b.ts", "pkg/sub"]);
    }

    #[test]
    fn test_extracts_options_object() {
        let source = r#"(require) => {
            require("./a.js", { cacheInvalidationMode: "never", moduleType: "json", extra: someVar });
        }"#;

        let args = extract_require_args(source).expect("extract failed");
        assert_eq!(args.len(), 1);
        assert_eq!(
            args[0].options,
            Some(json!({ "cacheInvalidationMode": "never", "moduleType": "json" }))
        );
    }

    #[test]
    fn test_ignores_member_require() {
        let args = extract_require_args("(r) => { r.require('./a'); other('./b'); }").expect("extract failed");
        assert!(args.is_empty());
    }

    #[test]
    fn test_script_fallback() {
        let args = extract_require_args("const x = require('./x'); const y = 1;").expect("extract failed");
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].id, "./x");
    }
}
