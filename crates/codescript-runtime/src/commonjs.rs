//! ES module to CommonJS conversion.
//!
//! Runs after TypeScript stripping. Every import and export declaration is
//! replaced with plain statements against the `require`, `exports` and
//! `module` bindings the wrapper function provides.

use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::error::{TransformError, TransformResult};
use crate::template::{self, member, string_literal};

const DEFAULT_BINDING: &str = "__default";

const ES_MODULE_MARKER: &str = r#"Object.defineProperty(exports, "__esModule", { value: true });"#;

const IMPORT_DEFAULT_HELPER: &str = r#"function __importDefault(mod) {
    return mod && mod.__esModule ? mod.default : mod;
}"#;

const EXPORT_STAR_HELPER: &str = r#"function __exportStar(mod, target) {
    for (const key of Object.keys(mod)) {
        if (key !== "default" && !Object.prototype.hasOwnProperty.call(target, key)) {
            target[key] = mod[key];
        }
    }
}"#;

const IMPORT_META: &str =
    r#"({ url: "file://" + __filename, filename: __filename, dirname: __dirname })"#;

/// Get the string value of a string literal
fn str_value(value: &Str) -> String {
    value.value.as_str().unwrap_or_default().to_string()
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(id) => id.sym.as_str().to_string(),
        ModuleExportName::Str(s) => str_value(s),
    }
}

/// Collect all names bound by a pattern.
fn collect_pattern_names(pat: &Pat, names: &mut Vec<String>) {
    match pat {
        Pat::Ident(ident) => names.push(ident.sym.as_str().to_string()),
        Pat::Object(obj) => {
            for prop in &obj.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => collect_pattern_names(&kv.value, names),
                    ObjectPatProp::Assign(assign) => names.push(assign.key.sym.as_str().to_string()),
                    ObjectPatProp::Rest(rest) => collect_pattern_names(&rest.arg, names),
                }
            }
        }
        Pat::Array(arr) => {
            for elem in arr.elems.iter().flatten() {
                collect_pattern_names(elem, names);
            }
        }
        Pat::Rest(rest) => collect_pattern_names(&rest.arg, names),
        Pat::Assign(assign) => collect_pattern_names(&assign.left, names),
        _ => {}
    }
}

fn entity_name(name: &TsEntityName) -> String {
    match name {
        TsEntityName::Ident(ident) => ident.sym.as_str().to_string(),
        TsEntityName::TsQualifiedName(qualified) => {
            format!("{}.{}", entity_name(&qualified.left), qualified.right.sym.as_str())
        }
    }
}

fn const_decl(name: &str, init: Box<Expr>) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: Ident::new(name.into(), DUMMY_SP, Default::default()),
                type_ann: None,
            }),
            init: Some(init),
            definite: false,
        }],
        ctxt: Default::default(),
    })))
}

/// Whether the module uses `await` outside of any function body.
pub fn has_top_level_await(module: &Module) -> bool {
    let mut finder = TopLevelAwaitFinder::default();
    module.visit_with(&mut finder);
    finder.found
}

#[derive(Default)]
struct TopLevelAwaitFinder {
    found: bool,
}

impl Visit for TopLevelAwaitFinder {
    fn visit_await_expr(&mut self, _: &AwaitExpr) {
        self.found = true;
    }

    fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
        if stmt.is_await {
            self.found = true;
        }
        stmt.visit_children_with(self);
    }

    fn visit_function(&mut self, _: &Function) {}

    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
}

/// Rewrites module declarations into CommonJS statements.
#[derive(Default)]
pub(crate) struct CommonJsConverter {
    binding_counter: usize,
    has_module_syntax: bool,
    needs_import_default: bool,
    needs_export_star: bool,
    hoisted: Vec<Stmt>,
    trailing: Vec<Stmt>,
    error: Option<TransformError>,
}

impl CommonJsConverter {
    /// Convert the visited module body into plain statements.
    pub(crate) fn finish(mut self, items: Vec<ModuleItem>) -> TransformResult<Vec<Stmt>> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let mut stmts = Vec::with_capacity(items.len() + self.hoisted.len() + self.trailing.len());
        if self.needs_import_default {
            stmts.extend(template::parse_stmts(IMPORT_DEFAULT_HELPER)?);
        }
        if self.needs_export_star {
            stmts.extend(template::parse_stmts(EXPORT_STAR_HELPER)?);
        }
        if self.has_module_syntax {
            stmts.extend(template::parse_stmts(ES_MODULE_MARKER)?);
        }
        stmts.append(&mut self.hoisted);

        for item in items {
            match item {
                ModuleItem::Stmt(stmt) => stmts.push(stmt),
                ModuleItem::ModuleDecl(_) => {
                    return Err(TransformError::Transform(
                        "Unsupported module declaration left after CommonJS conversion".to_string(),
                    ));
                }
            }
        }

        stmts.append(&mut self.trailing);
        Ok(stmts)
    }

    fn next_binding(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.binding_counter);
        self.binding_counter += 1;
        name
    }

    fn parse_into(&mut self, code: &str, out: &mut Vec<Stmt>) {
        match template::parse_stmts(code) {
            Ok(stmts) => out.extend(stmts),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
    }

    fn export_assignment(&mut self, exported: &str, local: &str, out: &mut Vec<Stmt>) {
        let code = format!("{} = {local};", member("exports", exported));
        self.parse_into(&code, out);
    }

    fn convert_import(&mut self, import: &ImportDecl, out: &mut Vec<Stmt>) {
        if import.type_only {
            return;
        }

        let src = string_literal(&str_value(&import.src));
        if import.specifiers.is_empty() {
            self.parse_into(&format!("require({src});"), out);
            return;
        }

        let binding = self.next_binding("__import");
        self.parse_into(&format!("const {binding} = require({src});"), out);

        for specifier in &import.specifiers {
            match specifier {
                ImportSpecifier::Default(default) => {
                    self.needs_import_default = true;
                    let code = format!(
                        "const {} = __importDefault({binding});",
                        default.local.sym.as_str()
                    );
                    self.parse_into(&code, out);
                }
                ImportSpecifier::Named(named) if named.is_type_only => {}
                ImportSpecifier::Named(named) => {
                    let local = named.local.sym.as_str();
                    let imported = named
                        .imported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| local.to_string());
                    let code = format!("const {local} = {};", member(&binding, &imported));
                    self.parse_into(&code, out);
                }
                ImportSpecifier::Namespace(ns) => {
                    let code = format!("const {} = {binding};", ns.local.sym.as_str());
                    self.parse_into(&code, out);
                }
            }
        }
    }

    fn convert_export_decl(&mut self, export: ExportDecl, out: &mut Vec<Stmt>) {
        match &export.decl {
            Decl::Fn(fn_decl) => {
                let name = fn_decl.ident.sym.as_str().to_string();
                let mut hoisted = std::mem::take(&mut self.hoisted);
                self.export_assignment(&name, &name, &mut hoisted);
                self.hoisted = hoisted;
                out.push(Stmt::Decl(export.decl));
            }
            Decl::Class(class_decl) => {
                let name = class_decl.ident.sym.as_str().to_string();
                out.push(Stmt::Decl(export.decl));
                self.export_assignment(&name, &name, out);
            }
            Decl::Var(var_decl) => {
                let mut names = Vec::new();
                for decl in &var_decl.decls {
                    collect_pattern_names(&decl.name, &mut names);
                }
                out.push(Stmt::Decl(export.decl));
                for name in names {
                    self.export_assignment(&name, &name, out);
                }
            }
            Decl::TsEnum(ts_enum) => {
                let name = ts_enum.id.sym.as_str().to_string();
                out.push(Stmt::Decl(export.decl));
                self.export_assignment(&name, &name, out);
            }
            // Interfaces, type aliases and ambient namespaces carry no runtime value.
            _ => {}
        }
    }

    fn convert_export_default_decl(&mut self, export: ExportDefaultDecl, out: &mut Vec<Stmt>) {
        match export.decl {
            DefaultDecl::Fn(fn_expr) => {
                let ident = fn_expr
                    .ident
                    .unwrap_or_else(|| Ident::new(DEFAULT_BINDING.into(), DUMMY_SP, Default::default()));
                let name = ident.sym.as_str().to_string();
                let mut hoisted = std::mem::take(&mut self.hoisted);
                self.export_assignment("default", &name, &mut hoisted);
                self.hoisted = hoisted;
                out.push(Stmt::Decl(Decl::Fn(FnDecl {
                    ident,
                    declare: false,
                    function: fn_expr.function,
                })));
            }
            DefaultDecl::Class(class_expr) => {
                let ident = class_expr
                    .ident
                    .unwrap_or_else(|| Ident::new(DEFAULT_BINDING.into(), DUMMY_SP, Default::default()));
                let name = ident.sym.as_str().to_string();
                out.push(Stmt::Decl(Decl::Class(ClassDecl {
                    ident,
                    declare: false,
                    class: class_expr.class,
                })));
                self.export_assignment("default", &name, out);
            }
            DefaultDecl::TsInterfaceDecl(_) => {}
        }
    }

    fn convert_export_named(&mut self, export: &NamedExport, out: &mut Vec<Stmt>) {
        if export.type_only {
            return;
        }

        let Some(src) = &export.src else {
            // Local bindings may be declared after the export list.
            let mut trailing = std::mem::take(&mut self.trailing);
            for specifier in &export.specifiers {
                if let ExportSpecifier::Named(named) = specifier {
                    if named.is_type_only {
                        continue;
                    }
                    let orig = export_name(&named.orig);
                    let exported = named.exported.as_ref().map(export_name).unwrap_or_else(|| orig.clone());
                    self.export_assignment(&exported, &orig, &mut trailing);
                }
            }
            self.trailing = trailing;
            return;
        };

        let binding = self.next_binding("__reexport");
        let src = string_literal(&str_value(src));
        self.parse_into(&format!("const {binding} = require({src});"), out);

        for specifier in &export.specifiers {
            match specifier {
                ExportSpecifier::Named(named) if named.is_type_only => {}
                ExportSpecifier::Named(named) => {
                    let orig = export_name(&named.orig);
                    let exported = named.exported.as_ref().map(export_name).unwrap_or_else(|| orig.clone());
                    self.export_assignment(&exported, &member(&binding, &orig), out);
                }
                ExportSpecifier::Namespace(ns) => {
                    let name = export_name(&ns.name);
                    self.export_assignment(&name, &binding, out);
                }
                ExportSpecifier::Default(default) => {
                    self.needs_import_default = true;
                    let name = default.exported.sym.as_str().to_string();
                    self.export_assignment(&name, &format!("__importDefault({binding})"), out);
                }
            }
        }
    }

    fn convert_import_equals(&mut self, decl: &TsImportEqualsDecl, out: &mut Vec<Stmt>) {
        if decl.is_type_only {
            return;
        }

        let name = decl.id.sym.as_str().to_string();
        let init = match &decl.module_ref {
            TsModuleRef::TsExternalModuleRef(external) => {
                format!("require({})", string_literal(&str_value(&external.expr)))
            }
            TsModuleRef::TsEntityName(entity) => entity_name(entity),
        };
        self.parse_into(&format!("const {name} = {init};"), out);
        if decl.is_export {
            self.export_assignment(&name, &name, out);
        }
    }
}

impl VisitMut for CommonJsConverter {
    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        let mut new_items = Vec::with_capacity(items.len());

        for item in items.drain(..) {
            let decl = match item {
                ModuleItem::ModuleDecl(decl) => decl,
                stmt => {
                    new_items.push(stmt);
                    continue;
                }
            };

            let mut out = Vec::new();
            match decl {
                ModuleDecl::Import(import) => {
                    self.has_module_syntax = true;
                    self.convert_import(&import, &mut out);
                }
                ModuleDecl::ExportDecl(export) => {
                    self.has_module_syntax = true;
                    self.convert_export_decl(export, &mut out);
                }
                ModuleDecl::ExportDefaultExpr(export) => {
                    self.has_module_syntax = true;
                    out.push(const_decl(DEFAULT_BINDING, export.expr));
                    self.export_assignment("default", DEFAULT_BINDING, &mut out);
                }
                ModuleDecl::ExportDefaultDecl(export) => {
                    self.has_module_syntax = true;
                    self.convert_export_default_decl(export, &mut out);
                }
                ModuleDecl::ExportNamed(export) => {
                    self.has_module_syntax = true;
                    self.convert_export_named(&export, &mut out);
                }
                ModuleDecl::ExportAll(export) => {
                    self.has_module_syntax = true;
                    if !export.type_only {
                        self.needs_export_star = true;
                        let code = format!(
                            "__exportStar(require({}), exports);",
                            string_literal(&str_value(&export.src))
                        );
                        self.parse_into(&code, &mut out);
                    }
                }
                ModuleDecl::TsImportEquals(decl) => self.convert_import_equals(&decl, &mut out),
                ModuleDecl::TsExportAssignment(assign) => {
                    out.push(const_decl(DEFAULT_BINDING, assign.expr));
                    self.parse_into(&format!("module.exports = {DEFAULT_BINDING};"), &mut out);
                }
                ModuleDecl::TsNamespaceExport(_) => {}
            }
            new_items.extend(out.into_iter().map(ModuleItem::Stmt));
        }

        *items = new_items;

        for item in items.iter_mut() {
            item.visit_mut_children_with(self);
        }
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        if let Expr::MetaProp(MetaPropExpr {
            kind: MetaPropKind::ImportMeta,
            ..
        }) = expr
        {
            match template::parse_expr(IMPORT_META) {
                Ok(replacement) => *expr = *replacement,
                Err(e) => {
                    self.error.get_or_insert(e);
                }
            }
        }
    }
}
