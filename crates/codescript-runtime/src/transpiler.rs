//! Module source transformation.
//!
//! Turns a JavaScript or TypeScript module into a single function expression
//! the host evaluates with a module context. The pipeline is:
//! strip TypeScript, convert to CommonJS, wrap, rewrite dynamic imports,
//! then emit with an inline source map pointing at the module's source URL.

use base64::Engine;
use swc_common::{
    DUMMY_SP, FileName, GLOBALS, Globals, Mark, SourceMap, source_map::SourceMapGenConfig, sync::Lrc,
};
use swc_ecma_ast::{Module, ModuleItem, Program};
use swc_ecma_codegen::{Config as CodegenConfig, Emitter, text_writer::JsWriter};
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, TsSyntax, lexer::Lexer};
use swc_ecma_transforms_base::{fixer::fixer, resolver};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::VisitMutWith;

use crate::commonjs::{CommonJsConverter, has_top_level_await};
use crate::config::TransformConfig;
use crate::dynamic_import::DynamicImportRewriter;
use crate::error::{TransformError, TransformResult};
use crate::wrapper;

const SOURCE_MAP_PREFIX: &str = "\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,";

/// Extensions parsed as plain JavaScript; everything else is TypeScript.
const JAVASCRIPT_EXTENSIONS: [&str; 3] = [".js", ".cjs", ".mjs"];

/// Input for [`transform`].
#[derive(Debug, Clone)]
pub struct TransformRequest<'a> {
    /// Module source.
    pub code: &'a str,
    /// Module path; picks the syntax and names the file in errors.
    pub path: &'a str,
    /// URL recorded as the source in the emitted source map.
    pub source_url: &'a str,
    /// Run the body through `requireAsyncWrapper` so `require` calls are
    /// preloaded asynchronously.
    pub wrap_in_async_function: bool,
    /// Names destructured from the module context object.
    pub context_keys: &'a [&'a str],
}

/// Result of [`transform`].
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Evaluable code: one parenthesized function expression.
    pub code: String,
    /// Whether the original source awaits outside of any function.
    pub has_top_level_await: bool,
    /// Source map JSON, also inlined at the end of `code`.
    pub source_map: Option<String>,
}

struct SourceUrlConfig<'a> {
    source_url: &'a str,
}

impl SourceMapGenConfig for SourceUrlConfig<'_> {
    fn file_name_to_source(&self, _: &FileName) -> String {
        self.source_url.to_string()
    }

    fn inline_sources_content(&self, _: &FileName) -> bool {
        true
    }
}

fn is_javascript_path(path: &str) -> bool {
    let path = crate::query::trim_query(path).to_ascii_lowercase();
    JAVASCRIPT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Transform module source into evaluable wrapper code.
pub fn transform(request: &TransformRequest<'_>, config: &TransformConfig) -> TransformResult<TransformOutput> {
    let cm: Lrc<SourceMap> = Default::default();

    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(request.path.to_string())),
        request.code.to_string(),
    );

    let is_typescript = !is_javascript_path(request.path);
    let syntax = if is_typescript {
        Syntax::Typescript(TsSyntax {
            tsx: false,
            decorators: config.decorators,
            ..Default::default()
        })
    } else {
        Syntax::Es(EsSyntax {
            decorators: config.decorators,
            ..Default::default()
        })
    };

    let lexer = Lexer::new(syntax, config.target, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);

    let module = parser
        .parse_module()
        .map_err(|e| TransformError::parse(request.path, format!("{:?}", e.kind())))?;

    if let Some(e) = parser.take_errors().into_iter().next() {
        return Err(TransformError::parse(request.path, format!("{:?}", e.kind())));
    }

    let has_top_level_await = has_top_level_await(&module);
    let mut program = Program::Module(module);

    let module = GLOBALS.set(&Globals::default(), || -> TransformResult<Module> {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        program.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, is_typescript));
        if is_typescript {
            program.mutate(&mut strip(unresolved_mark, top_level_mark));
        }

        let mut converter = CommonJsConverter::default();
        program.visit_mut_with(&mut converter);

        let items = match program {
            Program::Module(m) => m.body,
            Program::Script(_) => {
                return Err(TransformError::Transform(
                    "Expected module, got script".to_string(),
                ));
            }
        };
        let stmts = converter.finish(items)?;

        let wrapped = wrapper::wrap(stmts, request.context_keys, request.wrap_in_async_function)?;
        let mut wrapped = Program::Module(Module {
            span: DUMMY_SP,
            body: wrapped.into_iter().map(ModuleItem::Stmt).collect(),
            shebang: None,
        });
        wrapped.visit_mut_with(&mut DynamicImportRewriter);
        wrapped.visit_mut_with(&mut fixer(None));

        match wrapped {
            Program::Module(m) => Ok(m),
            Program::Script(_) => Err(TransformError::Transform(
                "Expected module, got script".to_string(),
            )),
        }
    })?;

    let mut buf = vec![];
    let mut src_map_buf = vec![];

    {
        let writer = JsWriter::new(
            cm.clone(),
            "\n",
            &mut buf,
            if config.source_maps {
                Some(&mut src_map_buf)
            } else {
                None
            },
        );

        let codegen_config = CodegenConfig::default()
            .with_target(config.target)
            .with_ascii_only(false)
            .with_minify(false)
            .with_omit_last_semi(false);

        let mut emitter = Emitter {
            cfg: codegen_config,
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };

        emitter
            .emit_module(&module)
            .map_err(|e| TransformError::Codegen(format!("Failed to emit code: {}", e)))?;
    }

    let mut code = String::from_utf8(buf)
        .map_err(|e| TransformError::Codegen(format!("Invalid UTF-8 output: {}", e)))?;

    let source_map = if config.source_maps {
        let mut map_buf = vec![];
        cm.build_source_map(
            &src_map_buf,
            None,
            SourceUrlConfig {
                source_url: request.source_url,
            },
        )
        .to_writer(&mut map_buf)
        .map_err(|e| TransformError::SourceMap(e.to_string()))?;

        let map = String::from_utf8(map_buf).map_err(|e| TransformError::SourceMap(e.to_string()))?;
        code.push_str(SOURCE_MAP_PREFIX);
        code.push_str(&base64::engine::general_purpose::STANDARD.encode(&map));
        Some(map)
    } else {
        None
    };

    Ok(TransformOutput {
        code,
        has_top_level_await,
        source_map,
    })
}
