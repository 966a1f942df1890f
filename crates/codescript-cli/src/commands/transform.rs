//! Transform command - print the evaluable form of a script.

use anyhow::Result;
use clap::Args;
use codescript_engine::ModuleContext;
use codescript_engine::resolver::to_resource_url;
use codescript_engine::DEFAULT_RESOURCE_URL_PREFIX;
use codescript_runtime::{TransformConfig, TransformRequest, code_script_module_path, extract_code_script, transform};
use std::path::PathBuf;

#[derive(Args)]
pub struct TransformCommand {
    /// Script or markdown note to transform
    pub file: PathBuf,

    /// Code block name, for markdown notes
    #[arg(long)]
    pub name: Option<String>,

    /// Wrap the module for requireAsync instead of require
    #[arg(long = "async")]
    pub wrap_async: bool,
}

impl TransformCommand {
    pub fn run(&self, config: &TransformConfig) -> Result<()> {
        let path = self.file.to_string_lossy().replace('\\', "/");
        let source = std::fs::read_to_string(&self.file)?;

        let (code, module_path) = if path.to_lowercase().ends_with(".md") {
            let query_path = match &self.name {
                Some(name) => format!("{path}?codeScriptName={name}"),
                None => path.clone(),
            };
            let script = extract_code_script(&source, &query_path)?;
            let module_path = code_script_module_path(&path, script.name.as_deref());
            (script.code, module_path)
        } else {
            (source, path)
        };

        let source_url = to_resource_url(DEFAULT_RESOURCE_URL_PREFIX, &module_path);
        let output = transform(
            &TransformRequest {
                code: &code,
                path: &module_path,
                source_url: &source_url,
                wrap_in_async_function: self.wrap_async,
                context_keys: ModuleContext::KEYS,
            },
            config,
        )?;

        if output.has_top_level_await && !self.wrap_async {
            tracing::warn!(path = %module_path, "module uses top-level await and needs requireAsync");
        }
        println!("{}", output.code);
        Ok(())
    }
}
