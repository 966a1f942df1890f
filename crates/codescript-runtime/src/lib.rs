//! Source transforms for codescript modules.
//!
//! Everything here is pure: source text in, evaluable text out. Loading,
//! caching and evaluation live in `codescript-engine`.

mod commonjs;
pub mod config;
pub mod dynamic_import;
pub mod error;
pub mod markdown;
pub mod query;
pub mod require_args;
mod template;
pub mod transpiler;
mod wrapper;

pub use commonjs::has_top_level_await;
pub use config::TransformConfig;
pub use dynamic_import::REQUIRE_ASYNC_BINDING;
pub use error::{TransformError, TransformResult};
pub use markdown::{
    CODE_SCRIPT_BLOCK_LANGUAGE, CodeBlock, CodeScript, NoteSettings, code_blocks, code_script_module_path,
    extract_code_script, note_settings_from_content,
};
pub use query::{split_query, trim_query};
pub use require_args::{RequireArgs, extract_require_args};
pub use template::is_identifier;
pub use transpiler::{TransformOutput, TransformRequest, transform};
