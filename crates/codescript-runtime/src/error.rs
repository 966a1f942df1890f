//! Error types for codescript-runtime

use thiserror::Error;

/// Errors produced while turning module source into evaluable code
#[derive(Error, Debug)]
pub enum TransformError {
    /// Source could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// A transform stage rejected the input
    #[error("Transform error: {0}")]
    Transform(String),

    /// Code generation failed
    #[error("Codegen error: {0}")]
    Codegen(String),

    /// Source map could not be serialized
    #[error("Source map error: {0}")]
    SourceMap(String),

    /// Markdown note does not contain the requested code block
    #[error("{0}")]
    Markdown(String),

    /// Unsupported query on a markdown module path
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl TransformError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for transform operations
pub type TransformResult<T> = Result<T, TransformError>;
