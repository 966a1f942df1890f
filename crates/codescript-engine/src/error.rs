//! Error types for codescript-engine

use std::sync::Arc;

use codescript_runtime::TransformError;
use thiserror::Error;

/// Suggested replacement for a synchronous `require` that cannot complete.
pub const SYNC_REQUIRE_ADVICE: &str = "consider using

const module = await requireAsync(id);

or

await requireAsyncWrapper((require) => {
  const module = require(id);
});";

/// Errors raised while resolving, loading or evaluating a module
#[derive(Debug, Error)]
pub enum RequireError {
    /// Identifier could not be resolved to a module
    #[error("{0}")]
    Resolution(String),

    /// No file exists for the resolved path or any extension candidate
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A synchronous require needs I/O the platform can only do asynchronously
    #[error("{message}\n{}", capitalize(SYNC_REQUIRE_ADVICE))]
    UnsupportedSyncLoad { message: String },

    /// Source could not be transformed
    #[error("Failed to transform code from: {path}")]
    Transform {
        path: String,
        #[source]
        source: TransformError,
    },

    /// Module uses top-level await but was required synchronously
    #[error("Cannot load module: {path}.\nTop-level await is not supported in sync require.\n{}", capitalize(SYNC_REQUIRE_ADVICE))]
    TopLevelSuspend { path: String },

    /// Loading a module failed; `source` holds the underlying cause
    #[error("Failed to load module: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<RequireError>,
    },

    /// Value is not one of the accepted enumeration members
    #[error("Unknown {kind}: {value}")]
    UnknownEnumValue { kind: &'static str, value: String },

    /// Filesystem error
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP error while fetching a URL module
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid JSON module or manifest
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Evaluation of a compiled module failed
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Capability missing on the current platform
    #[error("{0}")]
    Platform(String),

    /// Error recorded earlier and replayed to another caller
    #[error(transparent)]
    Shared(Arc<RequireError>),
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl RequireError {
    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create an error for a load that cannot complete synchronously
    pub fn unsupported_sync(msg: impl Into<String>) -> Self {
        Self::UnsupportedSyncLoad { message: msg.into() }
    }

    /// Create a platform capability error
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Create an evaluation error
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failure while loading `path`
    pub fn load_failed(path: impl Into<String>, source: RequireError) -> Self {
        Self::LoadFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Innermost error, following load wrappers and shared replays
    pub fn root_cause(&self) -> &RequireError {
        match self {
            Self::LoadFailed { source, .. } => source.root_cause(),
            Self::Shared(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for RequireError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Result type using RequireError
pub type RequireResult<T> = Result<T, RequireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_advice_is_capitalized() {
        let err = RequireError::unsupported_sync("Cannot require 'https://x' synchronously.");
        let message = err.to_string();
        assert!(message.starts_with("Cannot require 'https://x' synchronously.\nConsider using"));
        assert!(message.contains("await requireAsync(id)"));
    }

    #[test]
    fn test_root_cause() {
        let err = RequireError::load_failed(
            "/a.ts",
            RequireError::Shared(Arc::new(RequireError::FileNotFound("/b.ts".into()))),
        );
        assert!(matches!(err.root_cause(), RequireError::FileNotFound(_)));
    }
}
