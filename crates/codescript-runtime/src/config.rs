//! Transform configuration.

use swc_ecma_ast::EsVersion;

/// Controls how module source is transformed before evaluation.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Target ECMAScript version for output.
    /// Default: ES2022
    pub target: EsVersion,

    /// Enable decorator support.
    /// Default: true
    pub decorators: bool,

    /// Append an inline source map to the generated code.
    /// Default: true
    pub source_maps: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            target: EsVersion::Es2022,
            decorators: true,
            source_maps: true,
        }
    }
}

impl TransformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target ECMAScript version.
    pub fn target(mut self, target: EsVersion) -> Self {
        self.target = target;
        self
    }

    /// Enable or disable decorator support.
    pub fn decorators(mut self, enabled: bool) -> Self {
        self.decorators = enabled;
        self
    }

    /// Enable or disable the inline source map.
    pub fn source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }
}
