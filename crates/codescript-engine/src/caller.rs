//! Locating the module that issued a `require` call.
//!
//! When a require carries no explicit parent path, the caller is recovered
//! from a captured stack trace. Frames look like
//! `    at fn (path:line:column)`.

use std::sync::{Arc, LazyLock};

use regex::Regex;

static STACK_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {4}at .+? \((?<ParentPath>.+?):\d+:\d+\)$").expect("valid regex")
});

/// Frame, counted from the top of a captured stack, of the code calling
/// `require`.
pub const DEFAULT_CALLER_FRAME: usize = 4;

/// Finds the path of the code currently calling `require`.
pub trait CallerLocator: Send + Sync {
    fn caller_path(&self) -> Option<String>;
}

/// Extract the caller path from frame `frame` of `stack`.
///
/// Frames without a file location (`<anonymous>`) give `None`.
pub fn parse_caller_from_stack(stack: &str, frame: usize) -> Option<String> {
    let line = stack.lines().nth(frame)?;
    let captures = STACK_FRAME.captures(line.trim_end_matches('\r'))?;
    let path = captures.name("ParentPath")?.as_str();
    if path.contains("<anonymous>") {
        return None;
    }
    Some(path.to_string())
}

type StackCapture = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// [`CallerLocator`] that parses a stack trace captured by the host.
#[derive(Clone)]
pub struct StackTraceLocator {
    capture: StackCapture,
    frame: usize,
}

impl StackTraceLocator {
    pub fn new<F>(capture: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self {
            capture: Arc::new(capture),
            frame: DEFAULT_CALLER_FRAME,
        }
    }

    pub fn frame(mut self, frame: usize) -> Self {
        self.frame = frame;
        self
    }
}

impl CallerLocator for StackTraceLocator {
    fn caller_path(&self) -> Option<String> {
        let stack = (self.capture)()?;
        parse_caller_from_stack(&stack, self.frame)
    }
}
