//! The `console` binding handed to scripts.
//!
//! Messages go to a process-wide handler, which defaults to `tracing`
//! events under the `codescript` target. A console can also capture its
//! entries, for hosts that render script output next to the script.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::value::ModuleExports;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Debug,
    Warn,
    Error,
}

type ConsoleHandler = dyn Fn(ConsoleLevel, &str, &str) + Send + Sync + 'static;

static CONSOLE_HANDLER: OnceLock<Mutex<Arc<ConsoleHandler>>> = OnceLock::new();

/// Replace the handler every script console writes to. It receives the
/// level, the script path and the message.
pub fn set_console_handler(handler: impl Fn(ConsoleLevel, &str, &str) + Send + Sync + 'static) {
    let lock = CONSOLE_HANDLER.get_or_init(|| Mutex::new(Arc::new(default_console_handler)));
    *lock.lock() = Arc::new(handler);
}

fn default_console_handler(level: ConsoleLevel, script: &str, message: &str) {
    match level {
        ConsoleLevel::Log | ConsoleLevel::Info => info!(target: "codescript", script, "{}", message),
        ConsoleLevel::Debug => debug!(target: "codescript", script, "{}", message),
        ConsoleLevel::Warn => warn!(target: "codescript", script, "{}", message),
        ConsoleLevel::Error => error!(target: "codescript", script, "{}", message),
    }
}

fn dispatch_console(level: ConsoleLevel, script: &str, message: &str) {
    let lock = CONSOLE_HANDLER.get_or_init(|| Mutex::new(Arc::new(default_console_handler)));
    let handler = lock.lock().clone();
    handler(level, script, message);
}

/// Captured console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}

/// Console scoped to one script.
#[derive(Clone)]
pub struct ScriptConsole {
    script: Arc<str>,
    captured: Option<Arc<Mutex<Vec<ConsoleEntry>>>>,
}

impl ScriptConsole {
    pub fn new(script: impl Into<Arc<str>>) -> Self {
        Self {
            script: script.into(),
            captured: None,
        }
    }

    /// Also keep every message, readable through [`ScriptConsole::entries`].
    pub fn capturing(mut self) -> Self {
        self.captured = Some(Arc::default());
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.captured
            .as_ref()
            .map(|entries| entries.lock().clone())
            .unwrap_or_default()
    }

    pub fn write(&self, level: ConsoleLevel, message: &str) {
        dispatch_console(level, &self.script, message);
        if let Some(captured) = &self.captured {
            captured.lock().push(ConsoleEntry {
                level,
                message: message.to_string(),
            });
        }
    }

    /// Write values the way `console.log(a, b)` joins its arguments.
    pub fn write_values(&self, level: ConsoleLevel, values: &[ModuleExports]) {
        let message = values.iter().map(format_value).collect::<Vec<_>>().join(" ");
        self.write(level, &message);
    }

    pub fn log(&self, message: &str) {
        self.write(ConsoleLevel::Log, message);
    }

    pub fn info(&self, message: &str) {
        self.write(ConsoleLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.write(ConsoleLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.write(ConsoleLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.write(ConsoleLevel::Error, message);
    }
}

/// Strings print bare, JSON prints compact, the rest by kind.
pub fn format_value(value: &ModuleExports) -> String {
    match value.resolve() {
        ModuleExports::Empty => "undefined".to_string(),
        ModuleExports::Json(json) => match json.as_ref() {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        },
        ModuleExports::Object(object) => format!("{{{}}}", object.keys().join(", ")),
        ModuleExports::Function(f) => format!("[Function: {}]", f.name()),
        ModuleExports::Host(_) => "[object]".to_string(),
        ModuleExports::Pending(pending) => format!("[Loading: {}]", pending.id()),
    }
}
