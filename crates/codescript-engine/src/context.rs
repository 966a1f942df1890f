//! Bindings a module body can see.
//!
//! The struct and the ordered key list come from one macro invocation, so
//! the wrapper's parameter list always matches what the evaluator is given.

use crate::console::ScriptConsole;
use crate::require::{AsyncWrapperBinding, ChildRequire};
use crate::value::{ExportsObject, HostValue, ModuleExports, ModuleRecord};

macro_rules! module_context {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $($(#[$fmeta:meta])* $field:ident : $ty:ty => $key:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            $($(#[$fmeta])* pub $field: $ty),+
        }

        impl $name {
            /// Binding names, in wrapper parameter order.
            pub const KEYS: &'static [&'static str] = &[$($key),+];

            /// Field name of each binding, paired with its key.
            pub const FIELDS: &'static [(&'static str, &'static str)] = &[$((stringify!($field), $key)),+];
        }
    };
}

module_context! {
    /// Values bound to the parameters of a module's wrapper function.
    pub struct ModuleContext {
        /// Host application handle.
        app: ModuleExports => "app",
        console: ScriptConsole => "console",
        /// Element code blocks render into. `None` for modules.
        container: Option<HostValue> => "container",
        exports: ExportsObject => "exports",
        module: ModuleRecord => "module",
        require: ChildRequire => "require",
        require_async: ChildRequire => "requireAsync",
        require_async_wrapper: AsyncWrapperBinding => "requireAsyncWrapper",
        /// Empty for URL modules.
        dirname: String => "__dirname",
        filename: String => "__filename",
    }
}
