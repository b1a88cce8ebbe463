//! Sable Runtime
//!
//! The primary API for compiling, executing, and debugging Sable code.
//!
//! # Example
//!
//! ```rust,ignore
//! use sable_runtime::{Runtime, RuntimeOptions};
//!
//! // Evaluate inline code
//! let mut rt = Runtime::new();
//! let value = rt.eval("1 + 2;")?;
//!
//! // Debug-mode runtime with a pause handler
//! let mut rt = Runtime::with_options(RuntimeOptions {
//!     enable_debug_mode: true,
//! });
//! let debugger = rt.enable_debugger();
//! debugger.set_handler(|state| {
//!     println!("paused at {}", state.source_pos);
//!     sable_runtime::DebugCommand::Continue
//! });
//! rt.eval("var x = 1; debugger; x = 2;")?;
//! ```

pub mod error;

// Re-export the engine types hosts interact with.
pub use sable_engine::debug::{
    type_tag, BreakpointInfo, DebugCommand, Debugger, DebuggerState, DebugStackFrame, EvalError,
    PauseHandle, Scope, ScopeKind, TypeTag, Variable,
};
pub use sable_engine::source::Position;
pub use sable_engine::vm::{Object, StackFrame, Value};

pub use error::RuntimeError;

use sable_engine::compiler::Compiler;
use sable_engine::source::SourceFile;
use sable_engine::vm::{Vm, VmError};
use std::sync::Arc;

// ────────────────────────────────────────────────────────────────────────────

/// Configuration for the Sable runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Compile every script with the debug-mode contract: all named
    /// bindings are spilled to heap environments so the debugger can
    /// materialize them at any pause point. Costs the stack-locals fast
    /// path for simple functions.
    pub enable_debug_mode: bool,
}

// ────────────────────────────────────────────────────────────────────────────

/// The Sable runtime — compiles and executes Sable code on one VM.
///
/// Scripts evaluated through one runtime share a global object; a debugger
/// obtained from [`Runtime::enable_debugger`] stays bound to this runtime
/// for its lifetime.
pub struct Runtime {
    options: RuntimeOptions,
    vm: Vm,
    debugger: Option<Debugger>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with default options.
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create a runtime with custom options.
    pub fn with_options(options: RuntimeOptions) -> Self {
        let vm = Vm::with_debug_mode(options.enable_debug_mode);
        Self {
            options,
            vm,
            debugger: None,
        }
    }

    /// Access the runtime options.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Whether scripts compile with the debug-mode contract.
    pub fn is_debug_mode(&self) -> bool {
        self.options.enable_debug_mode
    }

    // ── Execution ────────────────────────────────────────────────────────

    /// Compile and execute a source string under the name `"<eval>"`.
    /// Returns the script's completion value.
    pub fn eval(&mut self, source: &str) -> Result<Value, RuntimeError> {
        self.run_script("<eval>", source)
    }

    /// Compile and execute a named script. Breakpoints address scripts by
    /// this name.
    pub fn run_script(&mut self, name: &str, source: &str) -> Result<Value, RuntimeError> {
        tracing::debug!(
            name,
            bytes = source.len(),
            debug_mode = self.options.enable_debug_mode,
            "compiling script"
        );
        let src = Arc::new(SourceFile::new(name, source));
        let program = Compiler::compile(src, self.options.enable_debug_mode)?;
        Ok(self.vm.run_program(program)?)
    }

    // ── Debugging ────────────────────────────────────────────────────────

    /// Attach (or fetch) the debugger bound to this runtime.
    pub fn enable_debugger(&mut self) -> Debugger {
        let debugger = Debugger::attach(&mut self.vm);
        self.debugger = Some(debugger.clone());
        debugger
    }

    // ── Host values ──────────────────────────────────────────────────────

    /// Define a property of the global object.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.vm.set_global(name, value);
    }

    /// Read a property of the global object (`undefined` when absent).
    pub fn get_global(&self, name: &str) -> Value {
        self.vm.get_global(name)
    }

    /// Create a fresh empty object value.
    pub fn new_object(&self) -> Value {
        Value::object(Object::plain())
    }

    /// Wrap a Rust closure as a callable Sable value.
    pub fn new_native_function(
        &self,
        name: &str,
        f: impl Fn(&Value, &[Value]) -> Result<Value, VmError> + 'static,
    ) -> Value {
        Value::native_function(name, f)
    }
}
