//! Runtime error types.

use sable_engine::compiler::CompileError;
use sable_engine::vm::VmError;

/// Errors that can occur during compilation or execution.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Lexing, parsing, or bytecode compilation error
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// VM execution error
    #[error("Runtime error: {0}")]
    Vm(#[from] VmError),
}
