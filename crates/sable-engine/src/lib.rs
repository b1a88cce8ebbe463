//! Sable Language Engine
//!
//! This crate provides the complete Sable language implementation:
//! - **Parser**: Lexer and recursive-descent parser (`parser` module)
//! - **Compiler**: Scope resolution and bytecode generation (`compiler` module)
//! - **VM**: Single-threaded stack interpreter and runtime objects (`vm` module)
//! - **Debugger**: Breakpoints, stepping, and state inspection (`debug` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use sable_engine::{compiler::Compiler, source::SourceFile, vm::Vm};
//! use std::sync::Arc;
//!
//! let src = Arc::new(SourceFile::new("demo.sbl", "var x = 1; x + 2;"));
//! let program = Compiler::compile(src, false)?;
//!
//! let mut vm = Vm::new();
//! let result = vm.run_program(program)?;
//! ```

#![warn(rust_2018_idioms)]

/// Source text bookkeeping: files, byte offsets, and positions
pub mod source;

/// Parser module: tokens, lexer, AST, and parser
pub mod parser;

/// Compiler module: capture analysis, instruction set, and code generation
pub mod compiler;

/// VM module: values, objects, environments, and the dispatch loop
pub mod vm;

/// Debugger module: breakpoints, stepping, snapshots, and inspection
pub mod debug;

pub use compiler::{CompileError, Compiler, Instr, Program};
pub use debug::{
    type_tag, BreakpointInfo, DebugCommand, Debugger, DebuggerState, DebugStackFrame, EvalError,
    PauseHandle, Scope, ScopeKind, TypeTag, Variable,
};
pub use parser::{LexError, ParseError};
pub use source::{Position, SourceFile};
pub use vm::{StackFrame, Value, Vm, VmError};
