//! Compiler module: capture analysis, instruction set, and code generation.

pub mod analysis;
pub mod codegen;
pub mod instr;
pub mod program;

pub use codegen::{CompileError, Compiler};
pub use instr::Instr;
pub use program::Program;
