//! VM module: values, objects, environments, and the dispatch loop.

pub mod frame;
pub mod interp;
pub mod object;
pub mod stash;
pub mod value;

pub use frame::StackFrame;
pub use interp::Vm;
pub use object::{FuncKind, NativeFn, Object};
pub use value::Value;

/// Errors raised during execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
    /// An operation was applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    TypeError(String),
    /// An unresolved identifier was read.
    #[error("ReferenceError: {0} is not defined")]
    ReferenceError(String),
    /// The call stack exceeded its depth limit.
    #[error("stack overflow")]
    StackOverflow,
    /// The instruction stream was malformed (compiler bug).
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),
    /// Any other runtime failure.
    #[error("{0}")]
    RuntimeError(String),
}
