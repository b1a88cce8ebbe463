//! The expression evaluator.
//!
//! Two paths: `evaluate` runs an expression as a fresh top-level script in
//! the global environment; `evaluate_in_frame` wraps the expression in a
//! constructed function that rebinds the frame's heap-resident names from a
//! carrier object, then runs the wrapper against the carrier as the global.
//!
//! Evaluator-driven execution runs on a detached sub-interpreter with no
//! debugger attached, so it can never re-enter the pause protocol.

use crate::compiler::{CompileError, Compiler};
use crate::debug::shared::DebugShared;
use crate::source::SourceFile;
use crate::vm::{Object, Value, Vm, VmError};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Errors surfaced by the evaluator.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The frame index is outside the paused call stack.
    #[error("invalid frame index: {0}")]
    InvalidFrameIndex(usize),
    /// There is no paused execution to evaluate against.
    #[error("no active execution context")]
    NoActiveExecution,
    /// The expression failed to parse or compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The expression raised a runtime error.
    #[error(transparent)]
    Runtime(#[from] VmError),
}

/// Run an expression as a new top-level script in the global environment.
///
/// Does not resolve frame locals; this is the quick global probe. The
/// result is the script's completion value.
pub(crate) fn evaluate(shared: &DebugShared, expression: &str) -> Result<Value, EvalError> {
    run_with_global(shared, shared.globals.clone(), expression, "<eval>")
}

/// Evaluate an expression in the semantic context of a paused frame.
///
/// The frame's heap-resident bindings are copied onto a carrier object as
/// `_name` properties; the constructed source re-declares each name from
/// the carrier and returns the user expression. Assignments inside the
/// expression do not propagate back into the paused frame.
pub(crate) fn evaluate_in_frame(
    shared: &DebugShared,
    expression: &str,
    frame_index: usize,
) -> Result<Value, EvalError> {
    let entries = {
        let frames = shared.paused_frames.borrow();
        if frames.is_empty() {
            return Err(EvalError::NoActiveExecution);
        }
        let frame = frames
            .get(frame_index)
            .ok_or(EvalError::InvalidFrameIndex(frame_index))?;
        match &frame.stash {
            Some(stash) => stash.borrow().entries(),
            None => Vec::new(),
        }
    };

    // No heap-resident bindings: the global environment is the frame's
    // context.
    if entries.is_empty() {
        return evaluate(shared, expression);
    }

    let carrier = Rc::new(RefCell::new(Object::plain()));
    {
        let mut carrier = carrier.borrow_mut();
        for (name, value) in &entries {
            carrier.set(&format!("_{}", name), value.clone());
        }
    }

    let mut source = String::from("(function() {\n");
    for (name, _) in &entries {
        source.push_str(&format!("var {} = this._{};\n", name, name));
    }
    source.push_str(&format!("return ({});\n}}).call(this)", expression));

    run_with_global(shared, carrier, &source, "<eval-frame>")
}

/// Compile and run a script on a detached interpreter whose global object
/// is `global`. Pausing cannot trigger: the sub-interpreter has no debugger.
fn run_with_global(
    shared: &DebugShared,
    global: Rc<RefCell<Object>>,
    source: &str,
    name: &str,
) -> Result<Value, EvalError> {
    let src = Arc::new(SourceFile::new(name, source));
    let prg = Compiler::compile(src, shared.debug_mode)?;
    let mut vm = Vm::with_global(global, shared.debug_mode);
    Ok(vm.run_program(prg)?)
}
