//! Call-stack frames as seen by the host and the debugger.

use crate::source::Position;
use crate::vm::stash::Stash;
use crate::vm::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// One captured call-stack entry, innermost first in a capture.
///
/// A frame owns cheap clones of everything the debugger inspects (the
/// activation's heap environment, argument values, and `this`), so it stays
/// meaningful for the duration of a pause without borrowing the VM.
#[derive(Clone)]
pub struct StackFrame {
    pub(crate) func_name: Rc<str>,
    pub(crate) src_name: Rc<str>,
    pub(crate) position: Position,
    pub(crate) stash: Option<Rc<RefCell<Stash>>>,
    pub(crate) args: Vec<Value>,
    pub(crate) this: Value,
    pub(crate) native: bool,
}

impl StackFrame {
    /// Function name ("" for the top-level script and anonymous functions).
    pub fn func_name(&self) -> &str {
        &self.func_name
    }

    /// Name of the source the frame's code came from.
    pub fn src_name(&self) -> &str {
        &self.src_name
    }

    /// Current source position of the frame.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// True for host-native frames (no compiled program).
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// The frame's named bindings, read from its heap environment.
    ///
    /// With debug mode on this is every declared name whose declaration has
    /// executed; without it, only bindings captured by nested functions are
    /// heap-resident and visible here. Frames without an environment (native
    /// calls) return an empty map.
    pub fn local_variables(&self) -> FxHashMap<String, Value> {
        let mut out = FxHashMap::default();
        if let Some(stash) = &self.stash {
            for (name, value) in stash.borrow().entries() {
                out.insert(name.to_string(), value);
            }
        }
        out
    }

    /// Positional argument values the frame was called with.
    pub fn arguments(&self) -> &[Value] {
        &self.args
    }

    /// The frame's `this` value.
    pub fn this_value(&self) -> &Value {
        &self.this
    }
}

impl std::fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            if self.func_name.is_empty() {
                "<script>"
            } else {
                &self.func_name
            },
            self.position
        )
    }
}
