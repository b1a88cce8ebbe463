//! Pause snapshots.
//!
//! When the predicate fires, the VM builds a [`DebuggerState`]: the paused
//! position, the captured call stack, and a parallel list of debug frames
//! whose scopes carry lazy reference handles. The snapshot is a value
//! object; the handler may hold it until it returns.

use crate::debug::breakpoint::BreakpointInfo;
use crate::debug::shared::{DebugShared, PauseReason};
use crate::source::Position;
use crate::vm::{StackFrame, Value, Vm};

/// Scope names exposed to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Local,
    Closure,
    Global,
}

impl ScopeKind {
    /// The wire-shape name of the scope.
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Local => "Local",
            ScopeKind::Closure => "Closure",
            ScopeKind::Global => "Global",
        }
    }
}

/// A scope descriptor inside a snapshot. Immutable once returned; the
/// reference handle stays valid until the next resume.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Reference handle; negative values are lazy (resolved on first use),
    /// positive values are registry-backed.
    pub variables_ref: i32,
    /// Hint that enumeration may be large (the global scope).
    pub expensive: bool,
}

/// The discriminator string attached to every materialized variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
    Date,
    Regexp,
    Error,
    Unknown,
}

impl TypeTag {
    /// The wire-shape tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Undefined => "undefined",
            TypeTag::Null => "null",
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::Function => "function",
            TypeTag::Date => "date",
            TypeTag::Regexp => "regexp",
            TypeTag::Error => "error",
            TypeTag::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a value for the handler. Numeric variants collapse to "number";
/// object flavors are recognized by the object's internal class name.
pub fn type_tag(value: &Value) -> TypeTag {
    match value {
        Value::Undefined => TypeTag::Undefined,
        Value::Null => TypeTag::Null,
        Value::Bool(_) => TypeTag::Boolean,
        Value::Int(_) | Value::Float(_) => TypeTag::Number,
        Value::Str(_) => TypeTag::String,
        Value::Object(o) => match o.borrow().class_name() {
            "Array" => TypeTag::Array,
            "Function" => TypeTag::Function,
            "Date" => TypeTag::Date,
            "RegExp" => TypeTag::Regexp,
            "Error" => TypeTag::Error,
            _ => TypeTag::Object,
        },
    }
}

/// A materialized binding or property.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub type_tag: TypeTag,
    /// Handle for browsing a composite value's children; 0 for leaves.
    pub variables_ref: i32,
}

/// A call-stack frame extended with its scope list and `this`.
#[derive(Debug, Clone)]
pub struct DebugStackFrame {
    pub frame: StackFrame,
    pub scopes: Vec<Scope>,
    pub this: Option<Variable>,
}

/// Everything the handler sees at a pause.
#[derive(Clone)]
pub struct DebuggerState {
    /// Program counter of the instruction about to execute.
    pub pc: usize,
    /// Source position of that instruction (line 0 when unknown).
    pub source_pos: Position,
    /// Call stack, innermost first.
    pub call_stack: Vec<StackFrame>,
    /// Debug frames paralleling `call_stack`.
    pub debug_stack: Vec<DebugStackFrame>,
    /// The breakpoint covering the current PC, if an enabled one exists.
    pub breakpoint: Option<BreakpointInfo>,
    /// True when the stepping machine is armed.
    pub step_mode: bool,
    /// True when the innermost context is a native callout.
    pub in_native_call: bool,
    /// Name of the native function being executed ("" outside natives).
    pub native_function_name: String,
}

impl std::fmt::Debug for DebuggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerState")
            .field("pc", &self.pc)
            .field("source_pos", &self.source_pos)
            .field("frames", &self.call_stack.len())
            .field("breakpoint", &self.breakpoint.as_ref().map(|bp| bp.id))
            .field("step_mode", &self.step_mode)
            .field("in_native_call", &self.in_native_call)
            .finish()
    }
}

/// Encode the lazy handle of a frame scope: `-(frame*10 + kind)`,
/// kind 1 = Local, 2 = Global.
pub(crate) fn lazy_scope_ref(frame: usize, kind: ScopeKind) -> i32 {
    let kind = match kind {
        ScopeKind::Local => 1,
        ScopeKind::Global => 2,
        ScopeKind::Closure => 3,
    };
    -((frame as i32) * 10 + kind)
}

/// Decode a lazy handle back into `(frame, kind)`.
pub(crate) fn decode_lazy_ref(reference: i32) -> Option<(usize, ScopeKind)> {
    if reference >= 0 {
        return None;
    }
    let abs = -(reference as i64);
    let kind = match abs % 10 {
        1 => ScopeKind::Local,
        2 => ScopeKind::Global,
        _ => return None,
    };
    Some(((abs / 10) as usize, kind))
}

/// Build the snapshot for the current pause.
pub(crate) fn build(vm: &Vm, shared: &DebugShared, reason: &PauseReason) -> DebuggerState {
    let in_native_call = vm.ctx.prg.is_none();
    let native_function_name = if in_native_call {
        native_function_name(vm)
    } else {
        String::new()
    };

    let pc = vm.ctx.pc;
    let source_pos = match &vm.ctx.prg {
        Some(prg) => prg.position(pc),
        None => Position::default(),
    };

    let call_stack = vm.capture_call_stack();
    let debug_stack = build_debug_stack(&call_stack);

    let (breakpoint, step_mode) = {
        let state = shared.state.read();
        let breakpoint = match reason {
            PauseReason::Breakpoint(id) => state.breakpoints.info(*id),
            _ => vm
                .ctx
                .prg
                .as_ref()
                .and_then(|prg| state.breakpoints.lookup(prg.id, pc as u32))
                .and_then(|id| state.breakpoints.info(id)),
        };
        (breakpoint, state.step.is_active())
    };

    DebuggerState {
        pc,
        source_pos,
        call_stack,
        debug_stack,
        breakpoint,
        step_mode,
        in_native_call,
        native_function_name,
    }
}

/// Build the debug-frame list: every frame gets a lazy Local scope; only
/// frame 0 carries the Global scope, since the global environment is the
/// same for all frames.
fn build_debug_stack(call_stack: &[StackFrame]) -> Vec<DebugStackFrame> {
    call_stack
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let mut scopes = vec![Scope {
                kind: ScopeKind::Local,
                variables_ref: lazy_scope_ref(i, ScopeKind::Local),
                expensive: false,
            }];
            if i == 0 {
                scopes.push(Scope {
                    kind: ScopeKind::Global,
                    variables_ref: lazy_scope_ref(i, ScopeKind::Global),
                    expensive: true,
                });
            }
            let this = match frame.this_value() {
                Value::Undefined => None,
                value => Some(Variable {
                    name: "this".to_string(),
                    value: value.clone(),
                    type_tag: type_tag(value),
                    variables_ref: 0,
                }),
            };
            DebugStackFrame {
                frame: frame.clone(),
                scopes,
                this,
            }
        })
        .collect()
}

/// Derive the display name of the native function at the expected stack
/// base. The callee object sits at `sb - 1`; its own `name` property is the
/// source of truth. Host-internal closure names collapse to the literal
/// token "native"; a missing property yields the sentinel `"<native>"`.
fn native_function_name(vm: &Vm) -> String {
    let sb = vm.ctx.sb;
    if sb == 0 {
        return "<native>".to_string();
    }
    let callee = match vm.stack.get(sb - 1) {
        Some(Value::Object(o)) => o.clone(),
        _ => return "<native>".to_string(),
    };
    let name = callee.borrow().get("name");
    match name {
        Some(Value::Str(s)) if !s.is_empty() => {
            if s.contains("{{closure}}") || s.contains("::{{") {
                return "native".to_string();
            }
            match s.rfind('.') {
                Some(i) if i + 1 < s.len() => s[i + 1..].to_string(),
                _ => s.to_string(),
            }
        }
        _ => "<native>".to_string(),
    }
}
