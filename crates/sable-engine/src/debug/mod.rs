//! Debugger module: breakpoints, stepping, snapshots, and inspection.
//!
//! The [`Debugger`] is the host-facing control surface, bound to exactly one
//! VM. Execution pauses cooperatively: the VM's dispatch loop consults the
//! pause predicate between instructions and, on a hit, invokes the
//! registered handler inline with a [`DebuggerState`] snapshot. The command
//! the handler returns arms the stepping machine for the next instructions.

pub mod breakpoint;
pub mod eval;
pub(crate) mod refs;
pub(crate) mod shared;
pub mod snapshot;
pub(crate) mod step;
pub(crate) mod variables;

pub use breakpoint::BreakpointInfo;
pub use eval::EvalError;
pub use snapshot::{DebugStackFrame, DebuggerState, Scope, ScopeKind, TypeTag, Variable};
pub use snapshot::type_tag;

use crate::debug::shared::DebugShared;
use crate::debug::step::StepMode;
use crate::source::Position;
use crate::vm::{Value, Vm};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Commands a handler (or out-of-band caller) can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    /// Run until the next breakpoint or pause request.
    Continue,
    /// Run to the next source line, treating calls as atomic.
    StepOver,
    /// Run to the next instruction with a source position, entering callees.
    StepInto,
    /// Run until the current function returns.
    StepOut,
    /// Remain paused. In the inline pause model this is a no-op and is
    /// treated as Continue.
    Pause,
}

/// A `Send + Sync` handle for requesting a pause from another thread —
/// the only cross-thread entry point into a running debugger.
#[derive(Clone)]
pub struct PauseHandle {
    flag: Arc<AtomicBool>,
}

impl PauseHandle {
    /// Ask the VM to pause at the next opportunity.
    pub fn request_pause(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// Interactive debugger bound to one VM.
///
/// Cheap to clone; all clones share the same state. Breakpoints survive
/// across runs within one debugger; reference handles are valid for a
/// single pause.
#[derive(Clone)]
pub struct Debugger {
    shared: Rc<DebugShared>,
}

impl Debugger {
    /// Attach a debugger to a VM (idempotent: a second attach returns a
    /// handle to the same debugger).
    pub fn attach(vm: &mut Vm) -> Debugger {
        if let Some(shared) = &vm.debug {
            return Debugger {
                shared: shared.clone(),
            };
        }
        let shared = Rc::new(DebugShared::new(vm.global_object(), vm.debug_mode()));
        vm.debug = Some(shared.clone());
        tracing::debug!(debug_mode = vm.debug_mode(), "debugger attached");
        Debugger { shared }
    }

    /// Register the pause callback. Must be set before any pause is wanted;
    /// without a handler the VM auto-continues.
    pub fn set_handler(&self, handler: impl Fn(&DebuggerState) -> DebugCommand + 'static) {
        *self.shared.handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Remove the pause callback.
    pub fn clear_handler(&self) {
        *self.shared.handler.borrow_mut() = None;
    }

    // ── Breakpoints ──────────────────────────────────────────────────────

    /// Add a breakpoint at a source position. The column is advisory;
    /// resolution matches on (filename, line). Returns the breakpoint id.
    pub fn add_breakpoint(&self, filename: &str, line: u32, column: u32) -> u32 {
        let pos = Position {
            filename: Rc::from(filename),
            line,
            column,
        };
        let program = self.shared.program.borrow().clone();
        self.shared
            .state
            .write()
            .breakpoints
            .add(pos, program.as_ref())
    }

    /// Remove a breakpoint. False for unknown ids.
    pub fn remove_breakpoint(&self, id: u32) -> bool {
        self.shared.state.write().breakpoints.remove(id)
    }

    /// Enable or disable a breakpoint. Does not reset its hit count.
    /// False for unknown ids.
    pub fn enable_breakpoint(&self, id: u32, enabled: bool) -> bool {
        self.shared.state.write().breakpoints.set_enabled(id, enabled)
    }

    /// Snapshot copies of all breakpoints.
    pub fn breakpoints(&self) -> Vec<BreakpointInfo> {
        self.shared.state.read().breakpoints.list()
    }

    /// Retry resolution of unresolved breakpoints against the installed
    /// program. Runs automatically whenever a script is (re)compiled.
    pub fn resolve_pending_breakpoints(&self) {
        if let Some(prg) = self.shared.program.borrow().clone() {
            self.shared.state.write().breakpoints.resolve_pending(&prg);
        }
    }

    // ── Execution control ────────────────────────────────────────────────

    /// Arm or disarm stepping out-of-band. Arming defaults to step-into on
    /// the next eligible instruction.
    pub fn set_step_mode(&self, enabled: bool) {
        let mut st = self.shared.state.write();
        st.step = if enabled {
            StepMode::StepInto
        } else {
            StepMode::Running
        };
    }

    /// Post a Continue (used when controlling the debugger out-of-band).
    pub fn resume(&self) {
        self.apply(DebugCommand::Continue);
    }

    /// Post a StepOver for the next pause-eligible instruction.
    pub fn step_over(&self) {
        self.apply(DebugCommand::StepOver);
    }

    /// Post a StepInto.
    pub fn step_into(&self) {
        self.apply(DebugCommand::StepInto);
    }

    /// Post a StepOut.
    pub fn step_out(&self) {
        self.apply(DebugCommand::StepOut);
    }

    fn apply(&self, cmd: DebugCommand) {
        self.shared.apply_command(
            cmd,
            self.shared.last_pause_depth.get(),
            self.shared.last_pause_line.get(),
        );
    }

    /// Request a pause at the next opportunity (same effect as
    /// [`PauseHandle::request_pause`]).
    pub fn pause(&self) {
        self.shared.pause_requested.store(true, Ordering::Release);
    }

    /// A thread-safe handle for asynchronous pause requests.
    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle {
            flag: self.shared.pause_requested.clone(),
        }
    }

    // ── Probes (valid while paused) ──────────────────────────────────────

    /// True while paused inside a native callout.
    pub fn is_in_native_call(&self) -> bool {
        self.shared.in_native.get()
    }

    /// Name of the native function being executed, or "" outside one.
    pub fn native_function_name(&self) -> String {
        self.shared.native_name.borrow().clone()
    }

    /// Whether wire-protocol adapters should surface step events inside
    /// native calls. Fixed false: native-internal events confuse users.
    pub fn should_step_in_native_call(&self) -> bool {
        false
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Eagerly allocate registry-backed scope descriptors for a paused
    /// frame: the alternate path to the snapshot's lazy handles. Returns an
    /// empty list when the frame index is out of range or nothing is paused.
    pub fn get_scopes(&self, frame_id: usize) -> Vec<Scope> {
        if frame_id >= self.shared.paused_frames.borrow().len() {
            return Vec::new();
        }
        let mut st = self.shared.state.write();
        vec![
            Scope {
                kind: ScopeKind::Local,
                variables_ref: st.refs.alloc(refs::RefEntry::Scope {
                    frame: frame_id,
                    kind: ScopeKind::Local,
                }),
                expensive: false,
            },
            Scope {
                kind: ScopeKind::Global,
                variables_ref: st.refs.alloc(refs::RefEntry::Scope {
                    frame: frame_id,
                    kind: ScopeKind::Global,
                }),
                expensive: true,
            },
        ]
    }

    /// Materialize the variables behind a reference handle (lazy scope
    /// handles, registry scopes, or object references). Unknown handles
    /// return an empty list.
    pub fn get_variables(&self, reference: i32) -> Vec<Variable> {
        variables::get_variables(&self.shared, reference)
    }

    /// Run an expression as a new top-level script in the global
    /// environment. The frame argument is accepted for interface parity and
    /// ignored; use [`Debugger::evaluate_in_frame`] for frame context.
    pub fn evaluate(&self, expression: &str, _frame_id: usize) -> Result<Value, EvalError> {
        eval::evaluate(&self.shared, expression)
    }

    /// Evaluate an expression with a paused frame's heap-resident bindings
    /// in scope.
    pub fn evaluate_in_frame(
        &self,
        expression: &str,
        frame_index: usize,
    ) -> Result<Value, EvalError> {
        eval::evaluate_in_frame(&self.shared, expression, frame_index)
    }
}
