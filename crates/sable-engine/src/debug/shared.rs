//! Shared debugger state and the pause protocol.
//!
//! One [`DebugShared`] is attached to a VM for the lifetime of its runtime.
//! The mutable debugger state (breakpoints, stepping machine, reference
//! registry) sits behind a single read/write lock: the per-instruction pause
//! predicate takes the read lock, mutating API calls take the write lock.
//! Hit counts and the pause-request flag are atomics so the predicate never
//! needs the write lock.
//!
//! A pause runs inline on the VM thread: predicate fires, the snapshot is
//! built, the handler is invoked, and its command re-arms the stepping
//! machine before the instruction executes.

use crate::compiler::Program;
use crate::debug::breakpoint::BreakpointTable;
use crate::debug::refs::RefRegistry;
use crate::debug::snapshot::{self, DebuggerState};
use crate::debug::step::StepMode;
use crate::debug::DebugCommand;
use crate::vm::{Object, StackFrame, Vm};
use parking_lot::RwLock;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why the predicate decided to pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseReason {
    /// An enabled breakpoint covers the current PC.
    Breakpoint(u32),
    /// The in-source `debugger;` directive.
    DebuggerStatement,
    /// A host thread requested a pause at the next opportunity.
    AsyncPause,
    /// The stepping machine fired.
    Step,
}

/// Debugger state behind the single reader/writer lock.
pub(crate) struct DebugState {
    pub(crate) breakpoints: BreakpointTable,
    pub(crate) step: StepMode,
    pub(crate) refs: RefRegistry,
}

/// State shared between the VM's dispatch loop and the `Debugger` handle.
pub(crate) struct DebugShared {
    pub(crate) state: RwLock<DebugState>,
    /// Pause-at-next-opportunity flag; the only field another thread may
    /// touch while the VM runs.
    pub(crate) pause_requested: Arc<AtomicBool>,
    /// Host pause callback.
    pub(crate) handler: RefCell<Option<Rc<dyn Fn(&DebuggerState) -> DebugCommand>>>,
    /// Re-entrancy guard: a handler must not trigger a nested pause.
    in_pause: Cell<bool>,
    /// The runtime's global object, for global-scope enumeration and the
    /// expression evaluator.
    pub(crate) globals: Rc<RefCell<Object>>,
    /// The runtime's debug-mode compile switch.
    pub(crate) debug_mode: bool,
    /// Root program of the last installed script, for breakpoint resolution.
    pub(crate) program: RefCell<Option<Rc<Program>>>,
    /// Call stack captured at the current pause; cleared on resume so stale
    /// handles resolve to empty results.
    pub(crate) paused_frames: RefCell<Vec<StackFrame>>,
    /// Depth and line of the most recent pause, baselines for out-of-band
    /// step commands.
    pub(crate) last_pause_depth: Cell<usize>,
    pub(crate) last_pause_line: Cell<u32>,
    /// Native-context probes, valid while paused.
    pub(crate) in_native: Cell<bool>,
    pub(crate) native_name: RefCell<String>,
}

impl DebugShared {
    pub(crate) fn new(globals: Rc<RefCell<Object>>, debug_mode: bool) -> Self {
        Self {
            state: RwLock::new(DebugState {
                breakpoints: BreakpointTable::new(),
                step: StepMode::Running,
                refs: RefRegistry::new(),
            }),
            pause_requested: Arc::new(AtomicBool::new(false)),
            handler: RefCell::new(None),
            in_pause: Cell::new(false),
            globals,
            debug_mode,
            program: RefCell::new(None),
            paused_frames: RefCell::new(Vec::new()),
            last_pause_depth: Cell::new(0),
            last_pause_line: Cell::new(0),
            in_native: Cell::new(false),
            native_name: RefCell::new(String::new()),
        }
    }

    /// Record a freshly compiled program and (re)resolve breakpoints
    /// against it. A recompiled script gets fresh program ids, so resolved
    /// breakpoints move along with it.
    pub(crate) fn install_program(&self, prg: &Rc<Program>) {
        *self.program.borrow_mut() = Some(prg.clone());
        self.state.write().breakpoints.resolve_all(prg);
    }

    // ── The pause protocol ───────────────────────────────────────────────

    /// Per-instruction hook (also called once at native-callout entry).
    pub(crate) fn check_and_pause(&self, vm: &mut Vm) {
        if let Some(reason) = self.predicate(vm) {
            self.run_pause(vm, reason);
        }
    }

    /// The `debugger;` directive: unconditionally enter the pause path.
    pub(crate) fn pause_directive(&self, vm: &mut Vm) {
        self.run_pause(vm, PauseReason::DebuggerStatement);
    }

    /// The pause predicate. Read-mostly: shared lock, atomic side effects
    /// only (hit counts).
    fn predicate(&self, vm: &Vm) -> Option<PauseReason> {
        if self.in_pause.get() {
            return None;
        }
        let state = self.state.read();
        match vm.ctx.prg.as_ref() {
            // Native callout: no instructions execute here, so only an
            // async pause request or an armed step-into surfaces an event.
            // Step-over and step-out stay quiet (their depth rules treat
            // the callout as a callee).
            None => {
                if self.pause_requested.load(Ordering::Acquire) {
                    return Some(PauseReason::AsyncPause);
                }
                if matches!(state.step, StepMode::StepInto) {
                    return Some(PauseReason::Step);
                }
                None
            }
            Some(prg) => {
                let pc = vm.ctx.pc;

                // Deferred step-into: don't pause on the call instruction
                // itself; step mode stays armed, and the callee's first
                // positioned instruction (or the native-entry check above)
                // surfaces the event the user expects. Applies to every
                // call-shaped instruction.
                if matches!(state.step, StepMode::StepInto)
                    && prg.code.get(pc).map_or(false, |i| i.is_call())
                {
                    return None;
                }

                if self.pause_requested.load(Ordering::Acquire) {
                    return Some(PauseReason::AsyncPause);
                }

                if let Some(id) = state.breakpoints.check_hit(prg.id, pc as u32) {
                    return Some(PauseReason::Breakpoint(id));
                }

                if state.step.is_active() {
                    let depth = vm.depth();
                    let line = prg.line(pc);
                    if state.step.should_pause(depth, line) {
                        return Some(PauseReason::Step);
                    }
                }
                None
            }
        }
    }

    /// The pause ceremony: snapshot, handler, command dispatch.
    fn run_pause(&self, vm: &mut Vm, reason: PauseReason) {
        if self.in_pause.get() {
            return;
        }
        self.pause_requested.store(false, Ordering::Release);

        let state_snapshot = snapshot::build(vm, self, &reason);
        tracing::trace!(
            ?reason,
            line = state_snapshot.source_pos.line,
            pc = state_snapshot.pc,
            depth = state_snapshot.call_stack.len(),
            "paused"
        );

        *self.paused_frames.borrow_mut() = state_snapshot.call_stack.clone();
        self.last_pause_depth.set(vm.depth());
        self.last_pause_line.set(state_snapshot.source_pos.line);
        self.in_native.set(state_snapshot.in_native_call);
        *self.native_name.borrow_mut() = state_snapshot.native_function_name.clone();

        // Update the step baseline to the paused line before the handler
        // runs, so a continued step-over measures line changes from here.
        if state_snapshot.source_pos.line > 0 {
            let mut st = self.state.write();
            if let StepMode::StepOver { last_line, .. } = &mut st.step {
                *last_line = Some(state_snapshot.source_pos.line);
            }
        }

        let handler = self.handler.borrow().clone();
        let cmd = match handler {
            Some(h) => {
                self.in_pause.set(true);
                let result =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| h(&state_snapshot)));
                self.in_pause.set(false);
                match result {
                    Ok(cmd) => cmd,
                    Err(_) => {
                        tracing::warn!("debug handler panicked; treating as continue");
                        DebugCommand::Continue
                    }
                }
            }
            None => {
                tracing::trace!("no debug handler registered; auto-continue");
                DebugCommand::Continue
            }
        };
        tracing::trace!(?cmd, "handler returned");

        self.apply_command(cmd, vm.depth(), state_snapshot.source_pos.line);
        self.end_pause();
    }

    /// Re-arm the stepping machine for a command. `depth` and `line` are
    /// the baselines in force when the command takes effect.
    pub(crate) fn apply_command(&self, cmd: DebugCommand, depth: usize, line: u32) {
        let mut st = self.state.write();
        st.step = match cmd {
            // `Pause` returned from the handler is reserved for resume
            // protocols that can park the VM; inline pausing treats it as
            // Continue.
            DebugCommand::Continue | DebugCommand::Pause => StepMode::Running,
            DebugCommand::StepInto => StepMode::StepInto,
            DebugCommand::StepOver => StepMode::StepOver {
                depth,
                last_line: if line > 0 { Some(line) } else { None },
            },
            DebugCommand::StepOut => StepMode::StepOut { depth },
        };
    }

    /// Resume bookkeeping: reference handles and the captured stack are
    /// pause-scoped.
    fn end_pause(&self) {
        self.state.write().refs.clear();
        self.paused_frames.borrow_mut().clear();
        self.in_native.set(false);
        self.native_name.borrow_mut().clear();
    }
}
