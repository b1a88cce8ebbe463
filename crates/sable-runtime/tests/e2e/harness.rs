//! Test harness for debugger end-to-end tests.
//!
//! Provides runtime builders, a pause-event recorder, and a host `console`
//! object backed by a Rust closure.

use sable_runtime::{DebuggerState, Runtime, RuntimeOptions, Value, Variable};
use std::cell::RefCell;
use std::rc::Rc;

/// One recorded pause event.
#[derive(Debug, Clone)]
pub struct PauseEvent {
    pub line: u32,
    pub pc: usize,
    pub depth: usize,
    pub in_native: bool,
    pub native_name: String,
    /// Function name of the innermost frame ("" for the top-level script).
    pub func_name: String,
    pub breakpoint_id: Option<u32>,
    pub step_mode: bool,
}

/// Capture the interesting parts of a snapshot.
pub fn record(state: &DebuggerState) -> PauseEvent {
    PauseEvent {
        line: state.source_pos.line,
        pc: state.pc,
        depth: state.call_stack.len(),
        in_native: state.in_native_call,
        native_name: state.native_function_name.clone(),
        func_name: state
            .call_stack
            .first()
            .map(|f| f.func_name().to_string())
            .unwrap_or_default(),
        breakpoint_id: state.breakpoint.as_ref().map(|bp| bp.id),
        step_mode: state.step_mode,
    }
}

/// A shared event log for handler closures.
pub type EventLog = Rc<RefCell<Vec<PauseEvent>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Runtime with the debug-mode compile switch on.
pub fn debug_runtime() -> Runtime {
    Runtime::with_options(RuntimeOptions {
        enable_debug_mode: true,
    })
}

/// Runtime with default options.
pub fn plain_runtime() -> Runtime {
    Runtime::new()
}

/// Install a `console` object whose `log` collects rendered arguments.
pub fn install_console(rt: &mut Runtime) -> Rc<RefCell<Vec<String>>> {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let console = rt.new_object();
    if let Some(obj) = console.as_object() {
        obj.borrow_mut().set(
            "log",
            Value::native_function("log", move |_, args| {
                let rendered: Vec<String> = args.iter().map(|v| v.to_display()).collect();
                sink.borrow_mut().push(rendered.join(" "));
                Ok(Value::Undefined)
            }),
        );
    }
    rt.set_global("console", console);
    log
}

/// Index materialized variables by name.
pub fn by_name(vars: Vec<Variable>) -> std::collections::HashMap<String, Variable> {
    vars.into_iter().map(|v| (v.name.clone(), v)).collect()
}

/// Assert a value holds a specific i32.
pub fn expect_i32(value: &Value, expected: i32) {
    match value.as_i32() {
        Some(actual) => assert_eq!(actual, expected),
        None => panic!("expected {} (i32), got {:?}", expected, value),
    }
}

/// Assert a value holds a specific number, int or float.
pub fn expect_number(value: &Value, expected: f64) {
    match value.as_number() {
        Some(actual) => assert!(
            (actual - expected).abs() < 1e-10,
            "expected {}, got {}",
            expected,
            actual
        ),
        None => panic!("expected {} (number), got {:?}", expected, value),
    }
}

/// Assert a value holds a specific string.
pub fn expect_string(value: &Value, expected: &str) {
    match value.as_str() {
        Some(actual) => assert_eq!(actual, expected),
        None => panic!("expected {:?} (string), got {:?}", expected, value),
    }
}
