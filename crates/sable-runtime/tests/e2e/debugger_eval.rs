//! Expression evaluation at a pause.

use crate::harness::*;
use sable_runtime::{DebugCommand, EvalError, Value};
use std::cell::RefCell;
use std::rc::Rc;

type Slot = Rc<RefCell<Option<Result<Value, EvalError>>>>;

fn slot() -> Slot {
    Rc::new(RefCell::new(None))
}

#[test]
fn evaluate_in_frame_sees_parameters_and_locals() {
    let source = "\
function f(x, y) {
  var a = x + y;
  var s = \"hello\";
  var o = {a: 1, b: \"test\"};
  debugger;
  return a;
}
f(10, 20);
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let result = slot();
    let sink = result.clone();
    debugger.set_handler(move |_state| {
        *sink.borrow_mut() = Some(dbg.evaluate_in_frame("x + y + a", 0));
        DebugCommand::Continue
    });

    rt.run_script("eval.sbl", source).expect("script runs");

    let result = result.borrow();
    let value = result
        .as_ref()
        .expect("handler evaluated")
        .as_ref()
        .expect("evaluation succeeded");
    expect_number(value, 60.0);
}

#[test]
fn evaluate_in_frame_reaches_outer_frames() {
    let source = "\
function outer() {
  var ov = 50;
  function inner() {
    var iv = 25;
    debugger;
    return iv;
  }
  return inner();
}
outer();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let inner_result = slot();
    let outer_result = slot();
    let inner_sink = inner_result.clone();
    let outer_sink = outer_result.clone();
    debugger.set_handler(move |_state| {
        *inner_sink.borrow_mut() = Some(dbg.evaluate_in_frame("iv * 2", 0));
        // Frame 1 is `outer`; its own bindings are in scope there.
        *outer_sink.borrow_mut() = Some(dbg.evaluate_in_frame("ov + 1", 1));
        DebugCommand::Continue
    });

    rt.run_script("frames.sbl", source).expect("script runs");

    let inner = inner_result.borrow();
    expect_number(
        inner.as_ref().unwrap().as_ref().expect("inner eval"),
        50.0,
    );
    let outer = outer_result.borrow();
    expect_number(
        outer.as_ref().unwrap().as_ref().expect("outer eval"),
        51.0,
    );
}

#[test]
fn evaluate_runs_in_global_environment() {
    let source = "\
var x = 10;
var y = 20;
function test() {
  var local = 30;
  debugger;
  return local;
}
test();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let result = slot();
    let sink = result.clone();
    debugger.set_handler(move |_state| {
        // The simplified path ignores its frame argument and runs against
        // the global object; frame locals are not visible.
        *sink.borrow_mut() = Some(dbg.evaluate("x + y", 0));
        DebugCommand::Continue
    });

    rt.run_script("geval.sbl", source).expect("script runs");

    let result = result.borrow();
    expect_number(result.as_ref().unwrap().as_ref().expect("eval"), 30.0);
}

#[test]
fn evaluate_errors_propagate() {
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let reference_err = slot();
    let parse_err = slot();
    let ref_sink = reference_err.clone();
    let parse_sink = parse_err.clone();
    debugger.set_handler(move |_state| {
        *ref_sink.borrow_mut() = Some(dbg.evaluate("definitely_missing + 1", 0));
        *parse_sink.borrow_mut() = Some(dbg.evaluate("1 +", 0));
        DebugCommand::Continue
    });

    rt.eval("debugger;").expect("script runs");

    let reference_err = reference_err.borrow();
    assert!(matches!(
        reference_err.as_ref().unwrap(),
        Err(EvalError::Runtime(_))
    ));
    let parse_err = parse_err.borrow();
    assert!(matches!(
        parse_err.as_ref().unwrap(),
        Err(EvalError::Compile(_))
    ));
}

#[test]
fn evaluate_in_frame_rejects_bad_frame_index() {
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let result = slot();
    let sink = result.clone();
    debugger.set_handler(move |_state| {
        *sink.borrow_mut() = Some(dbg.evaluate_in_frame("1", 99));
        DebugCommand::Continue
    });

    rt.eval("debugger;").expect("script runs");

    let result = result.borrow();
    assert!(matches!(
        result.as_ref().unwrap(),
        Err(EvalError::InvalidFrameIndex(99))
    ));
}

#[test]
fn evaluate_in_frame_outside_pause_has_no_context() {
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    rt.eval("var a = 1;").expect("script runs");

    assert!(matches!(
        debugger.evaluate_in_frame("a", 0),
        Err(EvalError::NoActiveExecution)
    ));
}

#[test]
fn evaluate_in_frame_does_not_write_back() {
    let source = "\
function f() {
  var n = 10;
  debugger;
  return n;
}
f();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let eval_result = slot();
    let sink = eval_result.clone();
    debugger.set_handler(move |_state| {
        *sink.borrow_mut() = Some(dbg.evaluate_in_frame("n = 99", 0));
        DebugCommand::Continue
    });

    let result = rt.run_script("wb.sbl", source).expect("script runs");

    // The assignment evaluated to 99 inside the wrapper...
    let eval_result = eval_result.borrow();
    expect_i32(eval_result.as_ref().unwrap().as_ref().expect("eval"), 99);
    // ...but the paused frame's binding was untouched.
    expect_i32(&result, 10);
}

#[test]
fn evaluate_in_frame_can_call_functions_on_the_carrier() {
    let source = "\
function f(x) {
  var double = function(n) { return n * 2; };
  debugger;
  return x;
}
f(21);
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let result = slot();
    let sink = result.clone();
    debugger.set_handler(move |_state| {
        *sink.borrow_mut() = Some(dbg.evaluate_in_frame("double(x)", 0));
        DebugCommand::Continue
    });

    rt.run_script("call.sbl", source).expect("script runs");

    let result = result.borrow();
    expect_number(result.as_ref().unwrap().as_ref().expect("eval"), 42.0);
}
