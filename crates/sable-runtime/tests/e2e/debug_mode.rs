//! The debug-mode compile switch: spill-everything vs. optimized locals.

use crate::harness::*;
use sable_runtime::{DebugCommand, Runtime, RuntimeOptions};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const SCRIPT: &str = "\
function test(a, b) {
  var x = 10;
  var y = 20;
  let z = 30;
  const w = 40;
  debugger;
  return x + y + z + w + a + b;
}
var result = test(1, 2);
result;
";

/// Run SCRIPT and capture the innermost frame's heap-resident bindings.
fn run_and_capture(debug_mode: bool) -> (i32, HashMap<String, sable_runtime::Value>) {
    let mut rt = Runtime::with_options(RuntimeOptions {
        enable_debug_mode: debug_mode,
    });
    assert_eq!(rt.is_debug_mode(), debug_mode);
    let debugger = rt.enable_debugger();

    let captured: Rc<RefCell<HashMap<String, sable_runtime::Value>>> =
        Rc::new(RefCell::new(HashMap::new()));
    let sink = captured.clone();
    debugger.set_handler(move |state| {
        let frame = &state.call_stack[0];
        let locals = frame.local_variables();
        *sink.borrow_mut() = locals.into_iter().collect();
        DebugCommand::Continue
    });

    let result = rt.eval(SCRIPT).expect("script runs");
    let result = result.as_i32().expect("numeric result");
    let captured = captured.borrow().clone();
    (result, captured)
}

#[test]
fn debug_mode_materializes_every_declared_name() {
    let (result, locals) = run_and_capture(true);
    assert_eq!(result, 103);

    let expected: &[(&str, i32)] = &[
        ("a", 1),
        ("b", 2),
        ("x", 10),
        ("y", 20),
        ("z", 30),
        ("w", 40),
    ];
    for (name, value) in expected {
        let found = locals
            .get(*name)
            .unwrap_or_else(|| panic!("{} not found in heap environment", name));
        expect_i32(found, *value);
    }
    assert_eq!(locals.len(), expected.len());
}

#[test]
fn without_debug_mode_locals_stay_on_the_stack() {
    let (result, locals) = run_and_capture(false);
    // Same observable result...
    assert_eq!(result, 103);
    // ...but the bindings were optimized out of the heap environment.
    assert!(
        locals.len() < 6,
        "expected stack-optimized locals, found {:?}",
        locals.keys().collect::<Vec<_>>()
    );
}

#[test]
fn captured_bindings_are_present_even_without_debug_mode() {
    let source = "\
function outer() {
  var captured = \"kept\";
  var plain = \"optimized\";
  function inner() {
    var innerVar = captured + \"!\";
    debugger;
    return innerVar;
  }
  return inner();
}
outer();
";
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let captured: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = captured.clone();
    debugger.set_handler(move |state| {
        // Frame 1 is `outer`: only the name that escapes into the closure
        // survives in its heap environment.
        let outer_locals = state.call_stack[1].local_variables();
        *sink.borrow_mut() = outer_locals.keys().cloned().collect();
        DebugCommand::Continue
    });

    rt.eval(source).expect("script runs");

    let names = captured.borrow();
    assert!(names.iter().any(|n| n == "captured"));
    assert!(
        !names.iter().any(|n| n == "plain"),
        "uncaptured binding must stay stack-only: {:?}",
        names
    );
}

#[test]
fn debug_mode_keeps_closure_locals_visible() {
    let source = "\
function outer() {
  var captured = \"I am captured\";
  var notCaptured = \"I am not captured\";
  function inner() {
    var innerVar = captured + \" in closure\";
    debugger;
    return innerVar;
  }
  return inner();
}
outer();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let found: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = found.clone();
    debugger.set_handler(move |state| {
        let locals = state.call_stack[0].local_variables();
        *sink.borrow_mut() = locals.keys().cloned().collect();
        DebugCommand::Continue
    });

    rt.eval(source).expect("script runs");

    assert!(found.borrow().iter().any(|n| n == "innerVar"));
}

#[test]
fn debug_mode_exposes_arguments() {
    let source = "\
function test(arg1, arg2, arg3) {
  debugger;
  return arg1 + arg2 + arg3;
}
test(1, 2, 3);
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let args: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = args.clone();
    debugger.set_handler(move |state| {
        let frame = &state.call_stack[0];
        *sink.borrow_mut() = frame
            .arguments()
            .iter()
            .filter_map(|v| v.as_i32())
            .collect();
        // The spilled parameters are also in the heap environment.
        let locals = frame.local_variables();
        assert!(locals.contains_key("arg1"));
        assert!(locals.contains_key("arg2"));
        assert!(locals.contains_key("arg3"));
        DebugCommand::Continue
    });

    rt.eval(source).expect("script runs");
    assert_eq!(*args.borrow(), vec![1, 2, 3]);
}

#[test]
fn debug_mode_and_plain_mode_agree_on_results() {
    let source = "\
function fibonacci(n) {
  if (n <= 1) { return n; }
  var a = 0;
  var b = 1;
  var temp = 0;
  for (var i = 2; i <= n; i = i + 1) {
    temp = a + b;
    a = b;
    b = temp;
  }
  return b;
}
fibonacci(10);
";
    let mut debug = debug_runtime();
    let mut plain = plain_runtime();
    let a = debug.eval(source).expect("debug-mode run");
    let b = plain.eval(source).expect("plain run");
    assert_eq!(a.as_i32(), b.as_i32());
    assert_eq!(a.as_i32(), Some(55));
}

#[test]
fn declarations_materialize_only_after_execution() {
    // A pause before a declaration executes sees the binding as undefined
    // (the slot exists, its declaration has not run yet).
    let source = "\
function f() {
  debugger;
  var late = 7;
  return late;
}
f();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let seen: Rc<RefCell<Option<bool>>> = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    debugger.set_handler(move |state| {
        let locals = state.call_stack[0].local_variables();
        *sink.borrow_mut() = locals.get("late").map(|v| v.is_undefined());
        DebugCommand::Continue
    });

    rt.eval(source).expect("script runs");
    assert_eq!(*seen.borrow(), Some(true), "slot present, value undefined");
}
