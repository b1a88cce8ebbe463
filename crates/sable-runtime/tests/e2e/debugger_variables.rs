//! Variable materialization: scopes, reference handles, type tags.

use crate::harness::*;
use sable_runtime::{DebugCommand, ScopeKind, TypeTag, Variable};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Captured = Rc<RefCell<Option<HashMap<String, Variable>>>>;

#[test]
fn locals_materialize_with_values_and_tags() {
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

    let locals: Captured = Rc::new(RefCell::new(None));
    let nested: Captured = Rc::new(RefCell::new(None));
    let locals_sink = locals.clone();
    let nested_sink = nested.clone();

    debugger.set_handler(move |state| {
        let frame = &state.debug_stack[0];
        let local_scope = frame
            .scopes
            .iter()
            .find(|s| s.kind == ScopeKind::Local)
            .expect("local scope present");
        let vars = by_name(dbg.get_variables(local_scope.variables_ref));

        // Browse the object child through its reference handle.
        if let Some(o) = vars.get("o") {
            assert!(o.variables_ref != 0, "'o' carries a child handle");
            *nested_sink.borrow_mut() = Some(by_name(dbg.get_variables(o.variables_ref)));
        }
        *locals_sink.borrow_mut() = Some(vars);
        DebugCommand::Continue
    });

    rt.run_script("vars.sbl", source).expect("script runs");

    let locals = locals.borrow();
    let locals = locals.as_ref().expect("handler captured locals");

    let x = &locals["x"];
    assert_eq!(x.type_tag, TypeTag::Number);
    expect_i32(&x.value, 10);

    let y = &locals["y"];
    expect_i32(&y.value, 20);

    let a = &locals["a"];
    assert_eq!(a.type_tag, TypeTag::Number);
    expect_i32(&a.value, 30);

    let s = &locals["s"];
    assert_eq!(s.type_tag, TypeTag::String);
    expect_string(&s.value, "hello");

    let o = &locals["o"];
    assert_eq!(o.type_tag, TypeTag::Object);

    let nested = nested.borrow();
    let nested = nested.as_ref().expect("object children materialized");
    expect_i32(&nested["a"].value, 1);
    assert_eq!(nested["b"].type_tag, TypeTag::String);
    expect_string(&nested["b"].value, "test");
}

#[test]
fn arrays_tag_and_expand() {
    let source = "\
function f() {
  var arr = [1, 2, 3];
  debugger;
  return arr;
}
f();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let captured: Captured = Rc::new(RefCell::new(None));
    let sink = captured.clone();
    debugger.set_handler(move |state| {
        let scope = &state.debug_stack[0].scopes[0];
        let vars = by_name(dbg.get_variables(scope.variables_ref));
        let arr = &vars["arr"];
        assert_eq!(arr.type_tag, TypeTag::Array);
        assert!(arr.variables_ref != 0);
        *sink.borrow_mut() = Some(by_name(dbg.get_variables(arr.variables_ref)));
        DebugCommand::Continue
    });

    rt.run_script("arr.sbl", source).expect("script runs");

    let elements = captured.borrow();
    let elements = elements.as_ref().expect("array children materialized");
    expect_i32(&elements["0"].value, 1);
    expect_i32(&elements["1"].value, 2);
    expect_i32(&elements["2"].value, 3);
}

#[test]
fn global_scope_enumerates_global_object() {
    let source = "\
var g1 = 42;
var g2 = \"g\";
var gO = {p: \"v\"};
function t() {
  debugger;
}
t();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let captured: Captured = Rc::new(RefCell::new(None));
    let sink = captured.clone();
    debugger.set_handler(move |state| {
        let frame = &state.debug_stack[0];
        let global_scope = frame
            .scopes
            .iter()
            .find(|s| s.kind == ScopeKind::Global)
            .expect("frame 0 has a global scope");
        assert!(global_scope.expensive);
        *sink.borrow_mut() = Some(by_name(dbg.get_variables(global_scope.variables_ref)));
        DebugCommand::Continue
    });

    rt.run_script("globals.sbl", source).expect("script runs");

    let globals = captured.borrow();
    let globals = globals.as_ref().expect("globals materialized");

    assert_eq!(globals["g1"].type_tag, TypeTag::Number);
    expect_i32(&globals["g1"].value, 42);
    assert_eq!(globals["g2"].type_tag, TypeTag::String);
    assert_eq!(globals["gO"].type_tag, TypeTag::Object);
    assert_eq!(globals["t"].type_tag, TypeTag::Function);
}

#[test]
fn nested_frames_isolate_locals() {
    let source = "\
function outer() {
  var ov = \"outer\";
  function inner() {
    var iv = \"inner\";
    debugger;
  }
  inner();
}
outer();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let checked = Rc::new(RefCell::new(false));
    let sink = checked.clone();
    debugger.set_handler(move |state| {
        assert!(state.debug_stack.len() >= 3, "inner, outer, script");

        let inner_locals = by_name(dbg.get_variables(state.debug_stack[0].scopes[0].variables_ref));
        assert!(inner_locals.contains_key("iv"));
        assert!(!inner_locals.contains_key("ov"), "outer var not in inner scope");

        let outer_locals = by_name(dbg.get_variables(state.debug_stack[1].scopes[0].variables_ref));
        assert!(outer_locals.contains_key("ov"));
        assert!(!outer_locals.contains_key("iv"));

        // Only frame 0 carries the global scope.
        assert!(state.debug_stack[0]
            .scopes
            .iter()
            .any(|s| s.kind == ScopeKind::Global));
        assert!(!state.debug_stack[1]
            .scopes
            .iter()
            .any(|s| s.kind == ScopeKind::Global));

        *sink.borrow_mut() = true;
        DebugCommand::Continue
    });

    rt.run_script("nested.sbl", source).expect("script runs");
    assert!(*checked.borrow(), "handler ran its assertions");
}

#[test]
fn lazy_scope_resolution_is_idempotent() {
    let source = "\
function f(a) {
  var b = a * 2;
  debugger;
  return b;
}
f(3);
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let checked = Rc::new(RefCell::new(false));
    let sink = checked.clone();
    debugger.set_handler(move |state| {
        let reference = state.debug_stack[0].scopes[0].variables_ref;
        assert!(reference < 0, "snapshot scopes use lazy handles");

        let mut first: Vec<String> = dbg
            .get_variables(reference)
            .into_iter()
            .map(|v| v.name)
            .collect();
        let mut second: Vec<String> = dbg
            .get_variables(reference)
            .into_iter()
            .map(|v| v.name)
            .collect();
        first.sort();
        second.sort();
        assert_eq!(first, second);
        assert_eq!(first, vec!["a".to_string(), "b".to_string()]);

        *sink.borrow_mut() = true;
        DebugCommand::Continue
    });

    rt.run_script("idem.sbl", source).expect("script runs");
    assert!(*checked.borrow());
}

#[test]
fn get_scopes_offers_registry_backed_handles() {
    let source = "\
var globalX = 100;
function t() {
  var localY = 1;
  debugger;
  return localY;
}
t();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let checked = Rc::new(RefCell::new(false));
    let sink = checked.clone();
    debugger.set_handler(move |_state| {
        let scopes = dbg.get_scopes(0);
        assert_eq!(scopes.len(), 2);
        assert!(scopes.iter().all(|s| s.variables_ref >= 1000));

        for scope in &scopes {
            let vars = by_name(dbg.get_variables(scope.variables_ref));
            match scope.kind {
                ScopeKind::Local => assert!(vars.contains_key("localY")),
                ScopeKind::Global => assert!(vars.contains_key("globalX")),
                ScopeKind::Closure => {}
            }
        }

        *sink.borrow_mut() = true;
        DebugCommand::Continue
    });

    rt.run_script("scopes.sbl", source).expect("script runs");
    assert!(*checked.borrow());
}

#[test]
fn unknown_and_stale_handles_return_empty() {
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let stale_ref = Rc::new(RefCell::new(0i32));
    let stale_sink = stale_ref.clone();
    debugger.set_handler(move |state| {
        // Unknown positive, zero, and malformed negative handles are empty.
        assert!(dbg.get_variables(0).is_empty());
        assert!(dbg.get_variables(999_999).is_empty());
        assert!(dbg.get_variables(-7).is_empty());
        *stale_sink.borrow_mut() = state.debug_stack[0].scopes[0].variables_ref;
        DebugCommand::Continue
    });

    rt.eval("function f() { var a = 1; debugger; } f();")
        .expect("script runs");

    // After resume the pause-scoped handle goes stale: empty, not a crash.
    let reference = *stale_ref.borrow();
    assert!(reference != 0);
    assert!(debugger.get_variables(reference).is_empty());
}

#[test]
fn this_variable_is_reported_for_member_calls() {
    let source = "\
var o = {
  m: function() {
    debugger;
    return 1;
  }
};
o.m();
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let seen = Rc::new(RefCell::new(None::<TypeTag>));
    let sink = seen.clone();
    debugger.set_handler(move |state| {
        *sink.borrow_mut() = state.debug_stack[0].this.as_ref().map(|t| t.type_tag);
        DebugCommand::Continue
    });

    rt.run_script("this.sbl", source).expect("script runs");
    assert_eq!(*seen.borrow(), Some(TypeTag::Object));
}
