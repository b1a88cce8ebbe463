//! Basic pause-and-resume behavior.

use crate::harness::*;
use sable_runtime::DebugCommand;
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn pause_directive_fires_once_and_execution_completes() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        DebugCommand::Continue
    });

    rt.run_script("s1.sbl", "var x = 10;\ndebugger;\nx = 20;\n")
        .expect("script runs");

    let events = events.borrow();
    assert_eq!(events.len(), 1, "exactly one pause");
    assert_eq!(events[0].line, 2);
    assert_eq!(events[0].depth, 1, "top-level script frame");
    expect_i32(&rt.get_global("x"), 20);
}

#[test]
fn no_handler_auto_continues() {
    let mut rt = plain_runtime();
    let _debugger = rt.enable_debugger();

    // No handler registered: the pause directive must not wedge execution.
    rt.eval("var x = 1;\ndebugger;\nx = 2;\n").expect("script runs");
    expect_i32(&rt.get_global("x"), 2);
}

#[test]
fn handler_returning_continue_is_observationally_inert() {
    let source = r#"
        function fib(n) {
            if (n <= 1) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        fib(12);
    "#;

    let mut plain = plain_runtime();
    let expected = plain.eval(source).expect("plain run");

    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();
    debugger.set_handler(|_| DebugCommand::Continue);
    debugger.add_breakpoint("<eval>", 3, 1);
    let actual = rt.eval(source).expect("debugged run");

    assert_eq!(expected.as_i32(), actual.as_i32());
}

#[test]
fn step_mode_produces_step_events() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let steps = Rc::new(Cell::new(0u32));
    let counter = steps.clone();
    debugger.set_handler(move |_state| {
        counter.set(counter.get() + 1);
        if counter.get() > 10 {
            DebugCommand::Continue
        } else {
            DebugCommand::StepInto
        }
    });
    debugger.set_step_mode(true);

    rt.eval("var x = 10;\nvar y = 20;\nvar z = x + y;\nz;\n")
        .expect("script runs");

    assert!(steps.get() > 0, "no steps were executed");
}

#[test]
fn snapshot_reports_step_mode_flag() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        DebugCommand::Continue
    });
    debugger.set_step_mode(true);

    rt.eval("var a = 1;\n").expect("script runs");

    let events = events.borrow();
    assert!(!events.is_empty());
    assert!(events[0].step_mode, "stepping machine was armed");
}

#[test]
fn panicking_handler_is_treated_as_continue() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let calls = Rc::new(Cell::new(0u32));
    let counter = calls.clone();
    debugger.set_handler(move |_| {
        counter.set(counter.get() + 1);
        panic!("buggy host handler");
    });

    rt.eval("var x = 1;\ndebugger;\nx = 2;\n").expect("script still runs");
    assert_eq!(calls.get(), 1);
    expect_i32(&rt.get_global("x"), 2);
}

#[test]
fn pause_command_from_handler_behaves_like_continue() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        DebugCommand::Pause
    });

    rt.eval("var x = 1;\ndebugger;\nx = 2;\n").expect("script runs");
    assert_eq!(events.borrow().len(), 1);
    expect_i32(&rt.get_global("x"), 2);
}

#[test]
fn async_pause_request_pauses_at_next_opportunity() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        DebugCommand::Continue
    });

    debugger.pause();
    rt.eval("var a = 1;\nvar b = 2;\n").expect("script runs");

    let events = events.borrow();
    assert_eq!(events.len(), 1, "one pause for one request");
    assert_eq!(events[0].line, 1, "paused at the first opportunity");
}

#[test]
fn pause_handle_is_usable_from_another_thread() {
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        DebugCommand::Continue
    });

    let handle = debugger.pause_handle();
    let worker = std::thread::spawn(move || {
        handle.request_pause();
    });
    worker.join().expect("worker thread");

    rt.eval("var a = 1;\n").expect("script runs");
    assert_eq!(events.borrow().len(), 1);
}

#[test]
fn commands_from_handler_take_effect_on_next_instruction() {
    // A handler that keeps continuing after arming a breakpoint sees the
    // mutation on the following predicate evaluation, never retroactively.
    let mut rt = plain_runtime();
    let debugger = rt.enable_debugger();
    let dbg = debugger.clone();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        if state.source_pos.line == 2 {
            dbg.add_breakpoint("cmd.sbl", 4, 1);
        }
        DebugCommand::Continue
    });

    rt.run_script("cmd.sbl", "var a = 1;\ndebugger;\nvar b = 2;\nvar c = 3;\n")
        .expect("script runs");

    let lines: Vec<u32> = events.borrow().iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![2, 4]);
}
