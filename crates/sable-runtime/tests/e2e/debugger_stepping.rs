//! Stepping: line discipline, call transparency, callee entry, step-out.

use crate::harness::*;
use sable_runtime::DebugCommand;

/// Run a script with a handler that records every pause and answers with a
/// fixed command.
fn run_with_command(source: &str, cmd: DebugCommand) -> Vec<PauseEvent> {
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        cmd
    });

    rt.run_script("step.sbl", source).expect("script runs");
    let out = events.borrow().clone();
    out
}

#[test]
fn step_over_straight_line_pauses_once_per_line() {
    let events = run_with_command(
        "debugger;\nvar a = 1;\nvar b = 2;\nvar c = a + b;\n",
        DebugCommand::StepOver,
    );

    let lines: Vec<u32> = events.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 2, 3, 4], "one pause per line, increasing");
}

#[test]
fn step_over_treats_calls_as_atomic() {
    let source = "\
function callee() {
  var t = 1;
  return t;
}
debugger;
var r = callee();
var s = 2;
";
    let events = run_with_command(source, DebugCommand::StepOver);
    let lines: Vec<u32> = events.iter().map(|e| e.line).collect();

    assert_eq!(lines, vec![5, 6, 7], "callee internals invisible");
    assert!(events.iter().all(|e| e.depth == 1));
}

#[test]
fn step_into_reaches_callee_first_positioned_instruction() {
    let source = "\
function callee() {
  var t = 1;
  return t;
}
debugger;
callee();
";
    let events = run_with_command(source, DebugCommand::StepInto);

    // The callee's body must surface, starting with its first line, and
    // every pause inside it carries a valid source position.
    let inside: Vec<&PauseEvent> = events.iter().filter(|e| e.depth == 2).collect();
    assert!(!inside.is_empty(), "step-into entered the callee");
    assert_eq!(inside[0].line, 2, "first callee pause is its first line");
    assert!(inside.iter().all(|e| e.line > 0), "no line-0 ghost events");
    assert!(inside.iter().all(|e| e.func_name == "callee"));
}

#[test]
fn step_into_enters_closure_held_in_a_local() {
    let source = "\
function outer() {
  var fn = function() {
    var v = 1;
    return v;
  };
  debugger;
  fn();
}
outer();
";
    let events = run_with_command(source, DebugCommand::StepInto);

    let inside: Vec<&PauseEvent> = events.iter().filter(|e| e.depth == 3).collect();
    assert!(
        inside.iter().any(|e| e.line == 3),
        "stepping reached the closure body: {:?}",
        events
    );
}

#[test]
fn step_out_returns_to_caller() {
    let source = "\
function f() {
  var a = 1;
  debugger;
  var b = 2;
  return a + b;
}
f();
var after = 1;
";
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        let first = sink.borrow().is_empty();
        sink.borrow_mut().push(record(state));
        if first {
            DebugCommand::StepOut
        } else {
            DebugCommand::Continue
        }
    });

    rt.run_script("stepout.sbl", source).expect("script runs");

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].line, 3);
    assert_eq!(events[0].depth, 2);
    // Back at the call site, one frame up, before the next statement runs.
    assert_eq!(events[1].line, 7);
    assert_eq!(events[1].depth, 1);
}

#[test]
fn step_over_inside_callee_pauses_on_return_edge() {
    let source = "\
function f() {
  debugger;
  return 1;
}
f();
var after = 2;
";
    let events = run_with_command(source, DebugCommand::StepOver);
    let lines: Vec<u32> = events.iter().map(|e| e.line).collect();

    // Line 2 (directive), line 3, then the returning edge back on line 5,
    // then line 6.
    assert_eq!(lines, vec![2, 3, 5, 6]);
    assert_eq!(events[2].depth, 1, "returning edge pauses in the caller");
}

#[test]
fn step_over_skips_lines_not_executed() {
    let source = "\
debugger;
var x = 10;
if (x > 100) {
  var dead = 1;
}
var tail = 2;
";
    let events = run_with_command(source, DebugCommand::StepOver);
    let lines: Vec<u32> = events.iter().map(|e| e.line).collect();
    assert!(
        !lines.contains(&4),
        "untaken branch must not surface: {:?}",
        lines
    );
    assert!(lines.contains(&6));
}

#[test]
fn set_step_mode_arms_pause_at_first_instruction() {
    let mut rt = debug_runtime();
    let debugger = rt.enable_debugger();

    let events = event_log();
    let sink = events.clone();
    debugger.set_handler(move |state| {
        sink.borrow_mut().push(record(state));
        DebugCommand::Continue
    });
    debugger.set_step_mode(true);

    rt.run_script("arm.sbl", "var a = 1;\nvar b = 2;\n")
        .expect("script runs");

    let events = events.borrow();
    assert!(!events.is_empty());
    assert_eq!(events[0].line, 1);
}
