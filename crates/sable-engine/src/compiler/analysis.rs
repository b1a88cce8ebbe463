//! Capture analysis.
//!
//! Determines, for every function in a script, which of its declared names
//! are referenced by nested functions. Captured names must live in the heap
//! environment even outside debug mode; everything else may stay in
//! operand-stack slots.

use crate::parser::ast::{Expr, FuncLit, MemberKey, Script, Stmt};
use rustc_hash::FxHashSet;

/// Per-function captured-name sets, indexed by `FuncLit::id`.
pub struct Captures {
    sets: Vec<FxHashSet<String>>,
}

impl Captures {
    /// True if `name`, declared in function `func_id`, is captured by a
    /// nested function.
    pub fn is_captured(&self, func_id: usize, name: &str) -> bool {
        self.sets[func_id].contains(name)
    }
}

/// Run capture analysis over a parsed script.
pub fn analyze(script: &Script) -> Captures {
    let mut sets = vec![FxHashSet::default(); script.func_count];
    for stmt in &script.body {
        visit_stmt_funcs(stmt, &mut sets);
    }
    Captures { sets }
}

/// Visit the top-level statements, recursing into each function literal.
/// Free names escaping a top-level function resolve to globals and are
/// dropped here.
fn visit_stmt_funcs(stmt: &Stmt, sets: &mut Vec<FxHashSet<String>>) {
    match stmt {
        Stmt::Func(f) => {
            visit_func(f, sets);
        }
        Stmt::Decl { init: Some(e), .. } => visit_expr_funcs(e, sets),
        Stmt::Decl { init: None, .. } | Stmt::Debugger { .. } => {}
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                visit_expr_funcs(e, sets);
            }
        }
        Stmt::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            visit_expr_funcs(cond, sets);
            for s in then {
                visit_stmt_funcs(s, sets);
            }
            if let Some(body) = otherwise {
                for s in body {
                    visit_stmt_funcs(s, sets);
                }
            }
        }
        Stmt::While { cond, body, .. } => {
            visit_expr_funcs(cond, sets);
            for s in body {
                visit_stmt_funcs(s, sets);
            }
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
            ..
        } => {
            if let Some(s) = init {
                visit_stmt_funcs(s, sets);
            }
            if let Some(e) = cond {
                visit_expr_funcs(e, sets);
            }
            if let Some(e) = update {
                visit_expr_funcs(e, sets);
            }
            for s in body {
                visit_stmt_funcs(s, sets);
            }
        }
        Stmt::Block { body, .. } => {
            for s in body {
                visit_stmt_funcs(s, sets);
            }
        }
        Stmt::Expr { expr, .. } => visit_expr_funcs(expr, sets),
    }
}

fn visit_expr_funcs(expr: &Expr, sets: &mut Vec<FxHashSet<String>>) {
    match expr {
        Expr::Func(f) => {
            visit_func(f, sets);
        }
        Expr::Array(items, _) => {
            for e in items {
                visit_expr_funcs(e, sets);
            }
        }
        Expr::Object(props, _) => {
            for (_, e) in props {
                visit_expr_funcs(e, sets);
            }
        }
        Expr::Assign { target, value, .. } => {
            visit_expr_funcs(target, sets);
            visit_expr_funcs(value, sets);
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            visit_expr_funcs(lhs, sets);
            visit_expr_funcs(rhs, sets);
        }
        Expr::Unary { operand, .. } => visit_expr_funcs(operand, sets),
        Expr::Call { callee, args, .. } => {
            visit_expr_funcs(callee, sets);
            for e in args {
                visit_expr_funcs(e, sets);
            }
        }
        Expr::Member { object, key, .. } => {
            visit_expr_funcs(object, sets);
            if let MemberKey::Index(e) = key {
                visit_expr_funcs(e, sets);
            }
        }
        _ => {}
    }
}

/// Analyze one function. Returns its free names (referenced but not declared
/// locally), which the caller either marks as captured or propagates further
/// up.
fn visit_func(func: &FuncLit, sets: &mut Vec<FxHashSet<String>>) -> FxHashSet<String> {
    let mut declared: FxHashSet<String> = func.params.iter().cloned().collect();
    collect_declared(&func.body, &mut declared);

    let mut refs = FxHashSet::default();
    for stmt in &func.body {
        collect_refs_stmt(stmt, sets, &mut refs);
    }

    // Anything a nested function left free either belongs to us (captured)
    // or keeps bubbling up.
    let mut free = FxHashSet::default();
    for name in refs {
        if declared.contains(&name) {
            // Plain self-references don't force a capture; only names that
            // came back from a nested function do. Those were tagged below.
            continue;
        }
        free.insert(name);
    }

    // Second pass over nested functions: their free names that we declare
    // are captures of ours.
    let mut nested_free = FxHashSet::default();
    for stmt in &func.body {
        collect_nested_free(stmt, sets, &mut nested_free);
    }
    for name in nested_free {
        if declared.contains(&name) {
            sets[func.id].insert(name);
        } else {
            free.insert(name);
        }
    }

    free
}

/// Collect function-scoped declarations: params are handled by the caller;
/// this walks `var`/`let`/`const` and function declarations through nested
/// blocks (declarations are function-scoped in Sable).
fn collect_declared(stmts: &[Stmt], out: &mut FxHashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Decl { name, .. } => {
                out.insert(name.clone());
            }
            Stmt::Func(f) => {
                if let Some(name) = &f.name {
                    out.insert(name.clone());
                }
            }
            Stmt::If {
                then, otherwise, ..
            } => {
                collect_declared(then, out);
                if let Some(body) = otherwise {
                    collect_declared(body, out);
                }
            }
            Stmt::While { body, .. } => collect_declared(body, out),
            Stmt::For { init, body, .. } => {
                if let Some(s) = init {
                    collect_declared(std::slice::from_ref(s), out);
                }
                collect_declared(body, out);
            }
            Stmt::Block { body, .. } => collect_declared(body, out),
            _ => {}
        }
    }
}

/// Collect identifier references in this function's own code (not nested
/// function bodies).
fn collect_refs_stmt(stmt: &Stmt, sets: &mut Vec<FxHashSet<String>>, refs: &mut FxHashSet<String>) {
    match stmt {
        Stmt::Decl { init: Some(e), .. } => collect_refs_expr(e, sets, refs),
        Stmt::Decl { init: None, .. } | Stmt::Debugger { .. } | Stmt::Func(_) => {}
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                collect_refs_expr(e, sets, refs);
            }
        }
        Stmt::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            collect_refs_expr(cond, sets, refs);
            for s in then {
                collect_refs_stmt(s, sets, refs);
            }
            if let Some(body) = otherwise {
                for s in body {
                    collect_refs_stmt(s, sets, refs);
                }
            }
        }
        Stmt::While { cond, body, .. } => {
            collect_refs_expr(cond, sets, refs);
            for s in body {
                collect_refs_stmt(s, sets, refs);
            }
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
            ..
        } => {
            if let Some(s) = init {
                collect_refs_stmt(s, sets, refs);
            }
            if let Some(e) = cond {
                collect_refs_expr(e, sets, refs);
            }
            if let Some(e) = update {
                collect_refs_expr(e, sets, refs);
            }
            for s in body {
                collect_refs_stmt(s, sets, refs);
            }
        }
        Stmt::Block { body, .. } => {
            for s in body {
                collect_refs_stmt(s, sets, refs);
            }
        }
        Stmt::Expr { expr, .. } => collect_refs_expr(expr, sets, refs),
    }
}

fn collect_refs_expr(expr: &Expr, sets: &mut Vec<FxHashSet<String>>, refs: &mut FxHashSet<String>) {
    match expr {
        Expr::Ident(name, _) => {
            refs.insert(name.clone());
        }
        Expr::Func(_) => {}
        Expr::Array(items, _) => {
            for e in items {
                collect_refs_expr(e, sets, refs);
            }
        }
        Expr::Object(props, _) => {
            for (_, e) in props {
                collect_refs_expr(e, sets, refs);
            }
        }
        Expr::Assign { target, value, .. } => {
            collect_refs_expr(target, sets, refs);
            collect_refs_expr(value, sets, refs);
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            collect_refs_expr(lhs, sets, refs);
            collect_refs_expr(rhs, sets, refs);
        }
        Expr::Unary { operand, .. } => collect_refs_expr(operand, sets, refs),
        Expr::Call { callee, args, .. } => {
            collect_refs_expr(callee, sets, refs);
            for e in args {
                collect_refs_expr(e, sets, refs);
            }
        }
        Expr::Member { object, key, .. } => {
            collect_refs_expr(object, sets, refs);
            if let MemberKey::Index(e) = key {
                collect_refs_expr(e, sets, refs);
            }
        }
        _ => {}
    }
}

/// Recurse into nested function literals, analyzing each and accumulating
/// the names they leave free.
fn collect_nested_free(
    stmt: &Stmt,
    sets: &mut Vec<FxHashSet<String>>,
    free: &mut FxHashSet<String>,
) {
    match stmt {
        Stmt::Func(f) => free.extend(visit_func(f, sets)),
        Stmt::Decl { init: Some(e), .. } => collect_nested_free_expr(e, sets, free),
        Stmt::Decl { init: None, .. } | Stmt::Debugger { .. } => {}
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                collect_nested_free_expr(e, sets, free);
            }
        }
        Stmt::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            collect_nested_free_expr(cond, sets, free);
            for s in then {
                collect_nested_free(s, sets, free);
            }
            if let Some(body) = otherwise {
                for s in body {
                    collect_nested_free(s, sets, free);
                }
            }
        }
        Stmt::While { cond, body, .. } => {
            collect_nested_free_expr(cond, sets, free);
            for s in body {
                collect_nested_free(s, sets, free);
            }
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
            ..
        } => {
            if let Some(s) = init {
                collect_nested_free(s, sets, free);
            }
            if let Some(e) = cond {
                collect_nested_free_expr(e, sets, free);
            }
            if let Some(e) = update {
                collect_nested_free_expr(e, sets, free);
            }
            for s in body {
                collect_nested_free(s, sets, free);
            }
        }
        Stmt::Block { body, .. } => {
            for s in body {
                collect_nested_free(s, sets, free);
            }
        }
        Stmt::Expr { expr, .. } => collect_nested_free_expr(expr, sets, free),
    }
}

fn collect_nested_free_expr(
    expr: &Expr,
    sets: &mut Vec<FxHashSet<String>>,
    free: &mut FxHashSet<String>,
) {
    match expr {
        Expr::Func(f) => free.extend(visit_func(f, sets)),
        Expr::Array(items, _) => {
            for e in items {
                collect_nested_free_expr(e, sets, free);
            }
        }
        Expr::Object(props, _) => {
            for (_, e) in props {
                collect_nested_free_expr(e, sets, free);
            }
        }
        Expr::Assign { target, value, .. } => {
            collect_nested_free_expr(target, sets, free);
            collect_nested_free_expr(value, sets, free);
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            collect_nested_free_expr(lhs, sets, free);
            collect_nested_free_expr(rhs, sets, free);
        }
        Expr::Unary { operand, .. } => collect_nested_free_expr(operand, sets, free),
        Expr::Call { callee, args, .. } => {
            collect_nested_free_expr(callee, sets, free);
            for e in args {
                collect_nested_free_expr(e, sets, free);
            }
        }
        Expr::Member { object, key, .. } => {
            collect_nested_free_expr(object, sets, free);
            if let MemberKey::Index(e) = key {
                collect_nested_free_expr(e, sets, free);
            }
        }
        _ => {}
    }
}
