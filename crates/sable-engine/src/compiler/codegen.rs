//! Bytecode generation.
//!
//! Single-pass code generator over the AST. Each function literal compiles
//! to its own [`Program`]; a stack of function contexts tracks binding
//! resolution (operand-stack slot, heap-environment slot, or global).
//!
//! With the debug-mode switch on, every named binding is spilled to the heap
//! environment so the debugger can materialize it at any pause point; the
//! operand-stack fast path for locals is never used.

use crate::compiler::analysis::{self, Captures};
use crate::compiler::instr::Instr;
use crate::compiler::program::Program;
use crate::parser::ast::*;
use crate::parser::{ParseError, Parser};
use crate::source::SourceFile;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Errors produced during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Lexing or parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A function exceeded the addressable local-slot space.
    #[error("too many locals in function '{0}'")]
    TooManyLocals(String),
    /// A function exceeded the addressable heap-environment space.
    #[error("too many captured bindings in function '{0}'")]
    TooManyStashSlots(String),
}

/// Compiles Sable source into programs.
pub struct Compiler;

impl Compiler {
    /// Parse and compile a source file. `debug_mode` selects the
    /// spill-everything compilation strategy (see module docs).
    pub fn compile(src: Arc<SourceFile>, debug_mode: bool) -> Result<Rc<Program>, CompileError> {
        let script = Parser::new(src.text())?.parse()?;
        Self::compile_script(src, &script, debug_mode)
    }

    /// Compile an already-parsed script.
    pub fn compile_script(
        src: Arc<SourceFile>,
        script: &Script,
        debug_mode: bool,
    ) -> Result<Rc<Program>, CompileError> {
        let captures = analysis::analyze(script);
        let mut cg = CodeGen {
            src,
            debug_mode,
            captures,
            scopes: Vec::new(),
        };
        cg.script(script)
    }
}

/// How a name resolves at a use site.
enum Resolved {
    Local(u16),
    Stash { depth: u16, slot: u16 },
    Global,
}

/// Binding of a declared name within one function.
#[derive(Clone, Copy)]
enum Binding {
    Stack(u16),
    Stash(u16),
}

/// Compilation state for one function (or the top-level script).
struct FuncCtx {
    func_id: Option<usize>,
    is_script: bool,
    fn_name: Rc<str>,
    param_names: Vec<Rc<str>>,
    bindings: FxHashMap<String, Binding>,
    stash_names: Vec<Rc<str>>,
    local_count: u16,
    code: Vec<Instr>,
    src_map: Vec<i32>,
    strings: Vec<Rc<str>>,
    string_index: FxHashMap<Rc<str>, u32>,
    functions: Vec<Rc<Program>>,
}

impl FuncCtx {
    fn new(func_id: Option<usize>, name: &str, is_script: bool) -> Self {
        Self {
            func_id,
            is_script,
            fn_name: Rc::from(name),
            param_names: Vec::new(),
            bindings: FxHashMap::default(),
            stash_names: Vec::new(),
            local_count: 0,
            code: Vec::new(),
            src_map: Vec::new(),
            strings: Vec::new(),
            string_index: FxHashMap::default(),
            functions: Vec::new(),
        }
    }
}

struct CodeGen {
    src: Arc<SourceFile>,
    debug_mode: bool,
    captures: Captures,
    scopes: Vec<FuncCtx>,
}

/// Sentinel source offset for synthetic instructions.
const NO_SRC: i32 = -1;

impl CodeGen {
    // ── Emission helpers ─────────────────────────────────────────────────

    fn ctx(&mut self) -> &mut FuncCtx {
        self.scopes.last_mut().expect("no active function context")
    }

    fn emit(&mut self, instr: Instr, offset: i32) -> usize {
        let ctx = self.ctx();
        ctx.code.push(instr);
        ctx.src_map.push(offset);
        ctx.code.len() - 1
    }

    fn here(&mut self) -> u32 {
        self.ctx().code.len() as u32
    }

    fn patch_jump(&mut self, at: usize) {
        let target = self.here();
        let ctx = self.ctx();
        match &mut ctx.code[at] {
            Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) => *t = target,
            other => panic!("patching non-jump instruction {:?}", other),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        let ctx = self.ctx();
        if let Some(&i) = ctx.string_index.get(s) {
            return i;
        }
        let rc: Rc<str> = Rc::from(s);
        let i = ctx.strings.len() as u32;
        ctx.strings.push(rc.clone());
        ctx.string_index.insert(rc, i);
        i
    }

    // ── Binding management ───────────────────────────────────────────────

    /// Whether a name declared in the current function must be spilled to
    /// the heap environment.
    fn spills(&self, name: &str) -> bool {
        if self.debug_mode {
            return true;
        }
        match self.scopes.last().and_then(|c| c.func_id) {
            Some(id) => self.captures.is_captured(id, name),
            // Top-level names are globals; no spilling applies.
            None => false,
        }
    }

    fn declare(&mut self, name: &str) -> Result<Binding, CompileError> {
        if let Some(&b) = self.ctx().bindings.get(name) {
            return Ok(b);
        }
        let binding = if self.spills(name) {
            let ctx = self.ctx();
            let slot = ctx.stash_names.len();
            if slot > u16::MAX as usize {
                return Err(CompileError::TooManyStashSlots(ctx.fn_name.to_string()));
            }
            ctx.stash_names.push(Rc::from(name));
            Binding::Stash(slot as u16)
        } else {
            let ctx = self.ctx();
            if ctx.local_count == u16::MAX {
                return Err(CompileError::TooManyLocals(ctx.fn_name.to_string()));
            }
            let slot = ctx.local_count;
            ctx.local_count += 1;
            Binding::Stack(slot)
        };
        self.ctx().bindings.insert(name.to_string(), binding);
        Ok(binding)
    }

    fn resolve(&self, name: &str) -> Resolved {
        for (depth, ctx) in self.scopes.iter().rev().enumerate() {
            if let Some(binding) = ctx.bindings.get(name) {
                return match (depth, binding) {
                    (0, Binding::Stack(slot)) => Resolved::Local(*slot),
                    (d, Binding::Stash(slot)) => Resolved::Stash {
                        depth: d as u16,
                        slot: *slot,
                    },
                    // A stack binding in an enclosing function is unreachable
                    // after capture analysis; resolve through the global
                    // object like any other unbound name.
                    (_, Binding::Stack(_)) => Resolved::Global,
                };
            }
        }
        Resolved::Global
    }

    fn emit_load(&mut self, name: &str, offset: i32) {
        match self.resolve(name) {
            Resolved::Local(slot) => {
                self.emit(Instr::LoadLocal(slot), offset);
            }
            Resolved::Stash { depth, slot } => {
                self.emit(Instr::LoadStash { depth, slot }, offset);
            }
            Resolved::Global => {
                let idx = self.intern(name);
                self.emit(Instr::LoadGlobal(idx), offset);
            }
        }
    }

    fn emit_store(&mut self, name: &str, offset: i32) {
        match self.resolve(name) {
            Resolved::Local(slot) => {
                self.emit(Instr::StoreLocal(slot), offset);
            }
            Resolved::Stash { depth, slot } => {
                self.emit(Instr::StoreStash { depth, slot }, offset);
            }
            Resolved::Global => {
                let idx = self.intern(name);
                self.emit(Instr::StoreGlobal(idx), offset);
            }
        }
    }

    // ── Top level ────────────────────────────────────────────────────────

    fn script(&mut self, script: &Script) -> Result<Rc<Program>, CompileError> {
        self.scopes.push(FuncCtx::new(None, "", true));
        self.body(&script.body)?;
        self.emit(Instr::ConstUndefined, NO_SRC);
        self.emit(Instr::Return, NO_SRC);
        Ok(self.finish())
    }

    fn finish(&mut self) -> Rc<Program> {
        let ctx = self.scopes.pop().expect("no active function context");
        let stash_template = ctx
            .stash_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as u32))
            .collect();
        Rc::new(Program {
            id: Program::next_id(),
            fn_name: ctx.fn_name,
            param_names: ctx.param_names,
            local_count: ctx.local_count,
            stash_names: ctx.stash_names,
            stash_template,
            code: ctx.code,
            src_map: ctx.src_map,
            strings: ctx.strings,
            functions: ctx.functions,
            src: self.src.clone(),
        })
    }

    // ── Functions ────────────────────────────────────────────────────────

    fn function(&mut self, func: &FuncLit) -> Result<u16, CompileError> {
        let name = func.name.as_deref().unwrap_or("");
        let mut ctx = FuncCtx::new(Some(func.id), name, false);
        ctx.param_names = func.params.iter().map(|p| Rc::from(p.as_str())).collect();
        ctx.local_count = func.params.len() as u16;
        self.scopes.push(ctx);

        // Parameters arrive in stack slots 0..param_count. Spilled
        // parameters additionally get a stash slot and a prologue copy.
        let mut spilled_params = Vec::new();
        for (i, param) in func.params.iter().enumerate() {
            if self.spills(param) {
                let ctx = self.ctx();
                let slot = ctx.stash_names.len() as u16;
                ctx.stash_names.push(Rc::from(param.as_str()));
                ctx.bindings
                    .insert(param.clone(), Binding::Stash(slot));
                spilled_params.push((i as u16, slot));
            } else {
                self.ctx()
                    .bindings
                    .insert(param.clone(), Binding::Stack(i as u16));
            }
        }
        for (local, slot) in spilled_params {
            self.emit(Instr::LoadLocal(local), NO_SRC);
            self.emit(Instr::StoreStash { depth: 0, slot }, NO_SRC);
        }

        self.body(&func.body)?;

        // Implicit `return undefined` at the end of every function.
        self.emit(Instr::ConstUndefined, NO_SRC);
        self.emit(Instr::Return, NO_SRC);

        let program = self.finish();
        let ctx = self.ctx();
        let index = ctx.functions.len();
        ctx.functions.push(program);
        Ok(index as u16)
    }

    /// Compile a statement list: pre-declare every function-scoped name,
    /// hoist function declarations, then emit the statements in order.
    fn body(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        if !self.ctx().is_script {
            let mut names = Vec::new();
            collect_decl_names(stmts, &mut names);
            for name in &names {
                self.declare(name)?;
            }
        }

        let mut funcs = Vec::new();
        collect_hoisted_funcs(stmts, &mut funcs);
        for func in funcs {
            let index = self.function(func)?;
            self.emit(Instr::MakeFunc(index), NO_SRC);
            let name = func.name.clone().unwrap_or_default();
            if self.ctx().is_script {
                let idx = self.intern(&name);
                self.emit(Instr::StoreGlobal(idx), NO_SRC);
            } else {
                self.emit_store(&name, NO_SRC);
            }
        }

        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let offset = stmt.offset() as i32;
        match stmt {
            // Hoisted separately in `body`.
            Stmt::Func(_) => Ok(()),
            Stmt::Decl { name, init, .. } => {
                match init {
                    Some(expr) => self.expression(expr)?,
                    None => {
                        self.emit(Instr::ConstUndefined, offset);
                    }
                }
                if self.ctx().is_script {
                    let idx = self.intern(name);
                    self.emit(Instr::StoreGlobal(idx), offset);
                } else {
                    self.emit_store(name, offset);
                }
                Ok(())
            }
            Stmt::Return { value, offset } => {
                let offset = *offset as i32;
                match value {
                    Some(expr) => self.expression(expr)?,
                    None => {
                        self.emit(Instr::ConstUndefined, offset);
                    }
                }
                self.emit(Instr::Return, offset);
                Ok(())
            }
            Stmt::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.expression(cond)?;
                let to_else = self.emit(Instr::JumpIfFalse(0), cond.offset() as i32);
                for s in then {
                    self.statement(s)?;
                }
                match otherwise {
                    Some(body) => {
                        let to_end = self.emit(Instr::Jump(0), NO_SRC);
                        self.patch_jump(to_else);
                        for s in body {
                            self.statement(s)?;
                        }
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                let start = self.here();
                self.expression(cond)?;
                let to_end = self.emit(Instr::JumpIfFalse(0), cond.offset() as i32);
                for s in body {
                    self.statement(s)?;
                }
                self.emit(Instr::Jump(start), NO_SRC);
                self.patch_jump(to_end);
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                if let Some(s) = init {
                    self.statement(s)?;
                }
                let start = self.here();
                let to_end = match cond {
                    Some(expr) => {
                        self.expression(expr)?;
                        Some(self.emit(Instr::JumpIfFalse(0), expr.offset() as i32))
                    }
                    None => None,
                };
                for s in body {
                    self.statement(s)?;
                }
                if let Some(expr) = update {
                    self.expression(expr)?;
                    self.emit(Instr::Pop, expr.offset() as i32);
                }
                self.emit(Instr::Jump(start), NO_SRC);
                if let Some(at) = to_end {
                    self.patch_jump(at);
                }
                Ok(())
            }
            Stmt::Block { body, .. } => {
                for s in body {
                    self.statement(s)?;
                }
                Ok(())
            }
            Stmt::Expr { expr, .. } => {
                self.expression(expr)?;
                // The top-level script's completion value is its last
                // expression statement.
                if self.ctx().is_script {
                    self.emit(Instr::PopResult, offset);
                } else {
                    self.emit(Instr::Pop, offset);
                }
                Ok(())
            }
            Stmt::Debugger { offset } => {
                self.emit(Instr::Debugger, *offset as i32);
                Ok(())
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let offset = expr.offset() as i32;
        match expr {
            Expr::Undefined(_) => {
                self.emit(Instr::ConstUndefined, offset);
            }
            Expr::Null(_) => {
                self.emit(Instr::ConstNull, offset);
            }
            Expr::Bool(true, _) => {
                self.emit(Instr::ConstTrue, offset);
            }
            Expr::Bool(false, _) => {
                self.emit(Instr::ConstFalse, offset);
            }
            Expr::Int(v, _) => {
                self.emit(Instr::ConstInt(*v), offset);
            }
            Expr::Float(v, _) => {
                self.emit(Instr::ConstFloat(*v), offset);
            }
            Expr::Str(s, _) => {
                let idx = self.intern(s);
                self.emit(Instr::ConstStr(idx), offset);
            }
            Expr::Ident(name, _) => self.emit_load(name, offset),
            Expr::This(_) => {
                self.emit(Instr::LoadThis, offset);
            }
            Expr::Array(items, _) => {
                for item in items {
                    self.expression(item)?;
                }
                self.emit(Instr::NewArray(items.len() as u16), offset);
            }
            Expr::Object(props, _) => {
                self.emit(Instr::NewObject, offset);
                for (key, value) in props {
                    self.expression(value)?;
                    let idx = self.intern(key);
                    self.emit(Instr::DefineProp(idx), value.offset() as i32);
                }
            }
            Expr::Func(func) => {
                let index = self.function(func)?;
                self.emit(Instr::MakeFunc(index), offset);
            }
            Expr::Assign { target, value, .. } => match &**target {
                Expr::Ident(name, _) => {
                    self.expression(value)?;
                    self.emit(Instr::Dup, offset);
                    self.emit_store(name, offset);
                }
                Expr::Member { object, key, .. } => {
                    self.expression(object)?;
                    match key {
                        MemberKey::Name(name) => {
                            self.expression(value)?;
                            let idx = self.intern(name);
                            self.emit(Instr::SetProp(idx), offset);
                        }
                        MemberKey::Index(index) => {
                            self.expression(index)?;
                            self.expression(value)?;
                            self.emit(Instr::SetElem, offset);
                        }
                    }
                }
                // The parser rejects other targets.
                _ => unreachable!("invalid assignment target survived parsing"),
            },
            Expr::Binary { op, lhs, rhs, .. } => {
                self.expression(lhs)?;
                self.expression(rhs)?;
                let instr = match op {
                    BinOp::Add => Instr::Add,
                    BinOp::Sub => Instr::Sub,
                    BinOp::Mul => Instr::Mul,
                    BinOp::Div => Instr::Div,
                    BinOp::Mod => Instr::Mod,
                    BinOp::Eq => Instr::Eq,
                    BinOp::Ne => Instr::Ne,
                    BinOp::Lt => Instr::Lt,
                    BinOp::Le => Instr::Le,
                    BinOp::Gt => Instr::Gt,
                    BinOp::Ge => Instr::Ge,
                };
                self.emit(instr, offset);
            }
            Expr::Logical { op, lhs, rhs, .. } => {
                self.expression(lhs)?;
                self.emit(Instr::Dup, offset);
                let short = match op {
                    LogicalOp::And => self.emit(Instr::JumpIfFalse(0), offset),
                    LogicalOp::Or => self.emit(Instr::JumpIfTrue(0), offset),
                };
                self.emit(Instr::Pop, offset);
                self.expression(rhs)?;
                self.patch_jump(short);
            }
            Expr::Unary { op, operand, .. } => {
                self.expression(operand)?;
                let instr = match op {
                    UnOp::Neg => Instr::Neg,
                    UnOp::Not => Instr::Not,
                };
                self.emit(instr, offset);
            }
            Expr::Call { callee, args, .. } => {
                match &**callee {
                    // A member callee receives its object as `this`.
                    Expr::Member { object, key, .. } => {
                        self.expression(object)?;
                        self.emit(Instr::Dup, offset);
                        match key {
                            MemberKey::Name(name) => {
                                let idx = self.intern(name);
                                self.emit(Instr::GetProp(idx), offset);
                            }
                            MemberKey::Index(index) => {
                                self.expression(index)?;
                                self.emit(Instr::GetElem, offset);
                            }
                        }
                        self.emit(Instr::Swap, offset);
                    }
                    other => {
                        self.expression(other)?;
                        self.emit(Instr::ConstUndefined, offset);
                    }
                }
                for arg in args {
                    self.expression(arg)?;
                }
                self.emit(Instr::Call(args.len() as u8), offset);
            }
            Expr::Member { object, key, .. } => {
                self.expression(object)?;
                match key {
                    MemberKey::Name(name) => {
                        let idx = self.intern(name);
                        self.emit(Instr::GetProp(idx), offset);
                    }
                    MemberKey::Index(index) => {
                        self.expression(index)?;
                        self.emit(Instr::GetElem, offset);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Collect function-scoped declaration names (not nested functions' own
/// scopes) in source order.
fn collect_decl_names<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a str>) {
    for stmt in stmts {
        match stmt {
            Stmt::Decl { name, .. } => out.push(name),
            Stmt::Func(f) => {
                if let Some(name) = &f.name {
                    out.push(name);
                }
            }
            Stmt::If {
                then, otherwise, ..
            } => {
                collect_decl_names(then, out);
                if let Some(body) = otherwise {
                    collect_decl_names(body, out);
                }
            }
            Stmt::While { body, .. } => collect_decl_names(body, out),
            Stmt::For { init, body, .. } => {
                if let Some(s) = init {
                    collect_decl_names(std::slice::from_ref(s), out);
                }
                collect_decl_names(body, out);
            }
            Stmt::Block { body, .. } => collect_decl_names(body, out),
            _ => {}
        }
    }
}

/// Collect function declarations to hoist, in source order.
fn collect_hoisted_funcs<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a FuncLit>) {
    for stmt in stmts {
        match stmt {
            Stmt::Func(f) => out.push(f),
            Stmt::If {
                then, otherwise, ..
            } => {
                collect_hoisted_funcs(then, out);
                if let Some(body) = otherwise {
                    collect_hoisted_funcs(body, out);
                }
            }
            Stmt::While { body, .. } => collect_hoisted_funcs(body, out),
            Stmt::For { body, .. } => collect_hoisted_funcs(body, out),
            Stmt::Block { body, .. } => collect_hoisted_funcs(body, out),
            _ => {}
        }
    }
}
