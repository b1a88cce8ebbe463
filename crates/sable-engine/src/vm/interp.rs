//! The dispatch loop.
//!
//! A single-threaded stack interpreter. The live execution context (program,
//! pc, stack base, heap environment, `this`) sits in VM registers; calls push
//! the caller's context onto the call stack and replace the registers.
//!
//! When a debugger is attached, the loop consults its pause predicate
//! immediately before dispatching each instruction, and once on entry to a
//! native callout. A pause runs the host handler inline and resumes when it
//! returns.

use crate::compiler::{Instr, Program};
use crate::debug::shared::DebugShared;
use crate::source::Position;
use crate::vm::frame::StackFrame;
use crate::vm::object::{FuncKind, Object};
use crate::vm::stash::{self, Stash};
use crate::vm::value::Value;
use crate::vm::VmError;
use std::cell::RefCell;
use std::rc::Rc;

/// Call-stack depth limit.
const MAX_CALL_DEPTH: usize = 512;

/// One execution context. `prg == None` means a native callout is live.
pub(crate) struct Ctx {
    pub(crate) prg: Option<Rc<Program>>,
    pub(crate) pc: usize,
    /// Stack index of the `this` slot; the callee object sits at `sb - 1`.
    pub(crate) sb: usize,
    pub(crate) stash: Option<Rc<RefCell<Stash>>>,
    pub(crate) this: Value,
    pub(crate) native_name: Option<Rc<str>>,
}

impl Ctx {
    fn idle() -> Self {
        Ctx {
            prg: None,
            pc: 0,
            sb: 0,
            stash: None,
            this: Value::Undefined,
            native_name: None,
        }
    }
}

/// The Sable virtual machine.
pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) ctx: Ctx,
    pub(crate) call_stack: Vec<Ctx>,
    pub(crate) global: Rc<RefCell<Object>>,
    pub(crate) debug: Option<Rc<DebugShared>>,
    debug_mode: bool,
    completion: Value,
}

enum Step {
    Next,
    Done(Value),
}

impl Vm {
    /// Create a VM with a fresh global object.
    pub fn new() -> Self {
        Self::with_debug_mode(false)
    }

    /// Create a VM, selecting the debug-mode compile contract for scripts
    /// evaluated through it.
    pub fn with_debug_mode(debug_mode: bool) -> Self {
        Self::with_global(Rc::new(RefCell::new(Object::with_class("global"))), debug_mode)
    }

    /// Create a VM around an existing global object. The expression
    /// evaluator uses this to run scripts against a substituted global.
    pub fn with_global(global: Rc<RefCell<Object>>, debug_mode: bool) -> Self {
        Self {
            stack: Vec::new(),
            ctx: Ctx::idle(),
            call_stack: Vec::new(),
            global,
            debug: None,
            debug_mode,
            completion: Value::Undefined,
        }
    }

    /// Whether scripts are compiled with the debug-mode spill contract.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// The VM's global object.
    pub fn global_object(&self) -> Rc<RefCell<Object>> {
        self.global.clone()
    }

    /// Define a property of the global object.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.global.borrow_mut().set(name, value);
    }

    /// Read a property of the global object.
    pub fn get_global(&self, name: &str) -> Value {
        self.global.borrow().get(name).unwrap_or(Value::Undefined)
    }

    /// Current call-stack depth (saved contexts below the live one).
    pub(crate) fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Execute a compiled top-level program to completion.
    ///
    /// Returns the script's completion value: an explicit top-level `return`
    /// value, or the value of the last top-level expression statement.
    pub fn run_program(&mut self, prg: Rc<Program>) -> Result<Value, VmError> {
        if let Some(dbg) = self.debug.clone() {
            dbg.install_program(&prg);
        }
        self.stack.clear();
        self.call_stack.clear();
        self.completion = Value::Undefined;
        let stash = Stash::for_program(&prg, None);
        self.ctx = Ctx {
            prg: Some(prg),
            pc: 0,
            sb: 0,
            stash: Some(stash),
            this: Value::Object(self.global.clone()),
            native_name: None,
        };
        let result = self.run_loop();
        self.ctx = Ctx::idle();
        result
    }

    fn run_loop(&mut self) -> Result<Value, VmError> {
        loop {
            if let Some(dbg) = self.debug.clone() {
                dbg.check_and_pause(self);
            }
            match self.step() {
                Ok(Step::Next) => {}
                Ok(Step::Done(value)) => return Ok(value),
                Err(e) => return Err(e),
            }
        }
    }

    fn step(&mut self) -> Result<Step, VmError> {
        let prg = match self.ctx.prg.clone() {
            Some(p) => p,
            None => {
                return Err(VmError::InvalidBytecode(
                    "dispatch without a program".to_string(),
                ))
            }
        };
        let pc = self.ctx.pc;
        if pc >= prg.code.len() {
            // Compiled code always ends in Return; treat a fallthrough as one.
            return self.do_return(Value::Undefined);
        }
        self.ctx.pc = pc + 1;

        match prg.code[pc] {
            Instr::Pop => {
                self.pop()?;
            }
            Instr::PopResult => {
                self.completion = self.pop()?;
            }
            Instr::Dup => {
                let top = self.peek()?.clone();
                self.stack.push(top);
            }
            Instr::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::InvalidBytecode("swap underflow".to_string()));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Instr::ConstUndefined => self.stack.push(Value::Undefined),
            Instr::ConstNull => self.stack.push(Value::Null),
            Instr::ConstTrue => self.stack.push(Value::Bool(true)),
            Instr::ConstFalse => self.stack.push(Value::Bool(false)),
            Instr::ConstInt(v) => self.stack.push(Value::Int(v)),
            Instr::ConstFloat(v) => self.stack.push(Value::Float(v)),
            Instr::ConstStr(idx) => self.stack.push(Value::Str(prg.string(idx).clone())),

            Instr::LoadLocal(slot) => {
                let value = self
                    .stack
                    .get(self.ctx.sb + 1 + slot as usize)
                    .cloned()
                    .unwrap_or(Value::Undefined);
                self.stack.push(value);
            }
            Instr::StoreLocal(slot) => {
                let value = self.pop()?;
                let at = self.ctx.sb + 1 + slot as usize;
                if let Some(cell) = self.stack.get_mut(at) {
                    *cell = value;
                }
            }
            Instr::LoadStash { depth, slot } => {
                let value = self
                    .stash_at(depth)
                    .map(|s| s.borrow().get(slot))
                    .unwrap_or(Value::Undefined);
                self.stack.push(value);
            }
            Instr::StoreStash { depth, slot } => {
                let value = self.pop()?;
                if let Some(s) = self.stash_at(depth) {
                    s.borrow_mut().set(slot, value);
                }
            }
            Instr::LoadGlobal(idx) => {
                let name = prg.string(idx);
                match self.global.borrow().get(name) {
                    Some(value) => self.stack.push(value),
                    None => return Err(VmError::ReferenceError(name.to_string())),
                }
            }
            Instr::StoreGlobal(idx) => {
                let value = self.pop()?;
                self.global.borrow_mut().set(prg.string(idx), value);
            }
            Instr::LoadThis => self.stack.push(self.ctx.this.clone()),

            Instr::NewObject => self.stack.push(Value::object(Object::plain())),
            Instr::DefineProp(idx) => {
                let value = self.pop()?;
                let target = self.peek()?.clone();
                self.set_property(&target, prg.string(idx), value)?;
            }
            Instr::NewArray(n) => {
                let n = n as usize;
                if self.stack.len() < n {
                    return Err(VmError::InvalidBytecode("array underflow".to_string()));
                }
                let elements = self.stack.split_off(self.stack.len() - n);
                self.stack.push(Value::object(Object::array(elements)));
            }
            Instr::GetProp(idx) => {
                let target = self.pop()?;
                let value = self.get_property(&target, prg.string(idx))?;
                self.stack.push(value);
            }
            Instr::SetProp(idx) => {
                let value = self.pop()?;
                let target = self.pop()?;
                self.set_property(&target, prg.string(idx), value.clone())?;
                self.stack.push(value);
            }
            Instr::GetElem => {
                let key = self.pop()?;
                let target = self.pop()?;
                let value = self.get_property(&target, &property_key(&key))?;
                self.stack.push(value);
            }
            Instr::SetElem => {
                let value = self.pop()?;
                let key = self.pop()?;
                let target = self.pop()?;
                self.set_property(&target, &property_key(&key), value.clone())?;
                self.stack.push(value);
            }

            Instr::MakeFunc(index) => {
                let template = prg
                    .functions
                    .get(index as usize)
                    .cloned()
                    .ok_or_else(|| VmError::InvalidBytecode("bad function index".to_string()))?;
                let name = template.fn_name.clone();
                let func = Object::function(
                    &name,
                    FuncKind::Compiled {
                        prg: template,
                        env: self.ctx.stash.clone(),
                    },
                );
                self.stack.push(Value::object(func));
            }
            Instr::Call(argc) => {
                let argc = argc as usize;
                if self.stack.len() < argc + 2 {
                    return Err(VmError::InvalidBytecode("call underflow".to_string()));
                }
                let callee_idx = self.stack.len() - argc - 2;
                let callee = self.stack[callee_idx].clone();
                self.call_value(callee, callee_idx, argc)?;
            }
            Instr::Return => {
                let value = self.pop()?;
                return self.do_return(value);
            }

            Instr::Jump(target) => self.ctx.pc = target as usize,
            Instr::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    self.ctx.pc = target as usize;
                }
            }
            Instr::JumpIfTrue(target) => {
                if self.pop()?.is_truthy() {
                    self.ctx.pc = target as usize;
                }
            }

            Instr::Add => self.binary_op(add)?,
            Instr::Sub => self.binary_op(sub)?,
            Instr::Mul => self.binary_op(mul)?,
            Instr::Div => self.binary_op(div)?,
            Instr::Mod => self.binary_op(rem)?,
            Instr::Neg => {
                let v = self.pop()?;
                let out = match v {
                    Value::Int(i) => i
                        .checked_neg()
                        .map(Value::Int)
                        .unwrap_or(Value::Float(-(i as f64))),
                    Value::Float(f) => Value::Float(-f),
                    other => {
                        return Err(VmError::TypeError(format!(
                            "cannot negate {}",
                            other.to_display()
                        )))
                    }
                };
                self.stack.push(out);
            }
            Instr::Not => {
                let v = self.pop()?;
                self.stack.push(Value::Bool(!v.is_truthy()));
            }
            Instr::Eq => {
                let (a, b) = self.pop2()?;
                self.stack.push(Value::Bool(a.loose_eq(&b)));
            }
            Instr::Ne => {
                let (a, b) = self.pop2()?;
                self.stack.push(Value::Bool(!a.loose_eq(&b)));
            }
            Instr::Lt => self.compare_op(|o| o == std::cmp::Ordering::Less)?,
            Instr::Le => self.compare_op(|o| o != std::cmp::Ordering::Greater)?,
            Instr::Gt => self.compare_op(|o| o == std::cmp::Ordering::Greater)?,
            Instr::Ge => self.compare_op(|o| o != std::cmp::Ordering::Less)?,

            Instr::Debugger => {
                if let Some(dbg) = self.debug.clone() {
                    dbg.pause_directive(self);
                }
            }
        }
        Ok(Step::Next)
    }

    // ── Calls & returns ──────────────────────────────────────────────────

    fn call_value(
        &mut self,
        callee: Value,
        callee_idx: usize,
        argc: usize,
    ) -> Result<(), VmError> {
        let obj = match callee.as_object() {
            Some(o) => o.clone(),
            None => {
                return Err(VmError::TypeError(format!(
                    "{} is not a function",
                    callee.to_display()
                )))
            }
        };
        let kind = match obj.borrow().callable() {
            Some(k) => k,
            None => {
                return Err(VmError::TypeError(format!(
                    "{} is not a function",
                    callee.to_display()
                )))
            }
        };

        match kind {
            FuncKind::Compiled { prg, env } => {
                if self.call_stack.len() >= MAX_CALL_DEPTH {
                    return Err(VmError::StackOverflow);
                }
                let sb = callee_idx + 1;
                let param_count = prg.param_names.len();
                // Trim surplus args, pad missing params, allocate locals.
                if argc > param_count {
                    self.stack.truncate(sb + 1 + param_count);
                }
                for _ in argc.min(param_count)..prg.local_count as usize {
                    self.stack.push(Value::Undefined);
                }
                let this = self.stack[sb].clone();
                let stash = Stash::for_program(&prg, env);
                let saved = std::mem::replace(
                    &mut self.ctx,
                    Ctx {
                        prg: Some(prg),
                        pc: 0,
                        sb,
                        stash: Some(stash),
                        this,
                        native_name: None,
                    },
                );
                self.call_stack.push(saved);
                Ok(())
            }
            FuncKind::Native { f } => {
                let sb = callee_idx + 1;
                let this = self.stack[sb].clone();
                let args: Vec<Value> = self.stack[sb + 1..].to_vec();
                let name = obj
                    .borrow()
                    .get("name")
                    .and_then(|v| v.as_str().map(Rc::from))
                    .unwrap_or_else(|| Rc::from(""));

                // Enter a program-less context so the call stack and the
                // debugger's native probes see the callout.
                let saved = std::mem::replace(
                    &mut self.ctx,
                    Ctx {
                        prg: None,
                        pc: 0,
                        sb,
                        stash: None,
                        this: this.clone(),
                        native_name: Some(name),
                    },
                );
                self.call_stack.push(saved);
                if let Some(dbg) = self.debug.clone() {
                    dbg.check_and_pause(self);
                }

                let result = f(&this, &args);

                if let Some(prev) = self.call_stack.pop() {
                    self.ctx = prev;
                }
                let result = result?;
                self.stack.truncate(callee_idx);
                self.stack.push(result);
                Ok(())
            }
            FuncKind::BoundCall { target } => {
                // fn.call(thisArg, ...rest): invoke `target` with an
                // explicit receiver. Rebuild the call window in place.
                let new_this = if argc >= 1 {
                    self.stack[callee_idx + 2].clone()
                } else {
                    Value::Undefined
                };
                let rest: Vec<Value> = if argc >= 1 {
                    self.stack[callee_idx + 3..].to_vec()
                } else {
                    Vec::new()
                };
                self.stack.truncate(callee_idx);
                self.stack.push(target.clone());
                self.stack.push(new_this);
                let new_argc = rest.len();
                self.stack.extend(rest);
                self.call_value(target, callee_idx, new_argc)
            }
        }
    }

    fn do_return(&mut self, value: Value) -> Result<Step, VmError> {
        match self.call_stack.pop() {
            Some(prev) => {
                self.stack.truncate(self.ctx.sb - 1);
                self.ctx = prev;
                self.stack.push(value);
                Ok(Step::Next)
            }
            None => {
                // Top-level return: an explicit value wins over the
                // completion register.
                let result = if value.is_undefined() {
                    self.completion.clone()
                } else {
                    value
                };
                Ok(Step::Done(result))
            }
        }
    }

    // ── Stack helpers ────────────────────────────────────────────────────

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::InvalidBytecode("stack underflow".to_string()))
    }

    fn pop2(&mut self) -> Result<(Value, Value), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn peek(&self) -> Result<&Value, VmError> {
        self.stack
            .last()
            .ok_or_else(|| VmError::InvalidBytecode("stack underflow".to_string()))
    }

    fn binary_op(
        &mut self,
        op: impl Fn(&Value, &Value) -> Result<Value, VmError>,
    ) -> Result<(), VmError> {
        let (a, b) = self.pop2()?;
        let out = op(&a, &b)?;
        self.stack.push(out);
        Ok(())
    }

    fn compare_op(
        &mut self,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), VmError> {
        let (a, b) = self.pop2()?;
        let ordering = compare(&a, &b)?;
        self.stack.push(Value::Bool(accept(ordering)));
        Ok(())
    }

    fn stash_at(&self, depth: u16) -> Option<Rc<RefCell<Stash>>> {
        self.ctx
            .stash
            .as_ref()
            .and_then(|s| stash::at_depth(s, depth))
    }

    // ── Properties ───────────────────────────────────────────────────────

    fn get_property(&self, target: &Value, name: &str) -> Result<Value, VmError> {
        match target {
            Value::Object(o) => {
                let obj = o.borrow();
                if obj.class_name() == "Array" {
                    if name == "length" {
                        return Ok(Value::Int(obj.elements().len() as i32));
                    }
                    if let Ok(i) = name.parse::<usize>() {
                        return Ok(obj.elements().get(i).cloned().unwrap_or(Value::Undefined));
                    }
                }
                if let Some(v) = obj.get(name) {
                    return Ok(v);
                }
                if obj.is_callable() && name == "call" {
                    drop(obj);
                    return Ok(Value::object(Object::function(
                        "call",
                        FuncKind::BoundCall {
                            target: target.clone(),
                        },
                    )));
                }
                Ok(Value::Undefined)
            }
            Value::Str(s) => {
                if name == "length" {
                    Ok(Value::Int(s.chars().count() as i32))
                } else {
                    Ok(Value::Undefined)
                }
            }
            Value::Undefined | Value::Null => Err(VmError::TypeError(format!(
                "cannot read property '{}' of {}",
                name,
                target.to_display()
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    fn set_property(&self, target: &Value, name: &str, value: Value) -> Result<(), VmError> {
        match target {
            Value::Object(o) => {
                let mut obj = o.borrow_mut();
                if obj.class_name() == "Array" {
                    if let Ok(i) = name.parse::<usize>() {
                        let elements = obj.elements_mut();
                        if i >= elements.len() {
                            elements.resize(i + 1, Value::Undefined);
                        }
                        elements[i] = value;
                        return Ok(());
                    }
                }
                obj.set(name, value);
                Ok(())
            }
            _ => Err(VmError::TypeError(format!(
                "cannot set property '{}' on {}",
                name,
                target.to_display()
            ))),
        }
    }

    // ── Debug views ──────────────────────────────────────────────────────

    /// Capture the current call stack, innermost first.
    pub fn capture_call_stack(&self) -> Vec<StackFrame> {
        let mut frames = Vec::with_capacity(self.call_stack.len() + 1);
        frames.push(self.frame_for(&self.ctx, true));
        for ctx in self.call_stack.iter().rev() {
            frames.push(self.frame_for(ctx, false));
        }
        frames
    }

    fn frame_for(&self, ctx: &Ctx, live: bool) -> StackFrame {
        match &ctx.prg {
            Some(prg) => {
                // A saved pc points past the call instruction; step back so
                // outer frames report the call site.
                let pc = if live { ctx.pc } else { ctx.pc.saturating_sub(1) };
                let arg_end = (ctx.sb + 1 + prg.param_names.len()).min(self.stack.len());
                let arg_start = (ctx.sb + 1).min(arg_end);
                StackFrame {
                    func_name: prg.fn_name.clone(),
                    src_name: prg.src.name().clone(),
                    position: prg.position(pc),
                    stash: ctx.stash.clone(),
                    args: self.stack[arg_start..arg_end].to_vec(),
                    this: ctx.this.clone(),
                    native: false,
                }
            }
            None => StackFrame {
                func_name: ctx
                    .native_name
                    .clone()
                    .unwrap_or_else(|| Rc::from("<native>")),
                src_name: Rc::from("native"),
                position: Position::default(),
                stash: None,
                args: Vec::new(),
                this: ctx.this.clone(),
                native: true,
            },
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

// ── Numeric operations ───────────────────────────────────────────────────

fn add(a: &Value, b: &Value) -> Result<Value, VmError> {
    if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
        return Ok(Value::string(&format!(
            "{}{}",
            a.to_display(),
            b.to_display()
        )));
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x
            .checked_add(*y)
            .map(Value::Int)
            .unwrap_or(Value::Float(*x as f64 + *y as f64))),
        _ => numeric(a, b, "+").map(|(x, y)| Value::Float(x + y)),
    }
}

fn sub(a: &Value, b: &Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x
            .checked_sub(*y)
            .map(Value::Int)
            .unwrap_or(Value::Float(*x as f64 - *y as f64))),
        _ => numeric(a, b, "-").map(|(x, y)| Value::Float(x - y)),
    }
}

fn mul(a: &Value, b: &Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x
            .checked_mul(*y)
            .map(Value::Int)
            .unwrap_or(Value::Float(*x as f64 * *y as f64))),
        _ => numeric(a, b, "*").map(|(x, y)| Value::Float(x * y)),
    }
}

fn div(a: &Value, b: &Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) if *y != 0 && x % y == 0 => Ok(Value::Int(x / y)),
        _ => numeric(a, b, "/").map(|(x, y)| Value::Float(x / y)),
    }
}

fn rem(a: &Value, b: &Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) if *y != 0 => Ok(Value::Int(x % y)),
        _ => numeric(a, b, "%").map(|(x, y)| Value::Float(x % y)),
    }
}

fn numeric(a: &Value, b: &Value, op: &str) -> Result<(f64, f64), VmError> {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(VmError::TypeError(format!(
            "unsupported operands for '{}': {} and {}",
            op,
            a.to_display(),
            b.to_display()
        ))),
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, VmError> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| VmError::TypeError("comparison with NaN".to_string()));
    }
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    Err(VmError::TypeError(format!(
        "cannot compare {} and {}",
        a.to_display(),
        b.to_display()
    )))
}

/// Canonical property key for computed member access.
fn property_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.to_string(),
        other => other.to_display(),
    }
}
