//! Instruction set for the Sable VM.
//!
//! Instructions are a fixed enum with inline operands; a program's `code`
//! vector is indexed directly by the program counter, and the parallel
//! `src_map` vector carries one source byte offset (or -1) per instruction.

/// A single VM instruction.
///
/// Instructions are organized into categories:
/// - Stack manipulation & constants
/// - Variable access (stack locals, stash, globals)
/// - Objects, arrays, and properties
/// - Functions and calls
/// - Control flow
/// - Arithmetic, comparison, and logic
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    // ===== Stack manipulation & constants =====
    /// Pop and discard the top value.
    Pop,
    /// Pop the top value into the script completion register.
    PopResult,
    /// Duplicate the top value.
    Dup,
    /// Swap the top two values.
    Swap,
    /// Push `undefined`.
    ConstUndefined,
    /// Push `null`.
    ConstNull,
    /// Push `true`.
    ConstTrue,
    /// Push `false`.
    ConstFalse,
    /// Push an integer constant.
    ConstInt(i32),
    /// Push a float constant.
    ConstFloat(f64),
    /// Push a string constant from the program's string pool.
    ConstStr(u32),

    // ===== Variable access =====
    /// Load a frame-local operand-stack slot.
    LoadLocal(u16),
    /// Store the top value into a frame-local slot.
    StoreLocal(u16),
    /// Load from the heap environment chain: walk `depth` outer links, read `slot`.
    LoadStash { depth: u16, slot: u16 },
    /// Store the top value into the heap environment chain.
    StoreStash { depth: u16, slot: u16 },
    /// Load a property of the global object by name (string pool index).
    LoadGlobal(u32),
    /// Store the top value into a property of the global object.
    StoreGlobal(u32),
    /// Push the current `this` value.
    LoadThis,

    // ===== Objects & arrays =====
    /// Push a fresh empty object.
    NewObject,
    /// Pop a value and define it as a property of the object beneath it
    /// (object stays on the stack). Operand: string pool index of the key.
    DefineProp(u32),
    /// Pop `n` elements and push an array containing them in order.
    NewArray(u16),
    /// Pop an object, push the named property's value.
    GetProp(u32),
    /// Pop a value then an object, set the named property, push the value back.
    SetProp(u32),
    /// Pop a key then an object, push the element at that key.
    GetElem,
    /// Pop a value, a key, and an object, set the element, push the value back.
    SetElem,

    // ===== Functions & calls =====
    /// Instantiate nested function template `i`, capturing the current stash.
    MakeFunc(u16),
    /// Call with `argc` arguments. Stack: `[callee, this, arg0..argN]`.
    Call(u8),
    /// Return from the current function with the top value.
    Return,

    // ===== Control flow =====
    /// Unconditional jump to an absolute instruction index.
    Jump(u32),
    /// Pop a value; jump if it is falsy.
    JumpIfFalse(u32),
    /// Pop a value; jump if it is truthy.
    JumpIfTrue(u32),

    // ===== Arithmetic, comparison, logic =====
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // ===== Special =====
    /// The in-source pause directive (`debugger;`).
    Debugger,
}

impl Instr {
    /// True for the call-shaped instructions the stepping machine treats
    /// specially (deferred step-into).
    pub fn is_call(&self) -> bool {
        matches!(self, Instr::Call(_))
    }
}
