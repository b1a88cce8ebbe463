//! Compiled programs.
//!
//! Each function body (and the top-level script) compiles to its own
//! [`Program`]. `code` and `src_map` are parallel arrays indexed by the
//! program counter; `src_map[pc]` is the source byte offset of the
//! instruction at `pc`, or `-1` when the instruction has no source position
//! (synthetic prologue/epilogue code).

use crate::compiler::instr::Instr;
use crate::source::{Position, SourceFile};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static NEXT_PROGRAM_ID: AtomicU32 = AtomicU32::new(1);

/// A compiled function body or top-level script.
#[derive(Debug)]
pub struct Program {
    /// Process-unique program id; the breakpoint index keys on `(id, pc)`.
    pub id: u32,
    /// Function name ("" for the top-level script and anonymous functions).
    pub fn_name: Rc<str>,
    /// Parameter names in declaration order.
    pub param_names: Vec<Rc<str>>,
    /// Number of frame-local operand-stack slots (parameters included).
    pub local_count: u16,
    /// Heap-environment slot names in slot order. Empty when the function
    /// has no spilled bindings.
    pub stash_names: Vec<Rc<str>>,
    /// Name → heap-environment slot, cloned into each activation's stash.
    pub stash_template: FxHashMap<Rc<str>, u32>,
    /// Instruction stream.
    pub code: Vec<Instr>,
    /// Parallel source map: byte offset of `code[pc]`, or -1.
    pub src_map: Vec<i32>,
    /// String pool referenced by `ConstStr`, property, and global instructions.
    pub strings: Vec<Rc<str>>,
    /// Programs of immediately nested function literals, indexed by `MakeFunc`.
    pub functions: Vec<Rc<Program>>,
    /// The source this program was compiled from.
    pub src: Arc<SourceFile>,
}

impl Program {
    /// Allocate a fresh program id.
    pub(crate) fn next_id() -> u32 {
        NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Source byte offset of the instruction at `pc`, if it has one.
    pub fn source_offset(&self, pc: usize) -> Option<u32> {
        match self.src_map.get(pc) {
            Some(&off) if off >= 0 => Some(off as u32),
            _ => None,
        }
    }

    /// Source position of the instruction at `pc`, or a zeroed position.
    pub fn position(&self, pc: usize) -> Position {
        match self.source_offset(pc) {
            Some(off) => self.src.position(off),
            None => Position {
                filename: self.src.name().clone(),
                line: 0,
                column: 0,
            },
        }
    }

    /// 1-based source line of the instruction at `pc`, if it has one.
    pub fn line(&self, pc: usize) -> Option<u32> {
        self.source_offset(pc).map(|off| self.src.line_of(off))
    }

    /// Look up a string-pool entry.
    pub fn string(&self, index: u32) -> &Rc<str> {
        &self.strings[index as usize]
    }

}

/// Depth-first walk over a program and every nested function program.
pub fn walk_programs(root: &Rc<Program>, f: &mut impl FnMut(&Rc<Program>)) {
    f(root);
    for nested in &root.functions {
        walk_programs(nested, f);
    }
}
