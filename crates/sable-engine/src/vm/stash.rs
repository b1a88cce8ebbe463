//! Heap environments.
//!
//! A stash is a function activation's named-binding store: a slot vector
//! plus a name → slot map, linked to the defining activation's stash. With
//! the debug-mode compile switch on, every declared name of a function lives
//! here; otherwise only names captured by nested functions do.

use crate::compiler::Program;
use crate::vm::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// One activation's heap environment.
pub struct Stash {
    names: FxHashMap<Rc<str>, u32>,
    values: Vec<Value>,
    outer: Option<Rc<RefCell<Stash>>>,
}

impl Stash {
    /// Create the stash for an activation of `prg`, chained to the
    /// function's captured environment. Every activation gets exactly one
    /// stash level (possibly empty) so compile-time depths stay uniform.
    pub fn for_program(prg: &Program, outer: Option<Rc<RefCell<Stash>>>) -> Rc<RefCell<Stash>> {
        Rc::new(RefCell::new(Stash {
            names: prg.stash_template.clone(),
            values: vec![Value::Undefined; prg.stash_names.len()],
            outer,
        }))
    }

    /// Read a slot.
    pub fn get(&self, slot: u16) -> Value {
        self.values
            .get(slot as usize)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Write a slot.
    pub fn set(&mut self, slot: u16, value: Value) {
        if let Some(cell) = self.values.get_mut(slot as usize) {
            *cell = value;
        }
    }

    /// The enclosing environment.
    pub fn outer(&self) -> Option<&Rc<RefCell<Stash>>> {
        self.outer.as_ref()
    }

    /// `(name, value)` pairs in declaration (slot) order.
    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        let mut pairs: Vec<(Rc<str>, u32)> =
            self.names.iter().map(|(k, &v)| (k.clone(), v)).collect();
        pairs.sort_by_key(|(_, slot)| *slot);
        pairs
            .into_iter()
            .map(|(name, slot)| {
                let value = self
                    .values
                    .get(slot as usize)
                    .cloned()
                    .unwrap_or(Value::Undefined);
                (name, value)
            })
            .collect()
    }
}

/// Walk `depth` outer links from `start`.
pub fn at_depth(start: &Rc<RefCell<Stash>>, depth: u16) -> Option<Rc<RefCell<Stash>>> {
    let mut cur = start.clone();
    for _ in 0..depth {
        let next = cur.borrow().outer().cloned();
        cur = next?;
    }
    Some(cur)
}
