//! The variable materializer.
//!
//! Resolves a reference handle into a list of variables: frame locals from
//! the heap environment, globals from the global object, or an arbitrary
//! object's own string-keyed properties. Composite values get fresh
//! positive handles so clients can browse graphs (including cycles) lazily.

use crate::debug::refs::{RefEntry, RefRegistry};
use crate::debug::shared::DebugShared;
use crate::debug::snapshot::{self, decode_lazy_ref, ScopeKind, Variable};
use crate::vm::{Object, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Materialize the variables behind a reference handle.
///
/// Unknown, stale, and zero handles return an empty list; the materializer
/// never fails.
pub(crate) fn get_variables(shared: &DebugShared, reference: i32) -> Vec<Variable> {
    if reference == 0 {
        return Vec::new();
    }

    let mut state = shared.state.write();
    if let Some((frame, kind)) = decode_lazy_ref(reference) {
        return scope_variables(shared, &mut state.refs, frame, kind);
    }

    let entry = state.refs.get(reference).cloned();
    match entry {
        None => Vec::new(),
        Some(RefEntry::Scope { frame, kind }) => {
            scope_variables(shared, &mut state.refs, frame, kind)
        }
        Some(RefEntry::Object(obj)) => object_properties(&mut state.refs, &obj),
    }
}

fn scope_variables(
    shared: &DebugShared,
    refs: &mut RefRegistry,
    frame_index: usize,
    kind: ScopeKind,
) -> Vec<Variable> {
    match kind {
        ScopeKind::Local => {
            let frames = shared.paused_frames.borrow();
            let frame = match frames.get(frame_index) {
                Some(f) => f,
                None => return Vec::new(),
            };
            let stash = match &frame.stash {
                Some(s) => s.clone(),
                None => return Vec::new(),
            };
            let entries = stash.borrow().entries();
            entries
                .iter()
                .map(|(name, value)| make_variable(refs, name, value))
                .collect()
        }
        ScopeKind::Global => {
            let globals = shared.globals.borrow();
            globals
                .own_properties()
                .map(|(name, value)| make_variable(refs, name, value))
                .collect()
        }
        // Closure scopes are folded into Local in this iteration.
        ScopeKind::Closure => Vec::new(),
    }
}

/// Enumerate an object's own string-keyed properties (array elements first,
/// in index order). Enumeration order is the object's own iteration order;
/// clients that need stable order must sort.
fn object_properties(refs: &mut RefRegistry, obj: &Rc<RefCell<Object>>) -> Vec<Variable> {
    let o = obj.borrow();
    let mut out = Vec::with_capacity(o.elements().len() + o.property_count());
    for (i, value) in o.elements().iter().enumerate() {
        out.push(make_variable(refs, &i.to_string(), value));
    }
    for (name, value) in o.own_properties() {
        out.push(make_variable(refs, name, value));
    }
    out
}

fn make_variable(refs: &mut RefRegistry, name: &str, value: &Value) -> Variable {
    let variables_ref = match value {
        Value::Object(o) => refs.alloc(RefEntry::Object(o.clone())),
        _ => 0,
    };
    Variable {
        name: name.to_string(),
        value: value.clone(),
        type_tag: snapshot::type_tag(value),
        variables_ref,
    }
}
