//! Object model.
//!
//! Objects carry insertion-ordered string-keyed properties and a class name
//! the debugger uses for type tagging. Arrays store their elements in a
//! dense vector alongside ordinary properties; functions carry a callable
//! payload (a compiled program plus captured environment, or a host-provided
//! native closure).

use crate::compiler::Program;
use crate::vm::stash::Stash;
use crate::vm::value::Value;
use crate::vm::VmError;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Host-provided native function: `(this, args) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value, VmError>;

/// The callable payload of a function object.
#[derive(Clone)]
pub enum FuncKind {
    /// A compiled Sable function with its captured environment.
    Compiled {
        prg: Rc<Program>,
        env: Option<Rc<RefCell<Stash>>>,
    },
    /// A host-provided native function.
    Native { f: Rc<NativeFn> },
    /// The synthesized `fn.call(thisArg, ...)` method: invokes `target`
    /// with an explicit `this`.
    BoundCall { target: Value },
}

/// A heap object.
pub struct Object {
    class_name: Rc<str>,
    /// Insertion-ordered properties.
    props: Vec<(Rc<str>, Value)>,
    /// Name → index into `props`.
    index: FxHashMap<Rc<str>, usize>,
    /// Dense element storage (class "Array").
    elements: Vec<Value>,
    /// Callable payload (class "Function").
    call: Option<FuncKind>,
}

impl Object {
    /// A plain `{}` object.
    pub fn plain() -> Self {
        Self::with_class("Object")
    }

    /// An object with an explicit class name ("Array", "Error", ...).
    pub fn with_class(class_name: &str) -> Self {
        Self {
            class_name: Rc::from(class_name),
            props: Vec::new(),
            index: FxHashMap::default(),
            elements: Vec::new(),
            call: None,
        }
    }

    /// An array holding the given elements.
    pub fn array(elements: Vec<Value>) -> Self {
        let mut obj = Self::with_class("Array");
        obj.elements = elements;
        obj
    }

    /// A function object. The `name` own property is set eagerly so hosts
    /// and the debugger can read it without knowing the payload kind.
    pub fn function(name: &str, kind: FuncKind) -> Self {
        let mut obj = Self::with_class("Function");
        obj.call = Some(kind);
        obj.set("name", Value::string(name));
        obj
    }

    /// Internal class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Whether this object can be called.
    pub fn is_callable(&self) -> bool {
        self.call.is_some()
    }

    /// The callable payload, if any.
    pub fn callable(&self) -> Option<FuncKind> {
        self.call.clone()
    }

    /// Read an own property.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.index.get(name).map(|&i| self.props[i].1.clone())
    }

    /// Set (or define) an own property, preserving insertion order.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(&i) = self.index.get(name) {
            self.props[i].1 = value;
            return;
        }
        let key: Rc<str> = Rc::from(name);
        self.index.insert(key.clone(), self.props.len());
        self.props.push((key, value));
    }

    /// Own string-keyed properties in insertion order.
    pub fn own_properties(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.props.iter().map(|(k, v)| (k, v))
    }

    /// Number of own string-keyed properties.
    pub fn property_count(&self) -> usize {
        self.props.len()
    }

    /// Dense element storage (empty for non-arrays).
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    /// Mutable element storage.
    pub fn elements_mut(&mut self) -> &mut Vec<Value> {
        &mut self.elements
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class_name)
            .field("props", &self.props.len())
            .field("elements", &self.elements.len())
            .field("callable", &self.call.is_some())
            .finish()
    }
}
