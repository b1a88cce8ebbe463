//! Value representation.
//!
//! Sable values are a tagged enum: primitives are stored inline, strings are
//! shared immutable buffers, and everything object-shaped lives behind a
//! shared heap cell. The runtime is single-threaded, so `Rc`/`RefCell` is
//! the ownership model throughout.

use crate::vm::object::{FuncKind, NativeFn, Object};
use std::cell::RefCell;
use std::rc::Rc;

/// A Sable value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    /// 32-bit integer number variant.
    Int(i32),
    /// 64-bit float number variant.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Heap object (plain object, array, or function).
    Object(Rc<RefCell<Object>>),
}

impl Value {
    /// Wrap a fresh plain object.
    pub fn object(obj: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Create a string value.
    pub fn string(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Create a host-provided native function value.
    pub fn native_function(
        name: &str,
        f: impl Fn(&Value, &[Value]) -> Result<Value, crate::vm::VmError> + 'static,
    ) -> Self {
        Value::object(Object::function(name, FuncKind::Native { f: Rc::new(f) }))
    }

    /// Create a native function from a boxed callable.
    pub fn native_function_rc(name: &str, f: Rc<NativeFn>) -> Self {
        Value::object(Object::function(name, FuncKind::Native { f }))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Either number variant, widened to f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<RefCell<Object>>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Truthiness for conditions and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Loose equality: number variants compare numerically, `null` and
    /// `undefined` are mutually equal, objects compare by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Display form used by string concatenation and diagnostics.
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::Str(s) => s.to_string(),
            Value::Object(o) => {
                let obj = o.borrow();
                if obj.is_callable() {
                    format!("function {}", obj.get("name").map(|v| v.to_display()).unwrap_or_default())
                } else if obj.class_name() == "Array" {
                    let parts: Vec<String> =
                        obj.elements().iter().map(|v| v.to_display()).collect();
                    parts.join(",")
                } else {
                    "[object Object]".to_string()
                }
            }
        }
    }
}

/// JS-style float formatting: whole floats print without a fractional part.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(o) => write!(f, "[{}]", o.borrow().class_name()),
        }
    }
}
