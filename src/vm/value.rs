// Lox Runtime Values
// Immediate values are stored inline; heap objects are referenced by handle

use super::object::ObjRef;

/// Runtime value types
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    Bool(bool),
    #[default]
    Nil,
    Number(f64),
    /// Non-owning handle into the heap registry
    Obj(ObjRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Nil => "Nil",
            Value::Number(_) => "Number",
            Value::Obj(_) => "Object",
        }
    }

    /// `nil` and `false` are falsy, everything else is truthy
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }
}

// Objects compare by handle. Interning makes that content equality for strings.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}
