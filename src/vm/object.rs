// Lox Heap Objects
// One variant per heap kind; every object lives in the heap registry

use super::value::Value;
use crate::compiler::Chunk;
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Copyable handle to an object in the heap registry
    pub struct ObjRef;
}

/// Host function signature: argument count and the argument window
pub type NativeFn = fn(usize, &[Value]) -> Value;

/// Heap object types
#[derive(Debug)]
pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "String",
            Obj::Function(_) => "Function",
            Obj::Native(_) => "Native",
            Obj::Closure(_) => "Closure",
        }
    }
}

/// Interned string with its cached hash
#[derive(Debug)]
pub struct ObjString {
    pub chars: Box<str>,
    pub hash: u32,
}

impl ObjString {
    pub fn new(chars: Box<str>) -> Self {
        let hash = hash_string(&chars);
        Self { chars, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.chars
    }
}

/// Compiled function: arity, owned bytecode, and optional name
#[derive(Debug, Default)]
pub struct ObjFunction {
    pub arity: u8,
    pub chunk: Chunk,
    /// Interned name; `None` for the top-level script
    pub name: Option<ObjRef>,
}

pub struct ObjNative {
    pub name: Box<str>,
    pub function: NativeFn,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// Callable wrapper around a function
#[derive(Debug, Clone, Copy)]
pub struct ObjClosure {
    pub function: ObjRef,
}

/// 32-bit FNV-1a
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in chars.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
