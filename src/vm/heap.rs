// Lox Object Heap
// Registry of every live heap object plus the string intern set
//
// Objects are never collected while the VM runs. The registry is drained
// once, when the heap is dropped.

use super::interner::Interner;
use super::object::{
    hash_string, NativeFn, Obj, ObjClosure, ObjFunction, ObjNative, ObjRef, ObjString,
};
use super::value::Value;
use crate::compiler::Chunk;
use crate::error::AllocError;
use crate::memory;
use slotmap::SlotMap;
use std::fmt;

/// Heap statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total objects ever registered
    pub objects_allocated: usize,
    /// Objects released by `free_objects`
    pub objects_freed: usize,
    /// Distinct strings added to the intern set
    pub strings_interned: usize,
    /// String requests answered by an existing object
    pub intern_hits: usize,
    /// Buffers handed to `take_string` and released on an intern hit
    pub buffers_released: usize,
}

impl HeapStats {
    pub fn live(&self) -> usize {
        self.objects_allocated - self.objects_freed
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "objects allocated: {}", self.objects_allocated)?;
        writeln!(f, "objects freed:     {}", self.objects_freed)?;
        writeln!(f, "objects live:      {}", self.live())?;
        writeln!(f, "strings interned:  {}", self.strings_interned)?;
        writeln!(f, "intern hits:       {}", self.intern_hits)?;
        write!(f, "buffers released:  {}", self.buffers_released)
    }
}

/// The object heap
#[derive(Debug, Default)]
pub struct Heap {
    objects: SlotMap<ObjRef, Obj>,
    strings: Interner,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object. Every variant enters the heap through here.
    pub fn allocate_object(&mut self, obj: Obj) -> ObjRef {
        let kind = obj.type_name();
        let handle = self.objects.insert(obj);
        self.stats.objects_allocated += 1;
        tracing::debug!(?handle, kind, "allocate object");
        handle
    }

    /// Intern a copy of `chars`
    pub fn copy_string(&mut self, chars: &str) -> Result<ObjRef, AllocError> {
        let hash = hash_string(chars);
        if let Some(existing) = self.strings.find_interned(&self.objects, chars, hash) {
            self.stats.intern_hits += 1;
            return Ok(existing);
        }

        let mut buffer = memory::allocate_string(chars.len())?;
        buffer.push_str(chars);
        Ok(self.register_string(buffer.into_boxed_str(), hash))
    }

    /// Intern an owned buffer. On an intern hit the buffer is released
    /// immediately and the existing object is returned.
    pub fn take_string(&mut self, chars: String) -> Result<ObjRef, AllocError> {
        let hash = hash_string(&chars);
        if let Some(existing) = self.strings.find_interned(&self.objects, &chars, hash) {
            self.stats.intern_hits += 1;
            self.stats.buffers_released += 1;
            tracing::debug!(len = chars.len(), "intern hit, releasing buffer");
            drop(chars);
            return Ok(existing);
        }

        Ok(self.register_string(chars.into_boxed_str(), hash))
    }

    fn register_string(&mut self, chars: Box<str>, hash: u32) -> ObjRef {
        let handle = self.allocate_object(Obj::String(ObjString { chars, hash }));
        self.strings.insert(hash, handle);
        self.stats.strings_interned += 1;
        handle
    }

    /// Look up an interned string without allocating
    pub fn find_string(&self, chars: &str) -> Option<ObjRef> {
        self.strings
            .find_interned(&self.objects, chars, hash_string(chars))
    }

    pub fn new_function(&mut self, name: Option<ObjRef>, arity: u8, chunk: Chunk) -> ObjRef {
        self.allocate_object(Obj::Function(ObjFunction { arity, chunk, name }))
    }

    pub fn new_native(&mut self, name: &str, function: NativeFn) -> Result<ObjRef, AllocError> {
        let mut buffer = memory::allocate_string(name.len())?;
        buffer.push_str(name);
        Ok(self.allocate_object(Obj::Native(ObjNative {
            name: buffer.into_boxed_str(),
            function,
        })))
    }

    pub fn new_closure(&mut self, function: ObjRef) -> ObjRef {
        self.allocate_object(Obj::Closure(ObjClosure { function }))
    }

    pub fn get(&self, handle: ObjRef) -> Option<&Obj> {
        self.objects.get(handle)
    }

    pub fn get_mut(&mut self, handle: ObjRef) -> Option<&mut Obj> {
        self.objects.get_mut(handle)
    }

    pub fn string(&self, handle: ObjRef) -> Option<&ObjString> {
        match self.objects.get(handle) {
            Some(Obj::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn function(&self, handle: ObjRef) -> Option<&ObjFunction> {
        match self.objects.get(handle) {
            Some(Obj::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, handle: ObjRef) -> Option<&mut ObjFunction> {
        match self.objects.get_mut(handle) {
            Some(Obj::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn native(&self, handle: ObjRef) -> Option<&ObjNative> {
        match self.objects.get(handle) {
            Some(Obj::Native(n)) => Some(n),
            _ => None,
        }
    }

    pub fn closure(&self, handle: ObjRef) -> Option<&ObjClosure> {
        match self.objects.get(handle) {
            Some(Obj::Closure(c)) => Some(c),
            _ => None,
        }
    }

    /// Name used for a function in stack traces
    pub fn function_name(&self, function: ObjRef) -> String {
        self.function(function)
            .and_then(|f| f.name)
            .and_then(|name| self.string(name))
            .map_or_else(|| "script".to_string(), |s| s.as_str().to_string())
    }

    /// Live interned strings
    pub fn strings(&self) -> impl Iterator<Item = (ObjRef, &ObjString)> {
        self.objects.iter().filter_map(|(handle, obj)| match obj {
            Obj::String(s) => Some((handle, s)),
            _ => None,
        })
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Print adapter for a value, matching what `PRINT` writes
    pub fn display(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay { heap: self, value }
    }

    /// Release every registered object. Returns how many were released.
    pub fn free_objects(&mut self) -> usize {
        self.strings.clear();

        let (mut strings, mut functions, mut natives, mut closures) = (0, 0, 0, 0);
        for (_, obj) in self.objects.drain() {
            match obj {
                Obj::String(s) => {
                    strings += 1;
                    drop(s.chars);
                }
                Obj::Function(f) => {
                    functions += 1;
                    drop(f.chunk);
                }
                Obj::Native(_) => natives += 1,
                Obj::Closure(_) => closures += 1,
            }
        }

        let freed = strings + functions + natives + closures;
        self.stats.objects_freed += freed;
        tracing::debug!(strings, functions, natives, closures, "freed objects");
        freed
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let freed = self.free_objects();
        tracing::info!(freed, stats = ?self.stats, "heap torn down");
    }
}

/// Display adapter returned by [`Heap::display`]
pub struct ValueDisplay<'a> {
    heap: &'a Heap,
    value: Value,
}

impl ValueDisplay<'_> {
    fn fmt_function(&self, f: &mut fmt::Formatter<'_>, function: &ObjFunction) -> fmt::Result {
        match function.name.and_then(|name| self.heap.string(name)) {
            Some(name) => write!(f, "<fn {}>", name.as_str()),
            None => write!(f, "<script>"),
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(Obj::String(s)) => write!(f, "{}", s.as_str()),
                Some(Obj::Function(function)) => self.fmt_function(f, function),
                Some(Obj::Native(native)) => write!(f, "<native fn {}>", native.name),
                Some(Obj::Closure(closure)) => match self.heap.function(closure.function) {
                    Some(function) => self.fmt_function(f, function),
                    None => write!(f, "<closure>"),
                },
                None => write!(f, "<freed object>"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_nil(_: usize, _: &[Value]) -> Value {
        Value::Nil
    }

    #[test]
    fn copy_string_interns_equal_content() {
        let mut heap = Heap::new();
        let a = heap.copy_string("hello").unwrap();
        let b = heap.copy_string("hello").unwrap();
        let c = heap.copy_string("world").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.stats().intern_hits, 1);
    }

    #[test]
    fn take_string_releases_buffer_on_hit() {
        let mut heap = Heap::new();
        let a = heap.copy_string("ab").unwrap();
        let b = heap.take_string(String::from("ab")).unwrap();
        assert_eq!(a, b);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.stats().buffers_released, 1);

        let c = heap.take_string(String::from("abc")).unwrap();
        assert_ne!(a, c);
        assert_eq!(heap.string(c).unwrap().as_str(), "abc");
    }

    #[test]
    fn display_matches_print_format() {
        let mut heap = Heap::new();
        let name = heap.copy_string("fib").unwrap();
        let function = heap.new_function(Some(name), 1, Chunk::new());
        let script = heap.new_function(None, 0, Chunk::new());
        let closure = heap.new_closure(function);
        let native = heap.new_native("clock", native_nil).unwrap();

        assert_eq!(heap.display(Value::Number(3.0)).to_string(), "3");
        assert_eq!(heap.display(Value::Number(2.5)).to_string(), "2.5");
        assert_eq!(heap.display(Value::Nil).to_string(), "nil");
        assert_eq!(heap.display(Value::Bool(false)).to_string(), "false");
        assert_eq!(heap.display(Value::Obj(name)).to_string(), "fib");
        assert_eq!(heap.display(Value::Obj(function)).to_string(), "<fn fib>");
        assert_eq!(heap.display(Value::Obj(closure)).to_string(), "<fn fib>");
        assert_eq!(heap.display(Value::Obj(script)).to_string(), "<script>");
        assert_eq!(heap.display(Value::Obj(native)).to_string(), "<native fn clock>");
    }

    #[test]
    fn function_name_defaults_to_script() {
        let mut heap = Heap::new();
        let script = heap.new_function(None, 0, Chunk::new());
        let name = heap.copy_string("f").unwrap();
        let f = heap.new_function(Some(name), 0, Chunk::new());
        assert_eq!(heap.function_name(script), "script");
        assert_eq!(heap.function_name(f), "f");
    }

    #[test]
    fn free_objects_releases_each_object_once() {
        let mut heap = Heap::new();
        let name = heap.copy_string("f").unwrap();
        let f = heap.new_function(Some(name), 0, Chunk::new());
        heap.new_closure(f);
        heap.new_native("n", native_nil).unwrap();

        assert_eq!(heap.free_objects(), 4);
        assert!(heap.is_empty());
        assert_eq!(heap.free_objects(), 0);
        assert_eq!(heap.stats().objects_freed, 4);
        assert_eq!(heap.stats().live(), 0);
        // The intern set is cleared with the registry
        let again = heap.copy_string("f").unwrap();
        assert_eq!(heap.string(again).unwrap().as_str(), "f");
    }
}
