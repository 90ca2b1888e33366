pub mod heap;
pub mod interner;
pub mod natives;
pub mod object;
pub mod table;
pub mod value;
pub mod vm;

pub use heap::{Heap, HeapStats};
pub use interner::Interner;
pub use object::{NativeFn, Obj, ObjClosure, ObjFunction, ObjNative, ObjRef, ObjString};
pub use table::Table;
pub use value::Value;
pub use vm::{AllocPolicy, Compile, InterpretResult, Vm, VmConfig, FRAMES_MAX, STACK_MAX};
