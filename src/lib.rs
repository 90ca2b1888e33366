// Lox Virtual Machine
// Bytecode runtime core: chunks, heap objects, and a stack-based interpreter

pub mod binary;
pub mod compiler;
pub mod error;
pub mod memory;
pub mod vm;

pub use compiler::{Chunk, OpCode};
pub use error::{
    AllocError, BinaryError, ChunkError, CompileError, ErrorKind, RuntimeError, StackFrame,
    VmError, VmResult,
};
pub use vm::{
    AllocPolicy, Compile, Heap, InterpretResult, ObjRef, Value, Vm, VmConfig, FRAMES_MAX,
    STACK_MAX,
};
