#![allow(dead_code)]

use lox_vm::vm::Heap;
use lox_vm::{Chunk, ObjRef, OpCode, Value, Vm, VmConfig};

/// Hand-assembles chunks for tests, standing in for a compiler
pub struct ChunkBuilder {
    chunk: Chunk,
    line: usize,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            line: 1,
        }
    }

    pub fn line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn op(mut self, op: OpCode) -> Self {
        self.chunk.write_op(op, self.line).unwrap();
        self
    }

    pub fn op_arg(mut self, op: OpCode, operand: u8) -> Self {
        self.chunk.write_op(op, self.line).unwrap();
        self.chunk.write(operand, self.line).unwrap();
        self
    }

    pub fn constant(mut self, value: Value) -> Self {
        self.chunk.add_constant(value).unwrap();
        self
    }

    pub fn number(self, n: f64) -> Self {
        self.constant(Value::Number(n))
    }

    pub fn string(self, heap: &mut Heap, s: &str) -> Self {
        let handle = heap.copy_string(s).unwrap();
        self.constant(Value::Obj(handle))
    }

    pub fn build(self) -> Chunk {
        self.chunk
    }

    pub fn script(self, heap: &mut Heap) -> ObjRef {
        heap.new_function(None, 0, self.chunk)
    }

    pub fn function(self, heap: &mut Heap, name: &str, arity: u8) -> ObjRef {
        let name = heap.copy_string(name).unwrap();
        heap.new_function(Some(name), arity, self.chunk)
    }
}

/// VM that prints into a buffer
pub fn buffered_vm() -> Vm<Vec<u8>> {
    Vm::with_config(Vec::new(), VmConfig::default())
}

pub fn printed(vm: &Vm<Vec<u8>>) -> String {
    String::from_utf8_lossy(vm.output()).into_owned()
}
