// Lox Bytecode Chunk
// Contains bytecode, constants, and one line entry per code byte

use super::opcode::OpCode;
use crate::error::{AllocError, ChunkError};
use crate::memory;
use crate::vm::value::Value;

/// A chunk of bytecode
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    /// Raw bytecode
    code: Vec<u8>,
    /// Source line for each byte of `code`
    lines: Vec<usize>,
    /// Constant pool
    constants: Vec<Value>,
    /// Logical capacity of `code` and `lines`
    capacity: usize,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a single byte to the chunk with its source line
    pub fn write(&mut self, byte: u8, line: usize) -> Result<(), AllocError> {
        if self.code.len() == self.capacity {
            let old_capacity = self.capacity;
            let new_capacity = memory::grow_capacity(old_capacity);
            memory::reallocate(&mut self.code, old_capacity, new_capacity)?;
            memory::reallocate(&mut self.lines, old_capacity, new_capacity)?;
            self.capacity = new_capacity;
        }

        self.code.push(byte);
        self.lines.push(line);
        Ok(())
    }

    /// Write an opcode to the chunk
    pub fn write_op(&mut self, op: OpCode, line: usize) -> Result<(), AllocError> {
        self.write(op.into(), line)
    }

    /// Write a u16 operand (big-endian)
    pub fn write_u16(&mut self, value: u16, line: usize) -> Result<(), AllocError> {
        let [hi, lo] = value.to_be_bytes();
        self.write(hi, line)?;
        self.write(lo, line)
    }

    /// Add a constant and return its index
    pub fn add_constant(&mut self, value: Value) -> Result<usize, AllocError> {
        let count = self.constants.len();
        if count == self.constants.capacity() {
            let new_capacity = memory::grow_capacity(count);
            memory::reallocate(&mut self.constants, count, new_capacity)?;
        }

        self.constants.push(value);
        Ok(count)
    }

    /// Emit a forward jump with a placeholder operand.
    /// Returns the offset of the operand for `patch_jump`.
    pub fn emit_jump(&mut self, op: OpCode, line: usize) -> Result<usize, AllocError> {
        self.write_op(op, line)?;
        self.write_u16(u16::MAX, line)?;
        Ok(self.code.len() - 2)
    }

    /// Patch a jump operand so it lands on the next byte to be written
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), ChunkError> {
        let distance = self.code.len() - offset - 2;
        let jump = u16::try_from(distance).map_err(|_| ChunkError::JumpTooLarge { distance })?;

        let [hi, lo] = jump.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
        Ok(())
    }

    /// Emit a backward jump to `loop_start`
    pub fn emit_loop(&mut self, loop_start: usize, line: usize) -> Result<(), ChunkError> {
        self.write_op(OpCode::Loop, line)?;

        let distance = self.code.len() - loop_start + 2;
        let jump = u16::try_from(distance).map_err(|_| ChunkError::JumpTooLarge { distance })?;
        self.write_u16(jump, line)?;
        Ok(())
    }

    /// Read a u16 at the given offset
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Get line number for the byte at offset
    pub fn line(&self, offset: usize) -> usize {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    pub fn constant(&self, index: usize) -> Value {
        self.constants[index]
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_chunk_is_empty() {
        let chunk = Chunk::new();
        assert_eq!(chunk.len(), 0);
        assert_eq!(chunk.capacity(), 0);
        assert!(chunk.constants().is_empty());
    }

    #[test]
    fn write_records_byte_and_line() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Return, 123).unwrap();
        assert_eq!(chunk.code(), &[OpCode::Return as u8]);
        assert_eq!(chunk.lines(), &[123]);
        assert_eq!(chunk.line(0), 123);
    }

    #[test]
    fn capacity_grows_from_eight_then_doubles() {
        let mut chunk = Chunk::new();
        chunk.write(0, 1).unwrap();
        assert_eq!(chunk.capacity(), 8);
        for _ in 1..8 {
            chunk.write(0, 1).unwrap();
        }
        assert_eq!(chunk.capacity(), 8);
        chunk.write(0, 1).unwrap();
        assert_eq!(chunk.capacity(), 16);
        for _ in 9..17 {
            chunk.write(0, 2).unwrap();
        }
        assert_eq!(chunk.capacity(), 32);
        assert_eq!(chunk.len(), 17);
        assert_eq!(chunk.lines().len(), chunk.len());
    }

    #[test]
    fn add_constant_returns_sequential_indices() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.2)).unwrap(), 0);
        assert_eq!(chunk.add_constant(Value::Nil).unwrap(), 1);
        assert_eq!(chunk.add_constant(Value::Bool(true)).unwrap(), 2);
        assert_eq!(chunk.constant(0), Value::Number(1.2));
        assert_eq!(chunk.constant(2), Value::Bool(true));
    }

    #[test]
    fn u16_operands_are_big_endian() {
        let mut chunk = Chunk::new();
        chunk.write_u16(0x1234, 1).unwrap();
        assert_eq!(chunk.code(), &[0x12, 0x34]);
        assert_eq!(chunk.read_u16(0), 0x1234);
    }

    #[test]
    fn patch_jump_targets_next_byte() {
        let mut chunk = Chunk::new();
        let operand = chunk.emit_jump(OpCode::JumpIfFalse, 1).unwrap();
        chunk.write_op(OpCode::Nil, 1).unwrap();
        chunk.write_op(OpCode::Pop, 1).unwrap();
        chunk.patch_jump(operand).unwrap();
        assert_eq!(operand, 1);
        assert_eq!(chunk.read_u16(operand), 2);
    }

    #[test]
    fn patch_jump_rejects_long_distances() {
        let mut chunk = Chunk::new();
        let operand = chunk.emit_jump(OpCode::Jump, 1).unwrap();
        for _ in 0..=u16::MAX as usize {
            chunk.write(OpCode::Nil as u8, 1).unwrap();
        }
        assert!(matches!(
            chunk.patch_jump(operand),
            Err(ChunkError::JumpTooLarge { .. })
        ));
    }

    #[test]
    fn emit_loop_jumps_back_over_itself() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1).unwrap();
        chunk.write_op(OpCode::Pop, 1).unwrap();
        chunk.emit_loop(0, 1).unwrap();
        // ip after reading the operand is 5; 5 - 5 == 0
        assert_eq!(chunk.read_u16(3), 5);
    }
}
