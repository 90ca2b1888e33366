// Lox Bytecode Disassembler
// Human-readable listing of a chunk; never mutates it

use super::chunk::Chunk;
use super::opcode::OpCode;
use crate::vm::heap::Heap;
use crate::vm::value::Value;

/// Disassemble a whole chunk, followed by any functions in its constant pool
pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, heap, offset, &mut out);
    }

    // Nested functions
    for constant in chunk.constants() {
        if let Value::Obj(handle) = constant {
            if let Some(function) = heap.function(*handle) {
                let label = heap.display(*constant).to_string();
                out.push('\n');
                out.push_str(&disassemble_chunk(&function.chunk, heap, &label));
            }
        }
    }

    out
}

/// Disassemble the instruction at `offset` into `out`.
/// Returns the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize, out: &mut String) -> usize {
    let Some(&byte) = chunk.code().get(offset) else {
        out.push_str(&format!("{:04} <end of chunk>\n", offset));
        return offset + 1;
    };

    out.push_str(&format!("{:04} ", offset));
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.line(offset)));
    }

    let op = match OpCode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            out.push_str(&format!("Unknown opcode {}\n", byte));
            return offset + 1;
        }
    };

    let next = offset + 1 + op.operand_width();
    if next > chunk.len() {
        out.push_str(&format!("{:<16} <truncated>\n", op.name()));
        return chunk.len();
    }

    match op {
        OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal | OpCode::Closure => {
            let index = chunk.code()[offset + 1] as usize;
            let value = match chunk.constants().get(index) {
                Some(value) => heap.display(*value).to_string(),
                None => "???".to_string(),
            };
            out.push_str(&format!("{:<16} {:4} '{}'\n", op.name(), index, value));
        }

        OpCode::GetLocal | OpCode::SetLocal | OpCode::Call => {
            let operand = chunk.code()[offset + 1];
            out.push_str(&format!("{:<16} {:4}\n", op.name(), operand));
        }

        OpCode::Jump | OpCode::JumpIfFalse => {
            let jump = chunk.read_u16(offset + 1) as usize;
            out.push_str(&format!("{:<16} {:4} -> {}\n", op.name(), offset, next + jump));
        }
        OpCode::Loop => {
            let jump = chunk.read_u16(offset + 1) as usize;
            let target = next as isize - jump as isize;
            out.push_str(&format!("{:<16} {:4} -> {}\n", op.name(), offset, target));
        }

        _ => {
            out.push_str(op.name());
            out.push('\n');
        }
    }

    next
}
