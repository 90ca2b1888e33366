// Lox Bytecode Files
// Serializes a compiled function tree to bytes and loads it back into a heap
//
// Layout: MAGIC, VERSION, then one function record:
//   name (u8 flag + string), arity u8,
//   u32 constant count, constants (u8 tag + payload),
//   u32 code length, code bytes,
//   u32 line count, u32 lines
// Integers are little-endian; strings are u32 length + UTF-8 bytes.

use crate::compiler::{Chunk, OpCode};
use crate::error::BinaryError;
use crate::vm::heap::Heap;
use crate::vm::object::{Obj, ObjRef};
use crate::vm::value::Value;

const MAGIC: &[u8; 4] = b"LOXC";
const VERSION: u8 = 1;

/// Deepest function nesting accepted when loading
pub const MAX_NESTING: usize = 64;

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_FUNCTION: u8 = 4;

pub fn serialize(heap: &Heap, function: ObjRef) -> Result<Vec<u8>, BinaryError> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    serialize_function(&mut out, heap, function)?;
    Ok(out)
}

/// Load a function tree into `heap`, returning the top-level function
pub fn deserialize(data: &[u8], heap: &mut Heap) -> Result<ObjRef, BinaryError> {
    if data.len() < MAGIC.len() + 1 || &data[0..4] != MAGIC {
        return Err(BinaryError::BadMagic);
    }
    let mut cursor = 4;

    let version = data[cursor];
    if version != VERSION {
        return Err(BinaryError::UnsupportedVersion(version));
    }
    cursor += 1;

    let function = deserialize_function(data, &mut cursor, heap, 0)?;
    if cursor != data.len() {
        return Err(BinaryError::TrailingBytes(data.len() - cursor));
    }
    Ok(function)
}

// ==================== Writing ====================

fn serialize_function(out: &mut Vec<u8>, heap: &Heap, function: ObjRef) -> Result<(), BinaryError> {
    let f = heap
        .function(function)
        .ok_or(BinaryError::DanglingHandle { expected: "function" })?;

    match f.name {
        Some(name) => {
            let name = heap
                .string(name)
                .ok_or(BinaryError::DanglingHandle { expected: "string" })?;
            out.push(1);
            write_string(out, name.as_str())?;
        }
        None => out.push(0),
    }
    out.push(f.arity);

    let chunk = &f.chunk;
    write_len(out, chunk.constants().len(), "constant pool")?;
    for constant in chunk.constants() {
        serialize_constant(out, heap, *constant)?;
    }

    write_len(out, chunk.len(), "code")?;
    out.extend_from_slice(chunk.code());

    write_len(out, chunk.lines().len(), "line table")?;
    for line in chunk.lines() {
        let line = u32::try_from(*line).map_err(|_| BinaryError::TooLarge("line number"))?;
        write_u32(out, line);
    }
    Ok(())
}

fn serialize_constant(out: &mut Vec<u8>, heap: &Heap, constant: Value) -> Result<(), BinaryError> {
    match constant {
        Value::Nil => out.push(TAG_NIL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(b as u8);
        }
        Value::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::Obj(handle) => match heap.get(handle) {
            Some(Obj::String(s)) => {
                out.push(TAG_STRING);
                write_string(out, s.as_str())?;
            }
            Some(Obj::Function(_)) => {
                out.push(TAG_FUNCTION);
                serialize_function(out, heap, handle)?;
            }
            Some(other) => {
                return Err(BinaryError::UnsupportedConstant {
                    kind: other.type_name(),
                })
            }
            None => return Err(BinaryError::DanglingHandle { expected: "object" }),
        },
    }
    Ok(())
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_len(out: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), BinaryError> {
    let len = u32::try_from(len).map_err(|_| BinaryError::TooLarge(what))?;
    write_u32(out, len);
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), BinaryError> {
    write_len(out, s.len(), "string")?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

// ==================== Reading ====================

fn deserialize_function(
    data: &[u8],
    cursor: &mut usize,
    heap: &mut Heap,
    depth: usize,
) -> Result<ObjRef, BinaryError> {
    if depth >= MAX_NESTING {
        return Err(BinaryError::NestingTooDeep(MAX_NESTING));
    }

    let name = match read_u8(data, cursor)? {
        0 => None,
        _ => {
            let name = read_str(data, cursor)?;
            Some(heap.copy_string(name)?)
        }
    };
    let arity = read_u8(data, cursor)?;

    let mut chunk = Chunk::new();
    let constant_count = read_u32(data, cursor)? as usize;
    for _ in 0..constant_count {
        let constant = deserialize_constant(data, cursor, heap, depth)?;
        chunk.add_constant(constant)?;
    }

    let code_len = read_u32(data, cursor)? as usize;
    let code = read_bytes(data, cursor, code_len)?;

    let line_count = read_u32(data, cursor)? as usize;
    if line_count != code_len {
        return Err(BinaryError::LineCountMismatch {
            code: code_len,
            lines: line_count,
        });
    }
    for byte in code {
        let line = read_u32(data, cursor)? as usize;
        chunk.write(*byte, line)?;
    }

    validate(&chunk, heap)?;
    Ok(heap.new_function(name, arity, chunk))
}

fn deserialize_constant(
    data: &[u8],
    cursor: &mut usize,
    heap: &mut Heap,
    depth: usize,
) -> Result<Value, BinaryError> {
    match read_u8(data, cursor)? {
        TAG_NIL => Ok(Value::Nil),
        TAG_BOOL => Ok(Value::Bool(read_u8(data, cursor)? != 0)),
        TAG_NUMBER => {
            let bytes = read_bytes(data, cursor, 8)?;
            let mut le = [0u8; 8];
            le.copy_from_slice(bytes);
            Ok(Value::Number(f64::from_le_bytes(le)))
        }
        TAG_STRING => {
            let s = read_str(data, cursor)?;
            Ok(Value::Obj(heap.copy_string(s)?))
        }
        TAG_FUNCTION => Ok(Value::Obj(deserialize_function(
            data,
            cursor,
            heap,
            depth + 1,
        )?)),
        tag => Err(BinaryError::UnknownConstantTag(tag)),
    }
}

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, BinaryError> {
    let byte = *data.get(*cursor).ok_or(BinaryError::UnexpectedEof)?;
    *cursor += 1;
    Ok(byte)
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, BinaryError> {
    let bytes = read_bytes(data, cursor, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes<'a>(data: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], BinaryError> {
    let end = cursor.checked_add(len).ok_or(BinaryError::UnexpectedEof)?;
    let bytes = data.get(*cursor..end).ok_or(BinaryError::UnexpectedEof)?;
    *cursor = end;
    Ok(bytes)
}

fn read_str<'a>(data: &'a [u8], cursor: &mut usize) -> Result<&'a str, BinaryError> {
    let len = read_u32(data, cursor)? as usize;
    let bytes = read_bytes(data, cursor, len)?;
    std::str::from_utf8(bytes).map_err(|_| BinaryError::InvalidUtf8)
}

/// Check that every instruction decodes and its operands stay inside the
/// chunk, so a loaded file cannot index out of bounds at run time.
fn validate(chunk: &Chunk, heap: &Heap) -> Result<(), BinaryError> {
    let invalid = |offset: usize, reason: String| BinaryError::InvalidBytecode { offset, reason };
    let code = chunk.code();

    let mut offset = 0;
    while offset < code.len() {
        let op = OpCode::try_from(code[offset])
            .map_err(|_| invalid(offset, format!("unknown opcode {}", code[offset])))?;
        let next = offset + 1 + op.operand_width();
        if next > code.len() {
            return Err(invalid(offset, format!("truncated {} operand", op.name())));
        }

        match op {
            OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal | OpCode::Closure => {
                let index = code[offset + 1] as usize;
                let constant = chunk
                    .constants()
                    .get(index)
                    .ok_or_else(|| invalid(offset, format!("constant {} out of range", index)))?;

                let expected = match op {
                    OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal => constant
                        .as_obj()
                        .and_then(|handle| heap.string(handle))
                        .map(|_| ())
                        .ok_or("string"),
                    OpCode::Closure => constant
                        .as_obj()
                        .and_then(|handle| heap.function(handle))
                        .map(|_| ())
                        .ok_or("function"),
                    _ => Ok(()),
                };
                if let Err(kind) = expected {
                    return Err(invalid(offset, format!("{} expects a {} constant", op.name(), kind)));
                }
            }
            OpCode::Jump | OpCode::JumpIfFalse => {
                let target = next + chunk.read_u16(offset + 1) as usize;
                if target > code.len() {
                    return Err(invalid(offset, format!("jump target {} past end", target)));
                }
            }
            OpCode::Loop => {
                if (chunk.read_u16(offset + 1) as usize) > next {
                    return Err(invalid(offset, "loop target before start".to_string()));
                }
            }
            _ => {}
        }

        offset = next;
    }
    Ok(())
}
