pub mod chunk;
pub mod disassembler;
pub mod opcode;

pub use chunk::Chunk;
pub use disassembler::{disassemble_chunk, disassemble_instruction};
pub use opcode::{InvalidOpcode, OpCode};
