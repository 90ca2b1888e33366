// Lox Bytecode Instructions

/// Bytecode operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Literals
    Constant, // Push constant onto stack
    Nil,      // Push nil
    True,     // Push true
    False,    // Push false

    // Comparison operations
    Equal,   // a == b
    Greater, // a > b
    Less,    // a < b

    // Arithmetic operations
    Add,      // a + b (numbers or strings)
    Subtract, // a - b
    Multiply, // a * b
    Divide,   // a / b

    // Logical / unary
    Not,    // !a
    Negate, // -a

    // Statements
    Return, // Return from function
    Print,  // Print top of stack
    Pop,    // Pop top of stack

    // Globals
    DefineGlobal, // Define global variable
    GetGlobal,    // Get global variable
    SetGlobal,    // Set global variable

    // Locals
    GetLocal, // Get local variable
    SetLocal, // Set local variable

    // Control flow
    JumpIfFalse, // Pop condition, jump forward if falsy
    Jump,        // Unconditional forward jump
    Loop,        // Jump backward

    // Functions
    Call,    // Call function
    Closure, // Wrap function constant in a closure
}

impl OpCode {
    pub const ALL: [OpCode; 26] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Return,
        OpCode::Print,
        OpCode::Pop,
        OpCode::DefineGlobal,
        OpCode::GetGlobal,
        OpCode::SetGlobal,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::JumpIfFalse,
        OpCode::Jump,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Closure,
    ];

    /// Get the number of bytes this opcode reads as operands
    pub fn operand_width(&self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::DefineGlobal
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::Call
            | OpCode::Closure => 1, // u8 operand

            OpCode::JumpIfFalse | OpCode::Jump | OpCode::Loop => 2, // u16 operand

            OpCode::Nil
            | OpCode::True
            | OpCode::False
            | OpCode::Equal
            | OpCode::Greater
            | OpCode::Less
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Not
            | OpCode::Negate
            | OpCode::Return
            | OpCode::Print
            | OpCode::Pop => 0,
        }
    }

    /// Mnemonic used by the disassembler
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Return => "OP_RETURN",
            OpCode::Print => "OP_PRINT",
            OpCode::Pop => "OP_POP",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Jump => "OP_JUMP",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Closure => "OP_CLOSURE",
        }
    }
}

/// A byte that does not name any opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcode(pub u8);

impl TryFrom<u8> for OpCode {
    type Error = InvalidOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL
            .get(byte as usize)
            .copied()
            .ok_or(InvalidOpcode(byte))
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoding_inverts_encoding() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::try_from(u8::from(op)), Ok(op));
        }
    }

    #[test]
    fn bytes_past_the_table_are_rejected() {
        assert_eq!(OpCode::try_from(26), Err(InvalidOpcode(26)));
        assert_eq!(OpCode::try_from(255), Err(InvalidOpcode(255)));
    }

    #[test]
    fn operand_widths() {
        assert_eq!(OpCode::Constant.operand_width(), 1);
        assert_eq!(OpCode::Call.operand_width(), 1);
        assert_eq!(OpCode::Loop.operand_width(), 2);
        assert_eq!(OpCode::JumpIfFalse.operand_width(), 2);
        assert_eq!(OpCode::Return.operand_width(), 0);
    }
}
