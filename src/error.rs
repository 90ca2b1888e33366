// Lox VM Error Handling
// Runtime errors carry the faulting source line and a stack trace

use colored::*;
use std::collections::TryReserveError;
use std::fmt;
use thiserror::Error;

/// Categories of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    NameError,
    ArgumentError,
    StackOverflow,
    StackUnderflow,
    InvalidOpcode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::NameError => write!(f, "NameError"),
            ErrorKind::ArgumentError => write!(f, "ArgumentError"),
            ErrorKind::StackOverflow => write!(f, "StackOverflow"),
            ErrorKind::StackUnderflow => write!(f, "StackUnderflow"),
            ErrorKind::InvalidOpcode => write!(f, "InvalidOpcode"),
        }
    }
}

/// One active call frame at the moment an error was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: String,
    pub line: usize,
}

impl StackFrame {
    pub fn new(function_name: impl Into<String>, line: usize) -> Self {
        Self {
            function_name: function_name.into(),
            line,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function_name == "script" {
            write!(f, "[line {}] in script", self.line)
        } else {
            write!(f, "[line {}] in {}()", self.line, self.function_name)
        }
    }
}

/// Error raised by the execution engine
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
    /// Innermost frame first
    pub stack_trace: Vec<StackFrame>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
            stack_trace: Vec::new(),
        }
    }

    pub fn with_stack_trace(mut self, trace: Vec<StackFrame>) -> Self {
        self.stack_trace = trace;
        self
    }

    /// Format the error for a terminal (with colors)
    pub fn format(&self) -> String {
        let mut output = format!(
            "{}: {} at line {}\n",
            self.kind.to_string().red().bold(),
            self.message.white().bold(),
            self.line
        );

        if !self.stack_trace.is_empty() {
            output.push_str(&format!("\n{}:\n", "Stack trace".yellow().bold()));
            for frame in &self.stack_trace {
                output.push_str(&format!("  {}\n", frame));
            }
        }

        output
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for frame in &self.stack_trace {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Failure reported by a compiler front end. Opaque to the VM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}] Error: {message}")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// Host allocation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("out of memory: {source}")]
pub struct AllocError {
    #[from]
    source: TryReserveError,
}

/// Errors raised while building a chunk
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("Too much code to jump over ({distance} bytes).")]
    JumpTooLarge { distance: usize },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Errors reading or writing bytecode files
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryError {
    #[error("not a Lox bytecode file")]
    BadMagic,
    #[error("unsupported bytecode version {0}")]
    UnsupportedVersion(u8),
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("invalid UTF-8 in string constant")]
    InvalidUtf8,
    #[error("unknown constant tag {0}")]
    UnknownConstantTag(u8),
    #[error("{kind} objects cannot be stored as constants")]
    UnsupportedConstant { kind: &'static str },
    #[error("handle does not refer to a live {expected}")]
    DanglingHandle { expected: &'static str },
    #[error("line table has {lines} entries for {code} bytes of code")]
    LineCountMismatch { code: usize, lines: usize },
    #[error("invalid bytecode at offset {offset}: {reason}")]
    InvalidBytecode { offset: usize, reason: String },
    #[error("functions nested deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("{0} does not fit in a 32-bit length")]
    TooLarge(&'static str),
    #[error("{0} trailing bytes after function record")]
    TrailingBytes(usize),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Top-level error for VM operations
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl VmError {
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            VmError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;
