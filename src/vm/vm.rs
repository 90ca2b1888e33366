// Lox Virtual Machine
// Stack-based VM for executing bytecode
// One explicit context per instance; no process-wide state

use std::io::{self, Stdout, Write};

use super::heap::Heap;
use super::natives;
use super::object::{NativeFn, Obj, ObjRef};
use super::table::Table;
use super::value::Value;
use crate::compiler::{disassemble_instruction, Chunk, InvalidOpcode, OpCode};
use crate::error::{
    AllocError, CompileError, ErrorKind, RuntimeError, StackFrame, VmError, VmResult,
};
use crate::memory;

/// Maximum call depth
pub const FRAMES_MAX: usize = 64;
/// Value stack capacity: 256 slots per frame
pub const STACK_MAX: usize = FRAMES_MAX * (u8::MAX as usize + 1);

/// Outcome of `Vm::interpret`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// What to do when the host cannot satisfy an allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllocPolicy {
    /// Report and terminate the process with status 1
    #[default]
    Abort,
    /// Surface the failure as an error result
    Report,
}

/// VM configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmConfig {
    pub alloc_policy: AllocPolicy,
    /// Print heap statistics to stderr after each run
    pub heap_stats: bool,
}

/// Source-to-bytecode front end.
/// Produces the top-level function in the VM's heap.
pub trait Compile {
    fn compile(&mut self, source: &str, heap: &mut Heap) -> Result<ObjRef, CompileError>;
}

impl<F> Compile for F
where
    F: FnMut(&str, &mut Heap) -> Result<ObjRef, CompileError>,
{
    fn compile(&mut self, source: &str, heap: &mut Heap) -> Result<ObjRef, CompileError> {
        self(source, heap)
    }
}

/// Call frame for function execution
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    function: ObjRef,
    ip: usize,
    /// Stack index of slot 0 (the callee)
    slots_start: usize,
}

/// Resolved call target
enum Callee {
    Function(ObjRef),
    Native(NativeFn),
}

/// The Lox Virtual Machine
pub struct Vm<W: Write = Stdout> {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    heap: Heap,
    out: W,
    config: VmConfig,
}

impl Vm<Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Vm<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    /// Create a VM whose `print` output goes to `out`
    pub fn with_output(out: W) -> Self {
        Self::with_config(out, VmConfig::default())
    }

    pub fn with_config(out: W, config: VmConfig) -> Self {
        natives::start_clock();

        let mut vm = Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            heap: Heap::new(),
            out,
            config,
        };

        for (name, function) in natives::DEFAULT_NATIVES {
            if let Err(err) = vm.define_native(name, *function) {
                memory::out_of_memory(&err);
            }
        }
        vm
    }

    /// Bind a host function as a global
    pub fn define_native(&mut self, name: &str, function: NativeFn) -> Result<(), AllocError> {
        let key = self.heap.copy_string(name)?;
        let native = self.heap.new_native(name, function)?;
        self.globals.set(key, Value::Obj(native));
        Ok(())
    }

    /// Compile `source` and run the result
    pub fn interpret<C: Compile + ?Sized>(&mut self, compiler: &mut C, source: &str) -> InterpretResult {
        let function = match compiler.compile(source, &mut self.heap) {
            Ok(function) => function,
            Err(err) => {
                eprintln!("{}", err);
                return InterpretResult::CompileError;
            }
        };

        match self.run(function) {
            Ok(_) => InterpretResult::Ok,
            Err(err) => {
                match &err {
                    VmError::Runtime(runtime) => eprint!("{}", runtime.format()),
                    other => eprintln!("{}", other),
                }
                InterpretResult::RuntimeError
            }
        }
    }

    /// Run a top-level function to completion.
    /// The stack and frames are empty afterwards, whatever the outcome.
    pub fn run(&mut self, function: ObjRef) -> VmResult<Value> {
        let result = self.start(function).and_then(|started| match started {
            Some(value) => Ok(value),
            None => self.execute(),
        });

        self.reset_stack();

        if self.config.heap_stats {
            eprintln!("-- heap --\n{}", self.heap.stats());
        }

        match result {
            Err(VmError::Alloc(err)) if self.config.alloc_policy == AllocPolicy::Abort => {
                memory::out_of_memory(&err)
            }
            other => other,
        }
    }

    /// Push the callee and enter it. Returns a value when the callee
    /// completes without a frame (a native).
    fn start(&mut self, function: ObjRef) -> VmResult<Option<Value>> {
        tracing::debug!(function = %self.heap.function_name(function), "run");
        self.push(Value::Obj(function))?;
        self.call_value(0)?;

        if self.frames.is_empty() {
            return self.pop().map(Some);
        }
        Ok(None)
    }

    fn execute(&mut self) -> VmResult<Value> {
        loop {
            if tracing::enabled!(tracing::Level::TRACE) {
                self.trace_instruction();
            }

            let byte = self.read_byte()?;
            let op = OpCode::try_from(byte).map_err(|InvalidOpcode(byte)| {
                self.runtime_error(ErrorKind::InvalidOpcode, format!("Unknown opcode {}.", byte))
            })?;

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant()?;
                    self.push(constant)?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,

                OpCode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => self.comparison_op(">", |a, b| a > b)?,
                OpCode::Less => self.comparison_op("<", |a, b| a < b)?,

                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number_op("-", |a, b| a - b)?,
                OpCode::Multiply => self.binary_number_op("*", |a, b| a * b)?,
                OpCode::Divide => self.binary_number_op("/", |a, b| a / b)?,

                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                OpCode::Negate => {
                    let n = self.peek(0)?.as_number().ok_or_else(|| {
                        self.runtime_error(ErrorKind::TypeError, "Operand of '-' must be a number.")
                    })?;
                    self.pop()?;
                    self.push(Value::Number(-n))?;
                }

                OpCode::Return => {
                    let result = self.pop()?;
                    let frame = self.frames.pop().ok_or_else(|| self.no_frame())?;
                    tracing::debug!(depth = self.frames.len(), "pop frame");
                    self.stack.truncate(frame.slots_start);

                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.push(result)?;
                }
                OpCode::Print => {
                    let value = self.pop()?;
                    writeln!(self.out, "{}", self.heap.display(value))?;
                }
                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::DefineGlobal => {
                    let name = self.read_name()?;
                    let value = self.peek(0)?;
                    self.globals.set(name, value);
                    self.pop()?;
                }
                OpCode::GetGlobal => {
                    let name = self.read_name()?;
                    let value = self
                        .globals
                        .get(name)
                        .ok_or_else(|| self.undefined_variable(name))?;
                    self.push(value)?;
                }
                OpCode::SetGlobal => {
                    let name = self.read_name()?;
                    let value = self.peek(0)?;
                    if !self.globals.assign(name, value) {
                        return Err(self.undefined_variable(name));
                    }
                }

                OpCode::GetLocal => {
                    let slot = self.local_slot()?;
                    let value = self.stack.get(slot).copied().ok_or_else(|| self.underflow())?;
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = self.local_slot()?;
                    let value = self.peek(0)?;
                    match self.stack.get_mut(slot) {
                        Some(target) => *target = value,
                        None => return Err(self.underflow()),
                    }
                }

                OpCode::JumpIfFalse => {
                    let offset = self.read_u16()?;
                    if self.pop()?.is_falsey() {
                        self.jump_forward(offset)?;
                    }
                }
                OpCode::Jump => {
                    let offset = self.read_u16()?;
                    self.jump_forward(offset)?;
                }
                OpCode::Loop => {
                    let offset = self.read_u16()?;
                    self.jump_back(offset)?;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte()? as usize;
                    self.call_value(arg_count)?;
                }
                OpCode::Closure => {
                    let function = self
                        .read_constant()?
                        .as_obj()
                        .filter(|handle| self.heap.function(*handle).is_some())
                        .ok_or_else(|| {
                            self.runtime_error(ErrorKind::TypeError, "Closure operand must be a function.")
                        })?;
                    let closure = self.heap.new_closure(function);
                    self.push(Value::Obj(closure))?;
                }
            }
        }
    }

    // ==================== Stack ====================

    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error(ErrorKind::StackOverflow, "Stack overflow."));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or_else(|| self.underflow())
    }

    pub fn peek(&self, distance: usize) -> VmResult<Value> {
        let index = self
            .stack
            .len()
            .checked_sub(1 + distance)
            .ok_or_else(|| self.underflow())?;
        Ok(self.stack[index])
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    // ==================== Accessors ====================

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn globals(&self) -> &Table {
        &self.globals
    }

    /// Look up a global by name
    pub fn global(&self, name: &str) -> Option<Value> {
        self.heap.find_string(name).and_then(|key| self.globals.get(key))
    }

    pub fn config(&self) -> VmConfig {
        self.config
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    // ==================== Decoding ====================

    fn frame(&self) -> VmResult<CallFrame> {
        self.frames.last().copied().ok_or_else(|| self.no_frame())
    }

    fn chunk(&self, function: ObjRef) -> VmResult<&Chunk> {
        self.heap
            .function(function)
            .map(|f| &f.chunk)
            .ok_or_else(|| self.no_frame())
    }

    fn read_byte(&mut self) -> VmResult<u8> {
        let frame = self.frame()?;
        let byte = self.chunk(frame.function)?.code().get(frame.ip).copied();
        let byte = byte.ok_or_else(|| {
            self.runtime_error(ErrorKind::InvalidOpcode, "Instruction pointer out of bounds.")
        })?;

        if let Some(frame) = self.frames.last_mut() {
            frame.ip += 1;
        }
        Ok(byte)
    }

    fn read_u16(&mut self) -> VmResult<u16> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_constant(&mut self) -> VmResult<Value> {
        let index = self.read_byte()? as usize;
        let frame = self.frame()?;
        Ok(self.chunk(frame.function)?.constant(index))
    }

    fn read_name(&mut self) -> VmResult<ObjRef> {
        self.read_constant()?
            .as_obj()
            .filter(|handle| self.heap.string(*handle).is_some())
            .ok_or_else(|| self.runtime_error(ErrorKind::TypeError, "Expected string constant."))
    }

    fn local_slot(&mut self) -> VmResult<usize> {
        let slot = self.read_byte()? as usize;
        Ok(self.frame()?.slots_start + slot)
    }

    fn jump_forward(&mut self, offset: u16) -> VmResult<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip += offset as usize;
        }
        Ok(())
    }

    fn jump_back(&mut self, offset: u16) -> VmResult<()> {
        let frame = self.frame()?;
        let target = frame.ip.checked_sub(offset as usize).ok_or_else(|| {
            self.runtime_error(ErrorKind::InvalidOpcode, "Loop offset out of bounds.")
        })?;

        if let Some(frame) = self.frames.last_mut() {
            frame.ip = target;
        }
        Ok(())
    }

    // ==================== Operators ====================

    fn binary_number_op(&mut self, symbol: &str, op: fn(f64, f64) -> f64) -> VmResult<()> {
        let (a, b) = self.number_operands(symbol)?;
        self.push(Value::Number(op(a, b)))
    }

    fn comparison_op(&mut self, symbol: &str, op: fn(f64, f64) -> bool) -> VmResult<()> {
        let (a, b) = self.number_operands(symbol)?;
        self.push(Value::Bool(op(a, b)))
    }

    /// Pop two number operands, leaving the stack untouched on a type error
    fn number_operands(&mut self, symbol: &str) -> VmResult<(f64, f64)> {
        match (self.peek(1)?, self.peek(0)?) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop()?;
                self.pop()?;
                Ok((a, b))
            }
            _ => Err(self.runtime_error(
                ErrorKind::TypeError,
                format!("Operands of '{}' must be numbers.", symbol),
            )),
        }
    }

    fn add(&mut self) -> VmResult<()> {
        match (self.peek(1)?, self.peek(0)?) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop()?;
                self.pop()?;
                self.push(Value::Number(a + b))
            }
            (Value::Obj(a), Value::Obj(b))
                if self.heap.string(a).is_some() && self.heap.string(b).is_some() =>
            {
                self.concatenate(a, b)
            }
            _ => Err(self.runtime_error(
                ErrorKind::TypeError,
                "Operands of '+' must be two numbers or two strings.",
            )),
        }
    }

    fn concatenate(&mut self, a: ObjRef, b: ObjRef) -> VmResult<()> {
        let (left, right) = match (self.heap.string(a), self.heap.string(b)) {
            (Some(left), Some(right)) => (left.as_str(), right.as_str()),
            _ => return Err(self.underflow()),
        };

        let mut buffer = memory::allocate_string(left.len() + right.len())?;
        buffer.push_str(left);
        buffer.push_str(right);

        let result = self.heap.take_string(buffer)?;
        self.pop()?;
        self.pop()?;
        self.push(Value::Obj(result))
    }

    // ==================== Calls ====================

    fn call_value(&mut self, arg_count: usize) -> VmResult<()> {
        let callee = self.peek(arg_count)?;

        let target = callee.as_obj().and_then(|handle| match self.heap.get(handle) {
            Some(Obj::Closure(closure)) => Some(Callee::Function(closure.function)),
            Some(Obj::Function(_)) => Some(Callee::Function(handle)),
            Some(Obj::Native(native)) => Some(Callee::Native(native.function)),
            _ => None,
        });

        match target {
            Some(Callee::Function(function)) => self.call_function(function, arg_count),
            Some(Callee::Native(native)) => {
                let args_start = self.stack.len() - arg_count;
                let result = native(arg_count, &self.stack[args_start..]);
                // Callee and arguments are replaced by the result
                self.stack.truncate(args_start - 1);
                self.push(result)
            }
            None => Err(self.runtime_error(
                ErrorKind::TypeError,
                "Can only call functions and classes.",
            )),
        }
    }

    fn call_function(&mut self, function: ObjRef, arg_count: usize) -> VmResult<()> {
        let arity = self
            .heap
            .function(function)
            .map(|f| f.arity as usize)
            .ok_or_else(|| {
                self.runtime_error(ErrorKind::TypeError, "Can only call functions and classes.")
            })?;

        if arg_count != arity {
            return Err(self.runtime_error(
                ErrorKind::ArgumentError,
                format!("Expected {} arguments but got {}.", arity, arg_count),
            ));
        }

        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error(ErrorKind::StackOverflow, "Stack overflow."));
        }

        self.frames.push(CallFrame {
            function,
            ip: 0,
            slots_start: self.stack.len() - arg_count - 1,
        });
        tracing::debug!(
            depth = self.frames.len(),
            function = %self.heap.function_name(function),
            "push frame"
        );
        Ok(())
    }

    // ==================== Errors ====================

    fn runtime_error(&self, kind: ErrorKind, message: impl Into<String>) -> VmError {
        // Innermost frame first; each line is that of the instruction in flight
        let stack_trace: Vec<StackFrame> = self
            .frames
            .iter()
            .rev()
            .map(|frame| StackFrame::new(self.heap.function_name(frame.function), self.frame_line(frame)))
            .collect();

        let line = self.frames.last().map_or(0, |frame| self.frame_line(frame));
        let error = RuntimeError::new(kind, message, line).with_stack_trace(stack_trace);
        tracing::debug!(%error, "runtime error");
        VmError::Runtime(error)
    }

    fn frame_line(&self, frame: &CallFrame) -> usize {
        self.heap
            .function(frame.function)
            .map_or(0, |f| f.chunk.line(frame.ip.saturating_sub(1)))
    }

    fn undefined_variable(&self, name: ObjRef) -> VmError {
        let name = self.heap.string(name).map_or("", |s| s.as_str());
        self.runtime_error(ErrorKind::NameError, format!("Undefined variable '{}'.", name))
    }

    fn underflow(&self) -> VmError {
        self.runtime_error(ErrorKind::StackUnderflow, "Stack underflow.")
    }

    fn no_frame(&self) -> VmError {
        self.runtime_error(ErrorKind::StackUnderflow, "No active call frame.")
    }

    // ==================== Tracing ====================

    fn trace_instruction(&self) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let Some(function) = self.heap.function(frame.function) else {
            return;
        };

        let stack: String = self
            .stack
            .iter()
            .map(|value| format!("[ {} ]", self.heap.display(*value)))
            .collect();
        let mut instruction = String::new();
        disassemble_instruction(&function.chunk, &self.heap, frame.ip, &mut instruction);

        tracing::trace!(stack = %stack, "{}", instruction.trim_end());
    }
}
