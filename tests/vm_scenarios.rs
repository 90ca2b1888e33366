mod common;

use common::{buffered_vm, printed, ChunkBuilder};
use lox_vm::vm::Heap;
use lox_vm::{
    CompileError, ErrorKind, InterpretResult, ObjRef, OpCode, Value, FRAMES_MAX,
};

#[test]
fn add_define_get_print_prints_three() {
    let mut vm = buffered_vm();
    let heap = vm.heap_mut();
    let script = ChunkBuilder::new()
        .number(1.0)
        .number(2.0)
        .string(heap, "x")
        .op_arg(OpCode::Constant, 0)
        .op_arg(OpCode::Constant, 1)
        .op(OpCode::Add)
        .op_arg(OpCode::DefineGlobal, 2)
        .op_arg(OpCode::GetGlobal, 2)
        .op(OpCode::Print)
        .op(OpCode::Nil)
        .op(OpCode::Return)
        .script(heap);

    let mut compiler = move |_: &str, _: &mut Heap| -> Result<ObjRef, CompileError> { Ok(script) };
    assert_eq!(vm.interpret(&mut compiler, ""), InterpretResult::Ok);
    assert_eq!(printed(&vm), "3\n");
}

#[test]
fn unbounded_recursion_overflows_at_frame_limit() {
    let mut vm = buffered_vm();
    let heap = vm.heap_mut();
    // fun f() { f(); }
    let f = ChunkBuilder::new()
        .string(heap, "f")
        .line(2)
        .op_arg(OpCode::GetGlobal, 0)
        .op_arg(OpCode::Call, 0)
        .op(OpCode::Return)
        .function(heap, "f", 0);
    let script = ChunkBuilder::new()
        .constant(Value::Obj(f))
        .string(heap, "f")
        .op_arg(OpCode::Closure, 0)
        .op_arg(OpCode::DefineGlobal, 1)
        .line(5)
        .op_arg(OpCode::GetGlobal, 1)
        .op_arg(OpCode::Call, 0)
        .op(OpCode::Return)
        .script(heap);

    let err = vm.run(script).unwrap_err();
    let runtime = err.as_runtime().expect("runtime error");
    assert_eq!(runtime.kind, ErrorKind::StackOverflow);
    assert_eq!(runtime.message, "Stack overflow.");
    assert_eq!(runtime.stack_trace.len(), FRAMES_MAX);
    assert_eq!(runtime.stack_trace[0].function_name, "f");
    assert_eq!(runtime.stack_trace[0].line, 2);
    let outermost = runtime.stack_trace.last().unwrap();
    assert_eq!(outermost.function_name, "script");
    assert_eq!(outermost.line, 5);

    // Reusable afterwards
    assert_eq!(vm.stack_len(), 0);
    assert_eq!(vm.frame_count(), 0);
    let heap = vm.heap_mut();
    let again = ChunkBuilder::new()
        .number(7.0)
        .op_arg(OpCode::Constant, 0)
        .op(OpCode::Return)
        .script(heap);
    assert_eq!(vm.run(again).unwrap(), Value::Number(7.0));
}

#[test]
fn native_result_replaces_call_window() {
    fn forty_two(arg_count: usize, args: &[Value]) -> Value {
        assert_eq!(arg_count, args.len());
        Value::Number(42.0)
    }

    let mut vm = buffered_vm();
    vm.define_native("answer", forty_two).unwrap();
    let heap = vm.heap_mut();
    let script = ChunkBuilder::new()
        .string(heap, "answer")
        .number(1.0)
        .op_arg(OpCode::GetGlobal, 0)
        .op_arg(OpCode::Constant, 1)
        .op_arg(OpCode::Constant, 1)
        .op_arg(OpCode::Call, 2)
        .op(OpCode::Print)
        .op(OpCode::Nil)
        .op(OpCode::Return)
        .script(heap);

    vm.run(script).unwrap();
    assert_eq!(printed(&vm), "42\n");
}

#[test]
fn function_call_returns_to_caller() {
    let mut vm = buffered_vm();
    let heap = vm.heap_mut();
    // fun add(a, b) { return a + b; }
    let add = ChunkBuilder::new()
        .op_arg(OpCode::GetLocal, 1)
        .op_arg(OpCode::GetLocal, 2)
        .op(OpCode::Add)
        .op(OpCode::Return)
        .function(heap, "add", 2);
    let script = ChunkBuilder::new()
        .constant(Value::Obj(add))
        .number(3.0)
        .number(4.0)
        .op_arg(OpCode::Closure, 0)
        .op_arg(OpCode::Constant, 1)
        .op_arg(OpCode::Constant, 2)
        .op_arg(OpCode::Call, 2)
        .op(OpCode::Print)
        .op_arg(OpCode::Closure, 0)
        .op(OpCode::Print)
        .op(OpCode::Nil)
        .op(OpCode::Return)
        .script(heap);

    assert_eq!(vm.run(script).unwrap(), Value::Nil);
    assert_eq!(printed(&vm), "7\n<fn add>\n");
}

#[test]
fn runtime_error_trace_is_innermost_first() {
    let mut vm = buffered_vm();
    let heap = vm.heap_mut();
    let inner = ChunkBuilder::new()
        .line(10)
        .op(OpCode::Nil)
        .op(OpCode::Negate)
        .op(OpCode::Return)
        .function(heap, "inner", 0);
    let script = ChunkBuilder::new()
        .constant(Value::Obj(inner))
        .line(20)
        .op_arg(OpCode::Closure, 0)
        .op_arg(OpCode::Call, 0)
        .op(OpCode::Return)
        .script(heap);

    let err = vm.run(script).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: Operand of '-' must be a number.\n[line 10] in inner()\n[line 20] in script"
    );
}

#[test]
fn runtime_error_reports_through_interpret() {
    let mut vm = buffered_vm();
    let heap = vm.heap_mut();
    let script = ChunkBuilder::new()
        .op(OpCode::True)
        .op(OpCode::Nil)
        .op(OpCode::Multiply)
        .op(OpCode::Return)
        .script(heap);

    let mut compiler = move |_: &str, _: &mut Heap| -> Result<ObjRef, CompileError> { Ok(script) };
    assert_eq!(vm.interpret(&mut compiler, ""), InterpretResult::RuntimeError);
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn equality_uses_identity_for_strings() {
    let mut vm = buffered_vm();
    let heap = vm.heap_mut();
    let script = ChunkBuilder::new()
        .string(heap, "ab")
        .string(heap, "a")
        .string(heap, "b")
        .op_arg(OpCode::Constant, 1)
        .op_arg(OpCode::Constant, 2)
        .op(OpCode::Add)
        .op_arg(OpCode::Constant, 0)
        .op(OpCode::Equal)
        .op(OpCode::Return)
        .script(heap);

    assert_eq!(vm.run(script).unwrap(), Value::Bool(true));
    // "ab" was already interned, so the concatenation buffer was released
    assert_eq!(vm.heap().stats().buffers_released, 1);
}
