//! Unit tests for interpreter components

use std::io::Write;
use std::sync::{Arc, Mutex};

use bytecode_system::{Bytecode, BytecodeWriter};
use core_types::{ErrorKind, RawObject};
use interpreter::{
    float_repr, repr, str_text, BlockKind, Frame, Interpreter, Runtime, RuntimeConfig, Thread, TryBlock,
    MAX_BLOCK_DEPTH,
};
use memory_manager::CodeFields;

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default()).unwrap()
}

fn builtin(rt: &mut Runtime, name: &str) -> RawObject {
    let name = rt.intern(name).unwrap();
    rt.builtin_at(name).unwrap().unwrap()
}

/// Module-level code with no locals.
fn module_code(rt: &mut Runtime, bytecode: Vec<u8>, consts: &[RawObject], names: &[&str]) -> RawObject {
    let bytecode = rt.new_bytes(&bytecode).unwrap();
    let consts = rt.new_tuple_from(consts).unwrap();
    let names: Vec<RawObject> = names.iter().map(|name| rt.intern(name).unwrap()).collect();
    let names = rt.new_tuple_from(&names).unwrap();
    let empty = rt.new_tuple(0).unwrap();
    let name = rt.intern("<module>").unwrap();
    rt.new_code(&CodeFields {
        argcount: 0,
        posonlyargcount: 0,
        kwonlyargcount: 0,
        nlocals: 0,
        stacksize: 4,
        flags: 0,
        code: bytecode,
        consts,
        names,
        varnames: empty,
        freevars: empty,
        cellvars: empty,
        filename: RawObject::none(),
        name,
        firstlineno: 1,
        lnotab: RawObject::none(),
    })
    .unwrap()
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Runtime Tests
// ============================================================================

#[test]
fn test_runtime_creation() {
    let rt = runtime();
    assert_eq!(rt.thread().depth(), 0);
    assert!(!rt.thread().has_pending_exception());
    assert!(rt.config().cache_enabled);
}

#[test]
fn test_runtime_globals() {
    let mut rt = runtime();
    let globals = rt.new_dict().unwrap();
    assert_eq!(rt.get_global(globals, "x").unwrap(), None);

    rt.set_global(globals, "x", RawObject::small_int(10)).unwrap();
    rt.set_global(globals, "x", RawObject::small_int(20)).unwrap();
    assert_eq!(rt.get_global(globals, "x").unwrap(), Some(RawObject::small_int(20)));
}

#[test]
fn test_interning_returns_same_object() {
    let mut rt = runtime();
    let first = rt.intern("a_fairly_long_identifier").unwrap();
    let second = rt.intern("a_fairly_long_identifier").unwrap();
    assert_eq!(first, second);
    assert_eq!(rt.str_value(first).as_deref(), Some("a_fairly_long_identifier"));
}

// ============================================================================
// Builtin Function Tests
// ============================================================================

#[test]
fn test_builtin_abs() {
    let mut rt = runtime();
    let abs = builtin(&mut rt, "abs");
    assert_eq!(rt.call(abs, &[RawObject::small_int(-3)]).unwrap(), RawObject::small_int(3));

    let negative = rt.new_float(-2.5).unwrap();
    let result = rt.call(abs, &[negative]).unwrap();
    assert_eq!(rt.float_value(result), Some(2.5));
}

#[test]
fn test_builtin_len() {
    let mut rt = runtime();
    let len = builtin(&mut rt, "len");
    let text = rt.new_str("hello").unwrap();
    assert_eq!(rt.call(len, &[text]).unwrap(), RawObject::small_int(5));

    let tuple = rt
        .new_tuple_from(&[RawObject::small_int(1), RawObject::small_int(2)])
        .unwrap();
    assert_eq!(rt.call(len, &[tuple]).unwrap(), RawObject::small_int(2));

    let error = rt.call(len, &[RawObject::small_int(1)]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "object of type 'int' has no len()");
}

#[test]
fn test_builtin_arity_is_checked() {
    let mut rt = runtime();
    let abs = builtin(&mut rt, "abs");
    let error = rt.call(abs, &[]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::TypeError);
}

#[test]
fn test_builtin_isinstance_follows_subtyping() {
    let mut rt = runtime();
    let isinstance = builtin(&mut rt, "isinstance");
    let issubclass = builtin(&mut rt, "issubclass");
    let int_type = builtin(&mut rt, "int");
    let bool_type = builtin(&mut rt, "bool");

    let result = rt.call(isinstance, &[RawObject::bool(true), int_type]).unwrap();
    assert_eq!(result, RawObject::bool(true));
    let result = rt.call(isinstance, &[RawObject::small_int(1), bool_type]).unwrap();
    assert_eq!(result, RawObject::bool(false));
    let result = rt.call(issubclass, &[bool_type, int_type]).unwrap();
    assert_eq!(result, RawObject::bool(true));

    let error = rt
        .call(isinstance, &[RawObject::small_int(1), RawObject::small_int(2)])
        .unwrap_err();
    assert_eq!(error.message, "isinstance() arg 2 must be a type or tuple of types");
}

#[test]
fn test_builtin_callable() {
    let mut rt = runtime();
    let callable = builtin(&mut rt, "callable");
    let abs = builtin(&mut rt, "abs");
    assert_eq!(rt.call(callable, &[abs]).unwrap(), RawObject::bool(true));
    assert_eq!(
        rt.call(callable, &[RawObject::small_int(1)]).unwrap(),
        RawObject::bool(false)
    );
}

#[test]
fn test_builtin_print_writes_stdout() {
    let mut rt = runtime();
    let capture = Capture::default();
    rt.set_stdout(Box::new(capture.clone()));
    let print = builtin(&mut rt, "print");
    let text = rt.new_str("apples").unwrap();
    let result = rt.call(print, &[RawObject::small_int(3), text]).unwrap();
    assert!(result.is_none());
    assert_eq!(capture.text(), "3 apples\n");
}

// ============================================================================
// Text Conversion Tests
// ============================================================================

#[test]
fn test_repr_of_values() {
    let mut rt = runtime();
    let text = rt.new_str("a").unwrap();
    let pair = rt.new_tuple_from(&[RawObject::small_int(1), text]).unwrap();
    assert_eq!(repr(&mut rt, pair).unwrap(), "(1, 'a')");

    let single = rt.new_tuple_from(&[RawObject::none()]).unwrap();
    assert_eq!(repr(&mut rt, single).unwrap(), "(None,)");
    assert_eq!(repr(&mut rt, RawObject::bool(false)).unwrap(), "False");
}

#[test]
fn test_str_text_leaves_strings_unquoted() {
    let mut rt = runtime();
    let text = rt.new_str("plain").unwrap();
    assert_eq!(str_text(&mut rt, text).unwrap(), "plain");
    assert_eq!(str_text(&mut rt, RawObject::small_int(-4)).unwrap(), "-4");
}

#[test]
fn test_float_repr_notation() {
    assert_eq!(float_repr(2.0), "2.0");
    assert_eq!(float_repr(0.5), "0.5");
    assert_eq!(float_repr(1e-7), "1e-07");
    assert_eq!(float_repr(12345678.9), "12345678.9");
    assert_eq!(float_repr(f64::INFINITY), "inf");
}

// ============================================================================
// Frame Tests
// ============================================================================

#[test]
fn test_frame_value_stack() {
    let mut frame = Frame::new(RawObject::none(), Vec::new(), RawObject::none(), 4);
    frame.push(RawObject::small_int(1));
    frame.push(RawObject::small_int(2));
    frame.push(RawObject::small_int(3));

    assert_eq!(frame.peek(0).unwrap(), RawObject::small_int(3));
    assert_eq!(frame.peek(2).unwrap(), RawObject::small_int(1));
    assert_eq!(
        frame.top_values(2).unwrap(),
        vec![RawObject::small_int(2), RawObject::small_int(3)]
    );

    frame.set_peek(1, RawObject::small_int(9)).unwrap();
    frame.drop_values(1).unwrap();
    assert_eq!(frame.pop().unwrap(), RawObject::small_int(9));
    assert_eq!(frame.pop().unwrap(), RawObject::small_int(1));
}

#[test]
fn test_frame_stack_underflow() {
    let mut frame = Frame::new(RawObject::none(), Vec::new(), RawObject::none(), 0);
    let error = frame.pop().unwrap_err();
    assert_eq!(error.kind, ErrorKind::SystemError);
    assert_eq!(error.message, "value stack underflow");
    assert!(frame.peek(0).is_err());
    assert!(frame.drop_values(1).is_err());
}

#[test]
fn test_frame_block_depth_limit() {
    let mut frame = Frame::new(RawObject::none(), Vec::new(), RawObject::none(), 0);
    let block = TryBlock {
        kind: BlockKind::SetupFinally,
        handler: 10,
        level: 0,
        saved_exception: RawObject::none(),
    };
    for _ in 0..MAX_BLOCK_DEPTH {
        frame.push_block(block).unwrap();
    }
    let error = frame.push_block(block).unwrap_err();
    assert_eq!(error.kind, ErrorKind::SystemError);
    assert_eq!(error.message, "too many statically nested blocks");
    assert_eq!(frame.blocks.len(), MAX_BLOCK_DEPTH);
}

#[test]
fn test_frame_visit_reaches_every_slot() {
    let mut frame = Frame::new(
        RawObject::none(),
        vec![RawObject::small_int(1), RawObject::unbound()],
        RawObject::none(),
        2,
    );
    frame.push(RawObject::small_int(2));
    frame
        .push_block(TryBlock {
            kind: BlockKind::ExceptHandler,
            handler: 0,
            level: 0,
            saved_exception: RawObject::none(),
        })
        .unwrap();
    let mut visited = 0;
    frame.visit(&mut |_| visited += 1);
    // function, globals, names, two locals, one stack value, one block
    assert_eq!(visited, 7);
}

// ============================================================================
// Thread Tests
// ============================================================================

#[test]
fn test_thread_defaults() {
    let thread = Thread::new();
    assert_eq!(thread.depth(), 0);
    assert!(thread.pending_exception.is_none());
    assert!(thread.handled_exception.is_none());
    assert!(!thread.has_pending_exception());
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{ "max_frame_depth": 64, "hash_seed": 7 }}"#).unwrap();
    let config = RuntimeConfig::from_file(file.path()).unwrap();
    assert_eq!(config.max_frame_depth, 64);
    assert_eq!(config.hash_seed, 7);
    assert_eq!(config.heap_size, RuntimeConfig::default().heap_size);
}

#[test]
fn test_config_from_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let error = RuntimeConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert_eq!(error.kind, ErrorKind::ImportError);
}

#[test]
fn test_config_rejects_unknown_types() {
    let error = RuntimeConfig::from_json_str(r#"{ "cache_enabled": "yes" }"#).unwrap_err();
    assert_eq!(error.kind, ErrorKind::ValueError);
    assert!(error.message.starts_with("invalid runtime configuration"));
}

// ============================================================================
// Mutex Tests
// ============================================================================

#[test]
fn test_runtime_mutex_table() {
    let rt = runtime();
    let mutexes = rt.mutexes();
    assert!(mutexes.is_empty());

    let id = mutexes.allocate();
    assert!(mutexes.try_acquire(id).unwrap());
    assert!(!mutexes.try_acquire(id).unwrap());
    mutexes.release(id).unwrap();
    assert_eq!(mutexes.release(id).unwrap_err().kind, ErrorKind::RuntimeError);

    mutexes.free(id).unwrap();
    assert!(mutexes.is_empty());
}

// ============================================================================
// Run Code Tests
// ============================================================================

#[test]
fn test_run_code_stores_module_names() {
    let mut rt = runtime();
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::StoreName, 0)
        .emit(Bytecode::LoadName, 0)
        .emit(Bytecode::LoadConst, 1)
        .emit(Bytecode::BinaryAdd, 0)
        .emit(Bytecode::ReturnValue, 0);
    let code = module_code(
        &mut rt,
        writer.finish(),
        &[RawObject::small_int(40), RawObject::small_int(2)],
        &["x"],
    );
    let globals = rt.new_dict().unwrap();
    let globals = rt.new_handle(globals);
    let globals_dict = rt.handle(globals);
    let result = Interpreter.run_code(&mut rt, code, globals_dict).unwrap();
    assert_eq!(result, RawObject::small_int(42));
    let globals = rt.handle(globals);
    assert_eq!(rt.get_global(globals, "x").unwrap(), Some(RawObject::small_int(40)));
}

#[test]
fn test_run_code_error_leaves_clean_thread() {
    let mut rt = runtime();
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::LoadConst, 1)
        .emit(Bytecode::BinaryTrueDivide, 0)
        .emit(Bytecode::ReturnValue, 0);
    let code = module_code(
        &mut rt,
        writer.finish(),
        &[RawObject::small_int(1), RawObject::small_int(0)],
        &[],
    );
    let globals = rt.new_dict().unwrap();
    let error = Interpreter.run_code(&mut rt, code, globals).unwrap_err();
    assert_eq!(error.kind, ErrorKind::ZeroDivisionError);
    assert_eq!(error.to_string(), "ZeroDivisionError: division by zero");
    assert_eq!(error.traceback.len(), 1);
    assert_eq!(error.traceback[0].function, "<module>");
    assert_eq!(error.traceback[0].pc, 4);
    assert_eq!(rt.thread().depth(), 0);
    assert!(!rt.thread().has_pending_exception());
}
