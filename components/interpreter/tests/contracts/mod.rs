//! Contract tests for interpreter API
//!
//! These tests pin the observable behavior of the public entry points.

use bytecode_system::{Bytecode, BytecodeWriter};
use core_types::{ErrorKind, RawObject, VmError};
use interpreter::{rewrite_bytecode, Interpreter, MutexTable, Runtime, RuntimeConfig};
use memory_manager::CodeFields;

fn code(rt: &mut Runtime, bytecode: Vec<u8>, consts: &[RawObject], names: &[&str]) -> RawObject {
    let bytecode = rt.new_bytes(&bytecode).unwrap();
    let consts = rt.new_tuple_from(consts).unwrap();
    let names: Vec<RawObject> = names.iter().map(|name| rt.intern(name).unwrap()).collect();
    let names = rt.new_tuple_from(&names).unwrap();
    let empty = rt.new_tuple(0).unwrap();
    let name = rt.intern("contract").unwrap();
    rt.new_code(&CodeFields {
        argcount: 0,
        posonlyargcount: 0,
        kwonlyargcount: 0,
        nlocals: 0,
        stacksize: 2,
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

/// Test Runtime::new() installs the builtins module
#[test]
fn test_runtime_new_contract() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    for name in ["abs", "len", "print", "isinstance", "object", "int", "ValueError"] {
        let key = rt.intern(name).unwrap();
        assert!(rt.builtin_at(key).unwrap().is_some(), "missing builtin {}", name);
    }
    assert_eq!(rt.thread().depth(), 0);
}

/// Test RuntimeConfig defaults
#[test]
fn test_runtime_config_default_contract() {
    let config = RuntimeConfig::default();
    assert_eq!(config.heap_size, 4 * 1024 * 1024);
    assert!(config.cache_enabled);
    assert_eq!(config.max_frame_depth, 1000);
    assert_eq!(config.hash_seed, 0);
    assert_eq!(config.instance_capacity, 8);
}

/// Test RuntimeConfig::from_json_str() fills unnamed settings with defaults
#[test]
fn test_runtime_config_partial_contract() {
    let config = RuntimeConfig::from_json_str(r#"{ "heap_size": 65536 }"#).unwrap();
    assert_eq!(config.heap_size, 65536);
    assert_eq!(
        config,
        RuntimeConfig {
            heap_size: 65536,
            ..RuntimeConfig::default()
        }
    );
}

/// Test Interpreter::run_code() returns the value of RETURN_VALUE
#[test]
fn test_run_code_contract() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadConst, 0).emit(Bytecode::ReturnValue, 0);
    let code = code(&mut rt, writer.finish(), &[RawObject::small_int(42)], &[]);
    let globals = rt.new_dict().unwrap();
    let result = Interpreter.run_code(&mut rt, code, globals).unwrap();
    assert_eq!(result, RawObject::small_int(42));
}

/// Test Interpreter::run_code() rejects a non-code object
#[test]
fn test_run_code_rejects_non_code_contract() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let error = Interpreter
        .run_code(&mut rt, RawObject::small_int(1), globals)
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "expected a code object, not 'int'");
}

/// Test Interpreter::run_code() rejects globals that are not a dict
#[test]
fn test_run_code_rejects_non_dict_globals_contract() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadConst, 0).emit(Bytecode::ReturnValue, 0);
    let code = code(&mut rt, writer.finish(), &[RawObject::none()], &[]);
    let error = Interpreter.run_code(&mut rt, code, RawObject::none()).unwrap_err();
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "globals must be a dict, not 'NoneType'");
}

/// Test Interpreter::call() forwards to the calling convention
#[test]
fn test_interpreter_call_contract() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let name = rt.intern("abs").unwrap();
    let abs = rt.builtin_at(name).unwrap().unwrap();
    let result = Interpreter.call(&mut rt, abs, &[RawObject::small_int(-9)]).unwrap();
    assert_eq!(result, RawObject::small_int(9));

    let error = Interpreter
        .call(&mut rt, RawObject::small_int(1), &[])
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::TypeError);
}

/// Test VmError displays as "Kind: message"
#[test]
fn test_vm_error_display_contract() {
    let error = VmError::type_error("unsupported operand");
    assert_eq!(error.to_string(), "TypeError: unsupported operand");
    let error = VmError::out_of_memory(64);
    assert_eq!(error.to_string(), "MemoryError: failed to allocate 64 bytes");
    assert!(!error.kind.is_catchable());
}

/// Test rewrite_bytecode() assigns attribute caches after the global lines
#[test]
fn test_rewrite_bytecode_contract() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadAttr, 0).emit(Bytecode::ReturnValue, 0);
    let code = code(&mut rt, writer.finish(), &[], &["x"]);

    let result = rewrite_bytecode(rt.heap(), code, true);
    assert_eq!(
        result.bytecode,
        vec![
            Bytecode::LoadAttrCached.byte(),
            1,
            Bytecode::ReturnValue.byte(),
            0
        ]
    );
    assert_eq!(result.num_caches, 2);
    assert_eq!(result.original_arguments, vec![None, Some(0)]);

    let result = rewrite_bytecode(rt.heap(), code, false);
    assert_eq!(result.bytecode[0], Bytecode::LoadAttr.byte());
}

/// Test MutexTable ids stay valid until freed
#[test]
fn test_mutex_table_contract() {
    let table = MutexTable::new();
    let id = table.allocate();
    table.acquire(id).unwrap();
    assert!(!table.try_acquire(id).unwrap());
    table.release(id).unwrap();
    table.free(id).unwrap();

    let error = table.acquire(id).unwrap_err();
    assert_eq!(error.kind, ErrorKind::ValueError);
    assert_eq!(error.message, format!("unknown mutex {}", id));
}
