//! Integration tests for interpreter
//!
//! Tests interaction between the dispatch loop, the inline caches and the
//! collector through small hand-assembled programs.

use bytecode_system::{Bytecode, BytecodeWriter, CompareOp};
use core_types::{ErrorKind, RawObject};
use interpreter::{Runtime, RuntimeConfig};
use memory_manager::{CodeFields, Function, MutableBytes};

struct Body<'a> {
    name: &'a str,
    bytecode: Vec<u8>,
    consts: Vec<RawObject>,
    names: &'a [&'a str],
    varnames: &'a [&'a str],
    argcount: i64,
}

fn function(rt: &mut Runtime, globals: RawObject, body: Body<'_>) -> RawObject {
    let globals = rt.new_handle(globals);
    let bytecode = rt.new_bytes(&body.bytecode).unwrap();
    let consts = rt.new_tuple_from(&body.consts).unwrap();
    let names: Vec<RawObject> = body.names.iter().map(|name| rt.intern(name).unwrap()).collect();
    let names = rt.new_tuple_from(&names).unwrap();
    let varnames: Vec<RawObject> = body.varnames.iter().map(|name| rt.intern(name).unwrap()).collect();
    let varnames = rt.new_tuple_from(&varnames).unwrap();
    let empty = rt.new_tuple(0).unwrap();
    let name = rt.intern(body.name).unwrap();
    let code = rt
        .new_code(&CodeFields {
            argcount: body.argcount,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            nlocals: body.varnames.len() as i64,
            stacksize: 8,
            flags: 0,
            code: bytecode,
            consts,
            names,
            varnames,
            freevars: empty,
            cellvars: empty,
            filename: RawObject::none(),
            name,
            firstlineno: 1,
            lnotab: RawObject::none(),
        })
        .unwrap();
    rt.new_function(code, name, rt.handle(globals)).unwrap()
}

fn returns_constant(rt: &mut Runtime, globals: RawObject, name: &str, value: i64) -> RawObject {
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadAttr, 0)
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::BinaryMultiply, 0)
        .emit(Bytecode::ReturnValue, 0);
    function(
        rt,
        globals,
        Body {
            name,
            bytecode: writer.finish(),
            consts: vec![RawObject::small_int(value)],
            names: &["v"],
            varnames: &["self"],
            argcount: 1,
        },
    )
}

fn method_caller(rt: &mut Runtime, globals: RawObject) -> RawObject {
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadMethod, 0)
        .emit(Bytecode::CallMethod, 0)
        .emit(Bytecode::ReturnValue, 0);
    function(
        rt,
        globals,
        Body {
            name: "call_scale",
            bytecode: writer.finish(),
            consts: vec![RawObject::none()],
            names: &["scale"],
            varnames: &["o"],
            argcount: 1,
        },
    )
}

fn opcode_at(rt: &Runtime, function: RawObject, offset: usize) -> Option<Bytecode> {
    let bytecode = Function::from_raw(function).rewritten_bytecode(rt.heap());
    Bytecode::from_byte(MutableBytes::from_raw(bytecode).byte_at(rt.heap(), offset))
}

fn configs() -> [RuntimeConfig; 2] {
    [
        RuntimeConfig::default(),
        RuntimeConfig {
            cache_enabled: false,
            ..RuntimeConfig::default()
        },
    ]
}

// ============================================================================
// Global variable caches
// ============================================================================

#[test]
fn test_global_cache_follows_rebinding_and_deletion() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    rt.set_global(globals, "g", RawObject::small_int(1)).unwrap();
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadGlobal, 0).emit(Bytecode::ReturnValue, 0);
    let reader = function(
        &mut rt,
        globals,
        Body {
            name: "reader",
            bytecode: writer.finish(),
            consts: vec![],
            names: &["g"],
            varnames: &[],
            argcount: 0,
        },
    );

    assert_eq!(opcode_at(&rt, reader, 0), Some(Bytecode::LoadGlobal));
    assert_eq!(rt.call(reader, &[]).unwrap(), RawObject::small_int(1));
    assert_eq!(opcode_at(&rt, reader, 0), Some(Bytecode::LoadGlobalCached));

    rt.set_global(globals, "g", RawObject::small_int(2)).unwrap();
    assert_eq!(rt.call(reader, &[]).unwrap(), RawObject::small_int(2));

    let name = rt.intern("g").unwrap();
    assert!(rt.global_remove(globals, name).unwrap());
    assert_eq!(opcode_at(&rt, reader, 0), Some(Bytecode::LoadGlobal));
    let error = rt.call(reader, &[]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::NameError);
    assert_eq!(error.message, "name 'g' is not defined");

    rt.set_global(globals, "g", RawObject::small_int(3)).unwrap();
    assert_eq!(rt.call(reader, &[]).unwrap(), RawObject::small_int(3));
}

#[test]
fn test_global_shadowing_a_builtin() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadGlobal, 0)
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::CallFunction, 1)
        .emit(Bytecode::ReturnValue, 0);
    let caller = function(
        &mut rt,
        globals,
        Body {
            name: "caller",
            bytecode: writer.finish(),
            consts: vec![RawObject::small_int(-5)],
            names: &["abs"],
            varnames: &[],
            argcount: 0,
        },
    );
    assert_eq!(rt.call(caller, &[]).unwrap(), RawObject::small_int(5));

    let len = rt.intern("len").unwrap();
    let len = rt.builtin_at(len).unwrap().unwrap();
    rt.set_global(globals, "abs", len).unwrap();
    let error = rt.call(caller, &[]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "object of type 'int' has no len()");
}

// ============================================================================
// Attribute and method caches
// ============================================================================

#[test]
fn test_method_cache_sees_type_changes() {
    for config in configs() {
        let mut rt = Runtime::new(config).unwrap();
        let globals = rt.new_dict().unwrap();
        let double = returns_constant(&mut rt, globals, "double", 2);
        let triple = returns_constant(&mut rt, globals, "triple", 3);
        let caller = method_caller(&mut rt, globals);

        let namespace = rt.new_dict().unwrap();
        let scale = rt.intern("scale").unwrap();
        rt.dict_at_put(namespace, scale, double).unwrap();
        let bases = rt.new_tuple(0).unwrap();
        let name = rt.intern("Scaler").unwrap();
        let ty = rt.new_type(name, bases, namespace).unwrap();
        let instance = rt.call(ty, &[]).unwrap();
        rt.set_attribute_str(instance, "v", RawObject::small_int(7)).unwrap();

        assert_eq!(rt.call(caller, &[instance]).unwrap(), RawObject::small_int(14));
        assert_eq!(rt.call(caller, &[instance]).unwrap(), RawObject::small_int(14));

        rt.set_attribute_str(ty, "scale", triple).unwrap();
        assert_eq!(rt.call(caller, &[instance]).unwrap(), RawObject::small_int(21));
    }
}

#[test]
fn test_method_cache_for_subclasses() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let double = returns_constant(&mut rt, globals, "double", 2);
    let triple = returns_constant(&mut rt, globals, "triple", 3);
    let caller = method_caller(&mut rt, globals);

    let namespace = rt.new_dict().unwrap();
    let scale = rt.intern("scale").unwrap();
    rt.dict_at_put(namespace, scale, double).unwrap();
    let no_bases = rt.new_tuple(0).unwrap();
    let base_name = rt.intern("Base").unwrap();
    let base = rt.new_type(base_name, no_bases, namespace).unwrap();
    let bases = rt.new_tuple_from(&[base]).unwrap();
    let empty_namespace = rt.new_dict().unwrap();
    let derived_name = rt.intern("Derived").unwrap();
    let derived = rt.new_type(derived_name, bases, empty_namespace).unwrap();

    let base_instance = rt.call(base, &[]).unwrap();
    rt.set_attribute_str(base_instance, "v", RawObject::small_int(10)).unwrap();
    let derived_instance = rt.call(derived, &[]).unwrap();
    rt.set_attribute_str(derived_instance, "v", RawObject::small_int(5)).unwrap();

    assert_eq!(rt.call(caller, &[derived_instance]).unwrap(), RawObject::small_int(10));
    assert_eq!(rt.call(caller, &[base_instance]).unwrap(), RawObject::small_int(20));

    // Changing the base reaches the cached subclass entry
    rt.set_attribute_str(base, "scale", triple).unwrap();
    assert_eq!(rt.call(caller, &[derived_instance]).unwrap(), RawObject::small_int(15));

    // Overriding on the subclass leaves the base entry alone
    rt.set_attribute_str(derived, "scale", double).unwrap();
    assert_eq!(rt.call(caller, &[derived_instance]).unwrap(), RawObject::small_int(10));
    assert_eq!(rt.call(caller, &[base_instance]).unwrap(), RawObject::small_int(30));
}

#[test]
fn test_instance_attribute_cache_after_deletion() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadAttr, 0)
        .emit(Bytecode::ReturnValue, 0);
    let reader = function(
        &mut rt,
        globals,
        Body {
            name: "read_x",
            bytecode: writer.finish(),
            consts: vec![RawObject::none()],
            names: &["x"],
            varnames: &["o"],
            argcount: 1,
        },
    );
    let namespace = rt.new_dict().unwrap();
    let bases = rt.new_tuple(0).unwrap();
    let name = rt.intern("Box").unwrap();
    let ty = rt.new_type(name, bases, namespace).unwrap();
    let instance = rt.call(ty, &[]).unwrap();
    rt.set_attribute_str(instance, "x", RawObject::small_int(4)).unwrap();

    assert_eq!(rt.call(reader, &[instance]).unwrap(), RawObject::small_int(4));
    rt.set_attribute_str(instance, "x", RawObject::small_int(8)).unwrap();
    assert_eq!(rt.call(reader, &[instance]).unwrap(), RawObject::small_int(8));

    let x = rt.intern("x").unwrap();
    rt.delete_attribute(instance, x).unwrap();
    let error = rt.call(reader, &[instance]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::AttributeError);
}

// ============================================================================
// Operator caches
// ============================================================================

fn binary_adder(rt: &mut Runtime, globals: RawObject) -> RawObject {
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadFast, 1)
        .emit(Bytecode::BinaryAdd, 0)
        .emit(Bytecode::ReturnValue, 0);
    function(
        rt,
        globals,
        Body {
            name: "add",
            bytecode: writer.finish(),
            consts: vec![RawObject::none()],
            names: &[],
            varnames: &["a", "b"],
            argcount: 2,
        },
    )
}

fn constant_operator(rt: &mut Runtime, globals: RawObject, value: i64) -> RawObject {
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadConst, 0).emit(Bytecode::ReturnValue, 0);
    function(
        rt,
        globals,
        Body {
            name: "__add__",
            bytecode: writer.finish(),
            consts: vec![RawObject::small_int(value)],
            names: &[],
            varnames: &["self", "other"],
            argcount: 2,
        },
    )
}

#[test]
fn test_operator_cache_sees_redefinition() {
    for config in configs() {
        let mut rt = Runtime::new(config).unwrap();
        let globals = rt.new_dict().unwrap();
        let adder = binary_adder(&mut rt, globals);
        let first = constant_operator(&mut rt, globals, 1);
        let second = constant_operator(&mut rt, globals, 2);

        let namespace = rt.new_dict().unwrap();
        let selector = rt.intern("__add__").unwrap();
        rt.dict_at_put(namespace, selector, first).unwrap();
        let bases = rt.new_tuple(0).unwrap();
        let name = rt.intern("Num").unwrap();
        let ty = rt.new_type(name, bases, namespace).unwrap();
        let left = rt.call(ty, &[]).unwrap();
        let right = rt.call(ty, &[]).unwrap();

        assert_eq!(rt.call(adder, &[left, right]).unwrap(), RawObject::small_int(1));
        assert_eq!(rt.call(adder, &[left, right]).unwrap(), RawObject::small_int(1));
        assert_eq!(
            rt.call(adder, &[RawObject::small_int(3), RawObject::small_int(4)]).unwrap(),
            RawObject::small_int(7)
        );

        rt.set_attribute_str(ty, "__add__", second).unwrap();
        assert_eq!(rt.call(adder, &[left, right]).unwrap(), RawObject::small_int(2));
    }
}

#[test]
fn test_operator_cache_mixed_int_and_float() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let adder = binary_adder(&mut rt, globals);
    let half = rt.new_float(0.5).unwrap();
    for _ in 0..2 {
        let result = rt.call(adder, &[RawObject::small_int(2), half]).unwrap();
        assert_eq!(rt.float_value(result), Some(2.5));
        let result = rt.call(adder, &[half, RawObject::small_int(2)]).unwrap();
        assert_eq!(rt.float_value(result), Some(2.5));
    }
}

// ============================================================================
// Exceptions across Rust re-entry
// ============================================================================

fn raising_operator(rt: &mut Runtime, globals: RawObject, exception: &'static [&'static str]) -> RawObject {
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadGlobal, 0).emit(Bytecode::RaiseVarargs, 1);
    function(
        rt,
        globals,
        Body {
            name: "__add__",
            bytecode: writer.finish(),
            consts: vec![],
            names: exception,
            varnames: &["self", "other"],
            argcount: 2,
        },
    )
}

fn guarded_adder(rt: &mut Runtime, globals: RawObject) -> RawObject {
    let mut writer = BytecodeWriter::new();
    let handler = writer.emit_forward(Bytecode::SetupFinally);
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadFast, 1)
        .emit(Bytecode::BinaryAdd, 0)
        .emit(Bytecode::PopBlock, 0)
        .emit(Bytecode::ReturnValue, 0);
    writer.bind(handler);
    writer
        .emit(Bytecode::DupTop, 0)
        .emit(Bytecode::LoadGlobal, 0)
        .emit(Bytecode::CompareOp, CompareOp::ExcMatch as u32);
    let reraise = writer.emit_jump(Bytecode::PopJumpIfFalse);
    writer
        .emit(Bytecode::PopTop, 0)
        .emit(Bytecode::PopTop, 0)
        .emit(Bytecode::PopTop, 0)
        .emit(Bytecode::PopExcept, 0)
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::ReturnValue, 0);
    writer.bind(reraise);
    writer.emit(Bytecode::Reraise, 0);
    function(
        rt,
        globals,
        Body {
            name: "guarded",
            bytecode: writer.finish(),
            consts: vec![RawObject::small_int(-1)],
            names: &["KeyError"],
            varnames: &["a", "b"],
            argcount: 2,
        },
    )
}

fn instance_with_operator(rt: &mut Runtime, operator: RawObject) -> RawObject {
    let namespace = rt.new_dict().unwrap();
    let selector = rt.intern("__add__").unwrap();
    rt.dict_at_put(namespace, selector, operator).unwrap();
    let bases = rt.new_tuple(0).unwrap();
    let name = rt.intern("Faulty").unwrap();
    let ty = rt.new_type(name, bases, namespace).unwrap();
    rt.call(ty, &[]).unwrap()
}

#[test]
fn test_handler_catches_exception_from_nested_call() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let operator = raising_operator(&mut rt, globals, &["KeyError"]);
    let guarded = guarded_adder(&mut rt, globals);
    let instance = instance_with_operator(&mut rt, operator);

    assert_eq!(rt.call(guarded, &[instance, instance]).unwrap(), RawObject::small_int(-1));
    assert!(!rt.thread().has_pending_exception());
    assert!(rt.thread().handled_exception.is_none());
    assert_eq!(rt.thread().depth(), 0);
}

#[test]
fn test_unhandled_exception_records_every_frame() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let globals = rt.new_dict().unwrap();
    let operator = raising_operator(&mut rt, globals, &["ValueError"]);
    let adder = binary_adder(&mut rt, globals);
    let instance = instance_with_operator(&mut rt, operator);

    let error = rt.call(adder, &[instance, instance]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::ValueError);
    let functions: Vec<&str> = error.traceback.iter().map(|entry| entry.function.as_str()).collect();
    assert_eq!(functions, vec!["__add__", "add"]);
    assert!(!rt.thread().has_pending_exception());
}

// ============================================================================
// Collection during execution
// ============================================================================

#[test]
fn test_collection_between_instructions() {
    let mut rt = Runtime::new(RuntimeConfig {
        heap_size: 2 * 1024 * 1024,
        ..RuntimeConfig::default()
    })
    .unwrap();
    let globals = rt.new_dict().unwrap();
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadConst, 0).emit(Bytecode::StoreFast, 0);
    let top = writer.offset();
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadConst, 1)
        .emit(Bytecode::CompareOp, CompareOp::Lt as u32);
    let done = writer.emit_jump(Bytecode::PopJumpIfFalse);
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::BuildTuple, 3)
        .emit(Bytecode::StoreFast, 1)
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadConst, 2)
        .emit(Bytecode::InplaceAdd, 0)
        .emit(Bytecode::StoreFast, 0)
        .emit(Bytecode::JumpAbsolute, top as u32);
    writer.bind(done);
    writer.emit(Bytecode::LoadFast, 1).emit(Bytecode::ReturnValue, 0);
    let looper = function(
        &mut rt,
        globals,
        Body {
            name: "looper",
            bytecode: writer.finish(),
            consts: vec![RawObject::small_int(0), RawObject::small_int(80_000), RawObject::small_int(1)],
            names: &[],
            varnames: &["i", "t"],
            argcount: 0,
        },
    );
    let looper = rt.new_handle(looper);

    let result = rt.call(rt.handle(looper), &[]).unwrap();
    assert!(rt.heap().stats().collections >= 1);
    let last = RawObject::small_int(79_999);
    assert_eq!(rt.tuple_items(result), Some(vec![last, last, last]));

    let again = rt.call(rt.handle(looper), &[]).unwrap();
    assert_eq!(rt.tuple_items(again), Some(vec![last, last, last]));
}
