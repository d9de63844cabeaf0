//! Bytecode System and Interpreter Integration Tests
//!
//! Tests that assembled bytecode runs correctly through the rewrite pass
//! and the dispatch loop, with and without inline caches.

use bytecode_system::{disassemble, Bytecode, BytecodeWriter, CompareOp};
use core_types::RawObject;
use interpreter::{Interpreter, Runtime, RuntimeConfig};
use memory_manager::{CodeFields, Function, MutableBytes};

fn configs() -> [RuntimeConfig; 2] {
    [
        RuntimeConfig::default(),
        RuntimeConfig {
            cache_enabled: false,
            ..RuntimeConfig::default()
        },
    ]
}

fn code(rt: &mut Runtime, bytecode: Vec<u8>, consts: &[RawObject], names: &[&str], varnames: &[&str]) -> RawObject {
    let bytecode = rt.new_bytes(&bytecode).unwrap();
    let consts = rt.new_tuple_from(consts).unwrap();
    let names: Vec<RawObject> = names.iter().map(|name| rt.intern(name).unwrap()).collect();
    let names = rt.new_tuple_from(&names).unwrap();
    let varnames_tuple: Vec<RawObject> = varnames.iter().map(|name| rt.intern(name).unwrap()).collect();
    let varnames_tuple = rt.new_tuple_from(&varnames_tuple).unwrap();
    let empty = rt.new_tuple(0).unwrap();
    let name = rt.intern("<module>").unwrap();
    rt.new_code(&CodeFields {
        argcount: 0,
        posonlyargcount: 0,
        kwonlyargcount: 0,
        nlocals: varnames.len() as i64,
        stacksize: 4,
        flags: 0,
        code: bytecode,
        consts,
        names,
        varnames: varnames_tuple,
        freevars: empty,
        cellvars: empty,
        filename: RawObject::none(),
        name,
        firstlineno: 1,
        lnotab: RawObject::none(),
    })
    .unwrap()
}

/// `total = 0; i = 0; while i < limit: total += i; i += 1; return total`
fn summing_loop(limit: i64) -> (Vec<u8>, Vec<RawObject>) {
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::StoreFast, 0)
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::StoreFast, 1);
    let top = writer.offset();
    writer
        .emit(Bytecode::LoadFast, 1)
        .emit(Bytecode::LoadConst, 1)
        .emit(Bytecode::CompareOp, CompareOp::Lt as u32);
    let exit = writer.emit_jump(Bytecode::PopJumpIfFalse);
    writer
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::LoadFast, 1)
        .emit(Bytecode::InplaceAdd, 0)
        .emit(Bytecode::StoreFast, 0)
        .emit(Bytecode::LoadFast, 1)
        .emit(Bytecode::LoadConst, 2)
        .emit(Bytecode::InplaceAdd, 0)
        .emit(Bytecode::StoreFast, 1)
        .emit(Bytecode::JumpAbsolute, top as u32);
    writer.bind(exit);
    writer.emit(Bytecode::LoadFast, 0).emit(Bytecode::ReturnValue, 0);
    let consts = vec![
        RawObject::small_int(0),
        RawObject::small_int(limit),
        RawObject::small_int(1),
    ];
    (writer.finish(), consts)
}

/// Test: A counting loop with locals, comparisons and jumps
#[test]
fn test_summing_loop() {
    for config in configs() {
        let mut rt = Runtime::new(config).unwrap();
        let (bytecode, consts) = summing_loop(100);
        let code = code(&mut rt, bytecode, &consts, &[], &["total", "i"]);
        let globals = rt.new_dict().unwrap();
        let result = Interpreter.run_code(&mut rt, code, globals).unwrap();
        assert_eq!(result, RawObject::small_int(4950));
    }
}

/// Test: Arguments above 255 travel through EXTENDED_ARG prefixes
#[test]
fn test_extended_arg_constant_index() {
    for config in configs() {
        let mut rt = Runtime::new(config).unwrap();
        let consts: Vec<RawObject> = (0..300).map(|i| RawObject::small_int(i * 1000)).collect();
        let mut writer = BytecodeWriter::new();
        writer.emit(Bytecode::LoadConst, 299).emit(Bytecode::ReturnValue, 0);
        let bytecode = writer.finish();
        assert_eq!(bytecode[0], Bytecode::ExtendedArg.byte());

        let code = code(&mut rt, bytecode, &consts, &[], &[]);
        let globals = rt.new_dict().unwrap();
        let result = Interpreter.run_code(&mut rt, code, globals).unwrap();
        assert_eq!(result, RawObject::small_int(299_000));
    }
}

/// Test: Results grow past the SmallInt range inside the loop
#[test]
fn test_loop_promotes_to_large_int() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LoadConst, 0).emit(Bytecode::StoreFast, 0);
    for _ in 0..70 {
        writer
            .emit(Bytecode::LoadFast, 0)
            .emit(Bytecode::LoadConst, 1)
            .emit(Bytecode::InplaceMultiply, 0)
            .emit(Bytecode::StoreFast, 0);
    }
    writer.emit(Bytecode::LoadFast, 0).emit(Bytecode::ReturnValue, 0);
    let consts = [RawObject::small_int(1), RawObject::small_int(2)];
    let code = code(&mut rt, writer.finish(), &consts, &[], &["x"]);
    let globals = rt.new_dict().unwrap();
    let result = Interpreter.run_code(&mut rt, code, globals).unwrap();
    assert_eq!(
        rt.int_value(result).map(|value| value.to_string()).as_deref(),
        Some("1180591620717411303424")
    );
}

/// Test: Global sites stay generic until the first execution resolves them
#[test]
fn test_rewritten_function_disassembly() {
    let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadConst, 0)
        .emit(Bytecode::StoreFast, 0)
        .emit(Bytecode::LoadGlobal, 0)
        .emit(Bytecode::LoadAttr, 1)
        .emit(Bytecode::LoadFast, 0)
        .emit(Bytecode::BinaryAdd, 0)
        .emit(Bytecode::ReturnValue, 0);
    let code = code(&mut rt, writer.finish(), &[RawObject::small_int(5)], &["g", "attr"], &["x"]);
    let globals = rt.new_dict().unwrap();
    let qualname = rt.intern("f").unwrap();
    let function = rt.new_function(code, qualname, globals).unwrap();

    let opcode_names = |rt: &Runtime| -> Vec<String> {
        let bytecode = Function::from_raw(function).rewritten_bytecode(rt.heap());
        disassemble(&MutableBytes::from_raw(bytecode).bytes(rt.heap()))
            .lines()
            .map(|line| line.split_whitespace().nth(1).unwrap_or_default().to_string())
            .collect()
    };
    assert_eq!(
        opcode_names(&rt),
        vec![
            "LOAD_IMMEDIATE",
            "STORE_FAST_REVERSE",
            "LOAD_GLOBAL",
            "LOAD_ATTR_CACHED",
            "LOAD_FAST_REVERSE",
            "BINARY_OP_CACHED",
            "RETURN_VALUE"
        ]
    );

    let type_name = rt.new_str("Holder").unwrap();
    let bases = rt.new_tuple(0).unwrap();
    let namespace = rt.new_dict().unwrap();
    let attr = rt.intern("attr").unwrap();
    rt.dict_at_put(namespace, attr, RawObject::small_int(10)).unwrap();
    let holder = rt.new_type(type_name, bases, namespace).unwrap();
    rt.set_global(globals, "g", holder).unwrap();

    let result = Interpreter.call(&mut rt, function, &[]).unwrap();
    assert_eq!(result, RawObject::small_int(15));
    assert_eq!(opcode_names(&rt)[2], "LOAD_GLOBAL_CACHED");
}
