//! Tests for object views and dicts

use core_types::RawObject;
use memory_manager::{code_flags, BoundMethod, Code, CodeFields, Dict, Function, FunctionFields, Heap};

fn builtin_code(heap: &mut Heap, index: i64) -> RawObject {
    let empty = heap.create_tuple(0).unwrap();
    let name = heap.create_str("len").unwrap();
    heap.create_code(&CodeFields {
        argcount: 1,
        posonlyargcount: 1,
        kwonlyargcount: 0,
        nlocals: 1,
        stacksize: 0,
        flags: code_flags::BUILTIN,
        code: RawObject::small_int(index),
        consts: empty,
        names: empty,
        varnames: empty,
        freevars: empty,
        cellvars: empty,
        filename: name,
        name,
        firstlineno: 0,
        lnotab: empty,
    })
    .unwrap()
}

#[test]
fn test_builtin_code_index() {
    let mut heap = Heap::new(4096);
    let code = Code::from_raw(builtin_code(&mut heap, 12));
    assert!(code.is_builtin(&heap));
    assert_eq!(code.builtin_index(&heap), Some(12));
}

#[test]
fn test_function_fields_survive_collection() {
    let mut heap = Heap::new(8192);
    let code = builtin_code(&mut heap, 3);
    let globals = heap.create_dict().unwrap();
    let name = heap.create_str("len").unwrap();
    let caches = heap.create_tuple(0).unwrap();
    let mut function = heap
        .create_function(&FunctionFields {
            code,
            globals,
            name,
            qualname: name,
            defaults: RawObject::none(),
            kwdefaults: RawObject::none(),
            rewritten_bytecode: RawObject::none(),
            caches,
            original_arguments: caches,
        })
        .unwrap();
    heap.collect(|visit| visit(&mut function));
    let function = Function::cast(&heap, function).unwrap();
    let code = Code::cast(&heap, function.code(&heap)).unwrap();
    assert_eq!(code.builtin_index(&heap), Some(3));
    assert!(Dict::cast(&heap, function.globals(&heap)).is_some());
}

#[test]
fn test_bound_method() {
    let mut heap = Heap::new(4096);
    let method = heap
        .create_bound_method(RawObject::small_int(1), RawObject::small_int(2))
        .unwrap();
    let method = BoundMethod::cast(&heap, method).unwrap();
    assert_eq!(method.function(&heap), RawObject::small_int(1));
    assert_eq!(method.receiver(&heap), RawObject::small_int(2));
}

#[test]
fn test_dict_survives_collection() {
    let mut heap = Heap::new(1 << 16);
    let mut dict = heap.create_dict().unwrap();
    let key = heap.create_str("global_name").unwrap();
    Dict::from_raw(dict)
        .at_put(&mut heap, key, 1234, RawObject::small_int(5))
        .unwrap();
    heap.collect(|visit| visit(&mut dict));
    let probe = heap.create_str("global_name").unwrap();
    assert_eq!(
        Dict::from_raw(dict).at(&heap, probe, 1234),
        Some(RawObject::small_int(5))
    );
}
