//! Contract compliance tests for memory_manager
//! Verifies the heap behaviour the interpreter relies on

use core_types::{ErrorKind, RawObject};
use memory_manager::{Handles, Heap, Tuple, WeakLink};

/// Test that allocation failure is reported as OutOfMemory
#[test]
fn test_contract_out_of_memory_is_reported() {
    let mut heap = Heap::new(256);
    let error = heap.create_tuple(1000).unwrap_err();
    assert_eq!(error.kind, ErrorKind::OutOfMemory);
}

/// Test that identity is preserved across a collection
#[test]
fn test_contract_identity_is_preserved() {
    let mut heap = Heap::new(4096);
    let mut handles = Handles::new();
    let shared = heap.create_tuple(0).unwrap();
    let a = handles.new_handle(shared);
    let b = handles.new_handle(shared);
    heap.collect(|visit| handles.visit(visit));
    assert_eq!(handles.handle(a), handles.handle(b));
}

/// Test that heap references are tagged and immediates are not heap objects
#[test]
fn test_contract_heap_references_are_tagged() {
    let mut heap = Heap::new(4096);
    let tuple = heap.create_tuple(0).unwrap();
    assert!(tuple.is_heap_object());
    assert!(!tuple.is_small_int());
    assert!(heap.header(RawObject::small_int(1)).is_none());
    assert!(Tuple::cast(&heap, tuple).is_some());
}

/// Test that weak referents do not keep objects alive
#[test]
fn test_contract_weak_referents_are_not_roots() {
    let mut heap = Heap::new(4096);
    let referent = heap.create_tuple(0).unwrap();
    let mut link = heap
        .create_weak_link(referent, RawObject::none(), RawObject::none())
        .unwrap();
    heap.collect(|visit| visit(&mut link));
    assert_eq!(heap.stats().objects_copied, 1);
    assert!(WeakLink::from_raw(link).referent(&heap).is_none());
}
