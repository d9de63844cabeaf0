//! Tests for the copying collector

use core_types::RawObject;
use memory_manager::{Handles, Heap, Tuple, ValueCell, WeakLink};

// ============================================================================
// Roots
// ============================================================================

#[test]
fn test_handles_keep_objects_alive() {
    let mut heap = Heap::new(4096);
    let mut handles = Handles::new();
    let scope = handles.handle_scope();
    let tuple = heap.create_tuple_from(&[RawObject::small_int(42)]).unwrap();
    let handle = handles.new_handle(tuple);
    heap.create_tuple(10).unwrap();

    heap.collect(|visit| handles.visit(visit));

    let moved = handles.handle(handle);
    assert_ne!(moved, tuple);
    assert_eq!(Tuple::from_raw(moved).at(&heap, 0), RawObject::small_int(42));
    handles.close_scope(scope);
}

#[test]
fn test_collection_reclaims_garbage() {
    let mut heap = Heap::new(4096);
    for _ in 0..20 {
        heap.create_tuple(8).unwrap();
    }
    let used = heap.space().used();
    let stats = heap.collect(|_| {});
    assert_eq!(stats.bytes_before, used);
    assert_eq!(stats.bytes_after, 0);
    assert_eq!(heap.space().fill(), heap.space().start());
}

#[test]
fn test_allocation_succeeds_again_after_collection() {
    let mut heap = Heap::new(1024);
    while heap.create_tuple(4).is_ok() {}
    heap.collect(|_| {});
    assert!(heap.create_tuple(4).is_ok());
}

// ============================================================================
// Weak links
// ============================================================================

#[test]
fn test_weak_referent_cleared_when_unreachable() {
    let mut heap = Heap::new(4096);
    let referent = heap.create_tuple(1).unwrap();
    let mut link = heap
        .create_weak_link(referent, RawObject::none(), RawObject::none())
        .unwrap();
    let stats = heap.collect(|visit| visit(&mut link));
    assert_eq!(stats.weak_referents_cleared, 1);
    assert!(WeakLink::from_raw(link).referent(&heap).is_none());
}

#[test]
fn test_weak_referent_updated_when_reachable() {
    let mut heap = Heap::new(4096);
    let mut referent = heap.create_tuple_from(&[RawObject::small_int(9)]).unwrap();
    let mut link = heap
        .create_weak_link(referent, RawObject::none(), RawObject::none())
        .unwrap();
    heap.collect(|visit| {
        visit(&mut link);
        visit(&mut referent);
    });
    assert_eq!(WeakLink::from_raw(link).referent(&heap), referent);
}

#[test]
fn test_weak_link_neighbours_are_strong() {
    let mut heap = Heap::new(4096);
    let function = heap.create_tuple(0).unwrap();
    let tail = heap
        .create_weak_link(function, RawObject::none(), RawObject::none())
        .unwrap();
    let head = heap
        .create_weak_link(RawObject::small_int(1), RawObject::none(), tail)
        .unwrap();
    WeakLink::from_raw(tail).set_prev(&mut heap, head);
    let mut cell = heap.create_value_cell(RawObject::none()).unwrap();
    ValueCell::from_raw(cell).set_dependency_link(&mut heap, head);

    heap.collect(|visit| visit(&mut cell));

    let head = WeakLink::from_raw(ValueCell::from_raw(cell).dependency_link(&heap));
    let tail = WeakLink::from_raw(head.next(&heap));
    assert_eq!(tail.prev(&heap), head.raw());
    assert!(tail.referent(&heap).is_none());
    assert_eq!(head.referent(&heap), RawObject::small_int(1));
}
