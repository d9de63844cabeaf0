//! Tests for allocation from the active space

use core_types::{ErrorKind, LayoutId, ObjectFormat, RawObject};
use memory_manager::{Heap, Tuple};

// ============================================================================
// Allocation boundary
// ============================================================================

#[test]
fn test_allocate_exactly_remaining_space() {
    let mut heap = Heap::new(1024);
    heap.allocate(256, 0).unwrap();
    let remaining = heap.space().remaining();
    heap.allocate(remaining, 0).unwrap();
    assert_eq!(heap.space().fill(), heap.space().end());
}

#[test]
fn test_allocate_one_byte_too_many_fails_cleanly() {
    let mut heap = Heap::new(1024);
    let tuple = heap.create_tuple_from(&[RawObject::small_int(5)]).unwrap();
    let fill = heap.space().fill();
    let remaining = heap.space().remaining();
    let error = heap.allocate(remaining + 1, 0).unwrap_err();
    assert_eq!(error.kind, ErrorKind::OutOfMemory);
    // nothing moved and nothing was consumed
    assert_eq!(heap.space().fill(), fill);
    assert_eq!(Tuple::from_raw(tuple).at(&heap, 0), RawObject::small_int(5));
}

#[test]
fn test_request_larger_than_space() {
    let mut heap = Heap::new(1024);
    assert!(heap.exceeds_capacity(1025));
    assert!(!heap.exceeds_capacity(1024));
    assert!(heap.allocate(4096, 0).is_err());
    assert_eq!(heap.failed_request(), Some(4096));
    assert!(heap.last_failure_is_oversized());
}

#[test]
fn test_full_space_failure_is_not_oversized() {
    let mut heap = Heap::new(1024);
    heap.allocate(1024, 0).unwrap();
    assert!(heap.allocate(16, 0).is_err());
    assert_eq!(heap.failed_request(), Some(16));
    assert!(!heap.last_failure_is_oversized());
}

#[test]
fn test_contains_tracks_active_space() {
    let mut heap = Heap::new(1024);
    let mut tuple = heap.create_tuple(1).unwrap();
    assert!(heap.contains(tuple));
    assert!(heap.is_allocated(tuple));
    let old = tuple;
    heap.collect(|visit| visit(&mut tuple));
    assert!(heap.contains(tuple));
    assert!(!heap.contains(old));
    assert!(!heap.contains(RawObject::small_int(3)));
}

#[test]
fn test_visit_all_objects_sees_each_object_once() {
    let mut heap = Heap::new(1 << 16);
    let mut created = Vec::new();
    for length in 0..10 {
        created.push(heap.create_tuple(length).unwrap());
    }
    created.push(heap.create_bytes(&[7; 400]).unwrap());
    let mut seen = Vec::new();
    heap.visit_all_objects(&mut |object| seen.push(object));
    assert_eq!(seen, created);
}

#[test]
fn test_layout_of_immediates() {
    let heap = Heap::new(1024);
    assert_eq!(heap.layout_id_of(RawObject::small_int(1)), LayoutId::SMALL_INT);
    assert_eq!(heap.layout_id_of(RawObject::none()), LayoutId::NONE_TYPE);
    assert_eq!(heap.layout_id_of(RawObject::bool(true)), LayoutId::BOOL);
}

#[test]
fn test_large_count_objects() {
    let mut heap = Heap::new(1 << 16);
    let object = heap
        .allocate_object(LayoutId::TUPLE, ObjectFormat::ObjectArray, 300)
        .unwrap();
    assert_eq!(Tuple::from_raw(object).length(&heap), 300);
    assert!(Tuple::from_raw(object).at(&heap, 299).is_none());
}
