//! Memory Manager and Interpreter Integration Tests
//!
//! Tests the integration between memory_manager and interpreter components.
//! Verifies that the runtime keeps its roots valid across collections.

use core_types::{ErrorKind, RawObject};
use interpreter::{Runtime, RuntimeConfig};
use memory_manager::WeakLink;

fn runtime(heap_size: usize) -> Runtime {
    Runtime::new(RuntimeConfig {
        heap_size,
        ..RuntimeConfig::default()
    })
    .unwrap()
}

/// Test: Handles follow their objects when a collection moves them
#[test]
fn test_handles_survive_collection() {
    let mut rt = runtime(1 << 21);
    let text = rt.new_str("a string too long to be immediate").unwrap();
    let tuple = rt.new_tuple_from(&[text, RawObject::small_int(3)]).unwrap();
    let handle = rt.new_handle(tuple);

    let stats = rt.collect();
    assert!(stats.objects_copied > 0);
    assert_eq!(rt.heap().stats().collections, 1);

    let tuple = rt.handle(handle);
    let items = rt.tuple_items(tuple).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(rt.str_value(items[0]).as_deref(), Some("a string too long to be immediate"));
    assert_eq!(items[1], RawObject::small_int(3));
}

/// Test: Weak links drop referents nothing else keeps alive
#[test]
fn test_weak_link_referent_cleared() {
    let mut rt = runtime(1 << 21);
    let kept = rt.new_float(1.25).unwrap();
    let kept = rt.new_handle(kept);
    let dropped = rt.new_float(2.5).unwrap();
    let strong_link = rt.new_weak_link(rt.handle(kept), RawObject::none(), RawObject::none()).unwrap();
    let strong_link = rt.new_handle(strong_link);
    let weak_link = rt.new_weak_link(dropped, RawObject::none(), RawObject::none()).unwrap();
    let weak_link = rt.new_handle(weak_link);

    let stats = rt.collect();
    assert!(stats.weak_referents_cleared >= 1);

    let cleared = WeakLink::from_raw(rt.handle(weak_link)).referent(rt.heap());
    assert!(cleared.is_none());
    let survivor = WeakLink::from_raw(rt.handle(strong_link)).referent(rt.heap());
    assert_eq!(survivor, rt.handle(kept));
    assert_eq!(rt.float_value(survivor), Some(1.25));
}

/// Test: Module globals are roots through their dict
#[test]
fn test_globals_survive_collection() {
    let mut rt = runtime(1 << 21);
    let globals = rt.new_dict().unwrap();
    let globals = rt.new_handle(globals);
    let value = rt.new_str("the value of a global variable").unwrap();
    rt.set_global(rt.handle(globals), "answer", value).unwrap();

    rt.collect();
    rt.collect();

    let globals = rt.handle(globals);
    let value = rt.get_global(globals, "answer").unwrap().unwrap();
    assert_eq!(rt.str_value(value).as_deref(), Some("the value of a global variable"));
    assert_eq!(rt.heap().stats().collections, 2);
}

/// Test: A full heap is collected and the allocation retried
#[test]
fn test_allocation_retries_after_collection() {
    let mut rt = runtime(1 << 21);
    let survivor = rt.new_str("kept across every collection").unwrap();
    let survivor = rt.new_handle(survivor);

    // Roughly 800 bytes each; the garbage outgrows the space several times
    for _ in 0..10_000 {
        rt.new_tuple(100).unwrap();
    }

    assert!(rt.heap().stats().collections >= 1);
    let survivor = rt.handle(survivor);
    assert_eq!(rt.str_value(survivor).as_deref(), Some("kept across every collection"));
}

/// Test: Requests larger than a semispace fail with an uncatchable error
#[test]
fn test_oversized_allocation_is_out_of_memory() {
    let mut rt = runtime(1 << 21);
    let collections = rt.heap().stats().collections;
    let error = rt.new_tuple(1 << 20).unwrap_err();
    assert_eq!(error.kind, ErrorKind::OutOfMemory);
    assert_eq!(rt.heap().stats().collections, collections);
    assert!(!error.kind.is_catchable());
    assert_eq!(error.to_string().split(':').next(), Some("MemoryError"));
}

/// Test: Interned names stay canonical after a collection
#[test]
fn test_interned_names_survive_collection() {
    let mut rt = runtime(1 << 21);
    let name = rt.intern("a_rather_long_attribute_name").unwrap();
    let before = rt.identity_hash(name);
    rt.collect();
    let again = rt.intern("a_rather_long_attribute_name").unwrap();
    assert_eq!(rt.str_value(again).as_deref(), Some("a_rather_long_attribute_name"));
    assert_eq!(rt.identity_hash(again), before);
}
