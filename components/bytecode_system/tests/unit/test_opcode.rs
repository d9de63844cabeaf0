//! Tests for the Bytecode, BinaryOp and CompareOp tables

use bytecode_system::{BinaryOp, Bytecode, CompareOp};

#[test]
fn test_cached_opcodes_are_numbered_from_200() {
    assert_eq!(Bytecode::CompareIs.byte(), 200);
    assert_eq!(Bytecode::LoadImmediate.byte(), 204);
    assert_eq!(Bytecode::StoreGlobalCached.byte(), 212);
}

#[test]
fn test_names_use_disassembly_spelling() {
    assert_eq!(Bytecode::LoadAttrCached.name(), "LOAD_ATTR_CACHED");
    assert_eq!(Bytecode::from_name("CALL_METHOD"), Some(Bytecode::CallMethod));
    assert_eq!(Bytecode::BinaryAdd.to_string(), "BINARY_ADD");
}

#[test]
fn test_all_is_sorted_and_unique() {
    let bytes: Vec<u8> = Bytecode::ALL.iter().map(|bc| bc.byte()).collect();
    let mut sorted = bytes.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(bytes, sorted);
}

#[test]
fn test_attribute_cache_users() {
    assert!(Bytecode::LoadAttrCached.uses_attribute_cache());
    assert!(Bytecode::CompareOpCached.uses_attribute_cache());
    assert!(!Bytecode::LoadGlobalCached.uses_attribute_cache());
    assert!(!Bytecode::LoadAttr.uses_attribute_cache());
}

#[test]
fn test_every_binary_opcode_has_an_inplace_twin() {
    for bc in Bytecode::ALL {
        if let Some(op) = bc.binary_op() {
            let twin = Bytecode::ALL
                .iter()
                .find(|other| other.inplace_op() == Some(op));
            assert!(twin.is_some(), "no in-place form of {}", bc);
        }
    }
}

#[test]
fn test_selectors() {
    assert_eq!(BinaryOp::Truediv.selector(), "__truediv__");
    assert_eq!(BinaryOp::Truediv.swapped_selector(), "__rtruediv__");
    assert_eq!(BinaryOp::Truediv.inplace_selector(), "__itruediv__");
    assert_eq!(BinaryOp::Floordiv.symbol(), "//");
    assert_eq!(CompareOp::Le.selector(), Some("__le__"));
    assert_eq!(CompareOp::Ge.swapped(), CompareOp::Le);
    assert_eq!(CompareOp::ExcMatch.selector(), None);
}
