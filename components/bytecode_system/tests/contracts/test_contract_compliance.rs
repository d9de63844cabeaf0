//! Contract compliance tests for bytecode_system
//! Verifies the encoding the interpreter and the cache rewriter rely on

use bytecode_system::{next_bytecode_op, BinaryOp, Bytecode, CompareOp, CODE_UNIT_SIZE};

/// Test that EXTENDED_ARG prefixes fold as `arg = (arg << 8) | next`
#[test]
fn test_contract_extended_arg_folding() {
    let ext = Bytecode::ExtendedArg.byte();
    let code = [ext, 0xca, Bytecode::LoadAttr.byte(), 0xfe];
    let mut index = 0;
    let op = next_bytecode_op(&code, &mut index);
    assert_eq!(op.arg, 0xcafe);
    assert_eq!(index, 2 * CODE_UNIT_SIZE);
}

/// Test that the operator enumerations are stored as their ordinal
#[test]
fn test_contract_operator_ordinals() {
    assert_eq!(BinaryOp::Add as i32, 0);
    assert_eq!(BinaryOp::Or as i32, 12);
    assert_eq!(BinaryOp::from_arg(BinaryOp::Pow as i32), Some(BinaryOp::Pow));
    assert_eq!(CompareOp::Lt as i32, 0);
    assert_eq!(CompareOp::Is as i32, 8);
    assert_eq!(CompareOp::IsNot as i32, 9);
}

/// Test that every generic opcode the rewriter specializes exists
#[test]
fn test_contract_rewritten_opcodes() {
    for name in [
        "LOAD_ATTR",
        "LOAD_METHOD",
        "STORE_ATTR",
        "LOAD_CONST",
        "LOAD_FAST",
        "STORE_FAST",
        "LOAD_GLOBAL",
        "STORE_GLOBAL",
        "COMPARE_OP",
        "CALL_FUNCTION",
        "CALL_METHOD",
    ] {
        assert!(Bytecode::from_name(name).is_some(), "{}", name);
    }
}
