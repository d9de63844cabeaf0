//! Tests for code unit decoding

use bytecode_system::{next_bytecode_op, Bytecode, BytecodeOps, BytecodeWriter, CODE_UNIT_SIZE};

#[test]
fn test_code_unit_size() {
    assert_eq!(CODE_UNIT_SIZE, 2);
}

#[test]
fn test_decode_sequence() {
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadFast, 1)
        .emit(Bytecode::LoadConst, 0x1ff)
        .emit(Bytecode::BinaryAdd, 0)
        .emit(Bytecode::ReturnValue, 0);
    let code = writer.finish();

    let mut index = 0;
    let mut ops = Vec::new();
    while index < code.len() {
        ops.push(next_bytecode_op(&code, &mut index));
    }
    let decoded: Vec<(Option<Bytecode>, i32)> = ops.iter().map(|op| (op.bytecode(), op.arg)).collect();
    assert_eq!(
        decoded,
        vec![
            (Some(Bytecode::LoadFast), 1),
            (Some(Bytecode::LoadConst), 0x1ff),
            (Some(Bytecode::BinaryAdd), 0),
            (Some(Bytecode::ReturnValue), 0),
        ]
    );
}

#[test]
fn test_unknown_opcode_decodes_to_raw_byte() {
    let code = [251u8, 9];
    let mut index = 0;
    let op = next_bytecode_op(&code, &mut index);
    assert_eq!(op.opcode, 251);
    assert_eq!(op.bytecode(), None);
}

#[test]
fn test_trailing_extended_arg() {
    let code = [Bytecode::ExtendedArg.byte(), 5];
    let ops: Vec<_> = BytecodeOps::new(&code).collect();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].2.is(Bytecode::ExtendedArg));
}
