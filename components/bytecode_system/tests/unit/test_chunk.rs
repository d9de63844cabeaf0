//! Tests for BytecodeWriter and the disassembler

use bytecode_system::{disassemble, Bytecode, BytecodeOps, BytecodeWriter};

#[test]
fn test_writer_starts_empty() {
    let writer = BytecodeWriter::new();
    assert_eq!(writer.offset(), 0);
    assert!(writer.finish().is_empty());
}

#[test]
fn test_offsets_account_for_prefixes() {
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::Nop, 0);
    assert_eq!(writer.offset(), 2);
    writer.emit(Bytecode::LoadConst, 256);
    assert_eq!(writer.offset(), 6);
    writer.emit(Bytecode::LoadConst, 0x10000);
    assert_eq!(writer.offset(), 12);
}

#[test]
fn test_written_arguments_decode_back() {
    let mut writer = BytecodeWriter::new();
    for arg in [0u32, 255, 256, 0xffff, 0x12_3456] {
        writer.emit(Bytecode::LoadAttr, arg);
    }
    let code = writer.finish();
    let args: Vec<i32> = BytecodeOps::new(&code).map(|(_, _, op)| op.arg).collect();
    assert_eq!(args, vec![0, 255, 256, 0xffff, 0x12_3456]);
}

#[test]
fn test_try_block_layout() {
    let mut writer = BytecodeWriter::new();
    let handler = writer.emit_forward(Bytecode::SetupFinally);
    writer.emit(Bytecode::LoadConst, 0);
    writer.emit(Bytecode::PopBlock, 0);
    let end = writer.emit_forward(Bytecode::JumpForward);
    writer.bind(handler);
    writer.emit(Bytecode::PopTop, 0);
    writer.bind(end);
    let code = writer.finish();
    // handler starts right after JUMP_FORWARD at offset 8
    assert_eq!(code[1], 6);
    assert_eq!(code[7], 2);
}

#[test]
fn test_disassemble_lists_offsets() {
    let mut writer = BytecodeWriter::new();
    writer
        .emit(Bytecode::LoadGlobal, 0)
        .emit(Bytecode::CallFunction, 0)
        .emit(Bytecode::ReturnValue, 0);
    let text = disassemble(&writer.finish());
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("LOAD_GLOBAL 0"));
    assert!(text.lines().nth(2).unwrap().trim_start().starts_with("4 RETURN_VALUE"));
}
