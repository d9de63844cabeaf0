//! Bytecode assembly and disassembly.

use std::fmt::Write as _;

use crate::instruction::{BytecodeOps, CODE_UNIT_SIZE};
use crate::opcode::Bytecode;

/// A forward jump whose target is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    unit: usize,
    relative: bool,
}

/// Builds a bytecode string one instruction at a time.
///
/// Arguments that do not fit a byte are emitted with the EXTENDED_ARG
/// prefixes [`next_bytecode_op`](crate::next_bytecode_op) expects.
///
/// # Examples
///
/// ```
/// use bytecode_system::{Bytecode, BytecodeWriter};
///
/// let mut writer = BytecodeWriter::new();
/// writer.emit(Bytecode::LoadAttr, 0x1234);
/// assert_eq!(
///     writer.finish(),
///     vec![Bytecode::ExtendedArg.byte(), 0x12, Bytecode::LoadAttr.byte(), 0x34]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BytecodeWriter {
    bytes: Vec<u8>,
}

impl BytecodeWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte offset, the address of the next instruction.
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    /// Append `bc` with argument `arg`.
    pub fn emit(&mut self, bc: Bytecode, arg: u32) -> &mut Self {
        self.emit_raw(bc.byte(), arg)
    }

    /// Append an instruction given as a raw opcode byte.
    pub fn emit_raw(&mut self, opcode: u8, arg: u32) -> &mut Self {
        let mut shift = 24;
        while shift > 0 && (arg >> shift) == 0 {
            shift -= 8;
        }
        while shift > 0 {
            self.bytes.push(Bytecode::ExtendedArg.byte());
            self.bytes.push((arg >> shift) as u8);
            shift -= 8;
        }
        self.bytes.push(opcode);
        self.bytes.push(arg as u8);
        self
    }

    /// Append a jump whose absolute target is bound later.
    ///
    /// Jump targets are limited to one byte.
    pub fn emit_jump(&mut self, bc: Bytecode) -> Label {
        let unit = self.offset();
        self.emit(bc, 0);
        Label {
            unit,
            relative: false,
        }
    }

    /// Append an instruction whose argument is a forward distance bound later,
    /// as used by JUMP_FORWARD and SETUP_FINALLY.
    pub fn emit_forward(&mut self, bc: Bytecode) -> Label {
        let unit = self.offset();
        self.emit(bc, 0);
        Label {
            unit,
            relative: true,
        }
    }

    /// Point `label` at the current offset.
    pub fn bind(&mut self, label: Label) {
        let target = self.offset();
        let arg = if label.relative {
            target - (label.unit + CODE_UNIT_SIZE)
        } else {
            target
        };
        debug_assert!(arg <= u8::MAX as usize, "jump target out of range");
        self.bytes[label.unit + 1] = arg as u8;
    }

    /// The finished bytecode.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Render `bytecode` one instruction per line.
///
/// EXTENDED_ARG prefixes are folded into the instruction they extend, and
/// unknown opcode bytes print as `<n>`.
pub fn disassemble(bytecode: &[u8]) -> String {
    let mut out = String::new();
    for (begin, _, op) in BytecodeOps::new(bytecode) {
        let _ = match op.bytecode() {
            Some(bc) => writeln!(out, "{:>6} {} {}", begin, bc.name(), op.arg),
            None => writeln!(out, "{:>6} <{}> {}", begin, op.opcode, op.arg),
        };
    }
    out
}
