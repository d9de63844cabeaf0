//! Decoding of code units.
//!
//! Bytecode is a flat sequence of two-byte code units `(opcode, arg)`.
//! Arguments wider than a byte are spelled with EXTENDED_ARG prefixes, each
//! contributing the next eight high bits: `EXTENDED_ARG 1, EXTENDED_ARG 2,
//! LOAD_ATTR 3` loads attribute `0x010203`.

use crate::opcode::Bytecode;

/// Bytes per code unit.
pub const CODE_UNIT_SIZE: usize = 2;

/// One decoded instruction with its EXTENDED_ARG prefixes folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeOp {
    /// Raw opcode byte
    pub opcode: u8,
    /// Full argument
    pub arg: i32,
}

impl BytecodeOp {
    /// The opcode, if the byte names a defined bytecode.
    pub fn bytecode(&self) -> Option<Bytecode> {
        Bytecode::from_byte(self.opcode)
    }

    /// Whether the opcode is `bc`.
    pub fn is(&self, bc: Bytecode) -> bool {
        self.opcode == bc.byte()
    }
}

fn byte_at(bytecode: &[u8], index: usize) -> u8 {
    bytecode.get(index).copied().unwrap_or(0)
}

/// Decode the instruction at `*index` and advance past it.
///
/// EXTENDED_ARG prefixes are consumed and folded into the argument of the
/// following instruction. A trailing half unit decodes with argument zero.
pub fn next_bytecode_op(bytecode: &[u8], index: &mut usize) -> BytecodeOp {
    let extended_arg = Bytecode::ExtendedArg.byte();
    let mut opcode = byte_at(bytecode, *index);
    let mut arg = byte_at(bytecode, *index + 1) as i32;
    *index += CODE_UNIT_SIZE;
    while opcode == extended_arg && *index < bytecode.len() {
        opcode = byte_at(bytecode, *index);
        arg = (arg << 8) | byte_at(bytecode, *index + 1) as i32;
        *index += CODE_UNIT_SIZE;
    }
    BytecodeOp { opcode, arg }
}

/// Iterator over the instructions of a bytecode string.
///
/// Yields the byte offset of the first prefix, the offset just past the
/// instruction, and the decoded instruction.
#[derive(Debug, Clone)]
pub struct BytecodeOps<'a> {
    bytecode: &'a [u8],
    index: usize,
}

impl<'a> BytecodeOps<'a> {
    /// Iterate over `bytecode` from the start.
    pub fn new(bytecode: &'a [u8]) -> Self {
        BytecodeOps { bytecode, index: 0 }
    }
}

impl Iterator for BytecodeOps<'_> {
    type Item = (usize, usize, BytecodeOp);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.bytecode.len() {
            return None;
        }
        let begin = self.index;
        let op = next_bytecode_op(self.bytecode, &mut self.index);
        Some((begin, self.index, op))
    }
}
