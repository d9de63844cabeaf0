//! Bytecode format for the Python runtime
//!
//! This crate defines the instruction set, the two-byte code unit encoding
//! with EXTENDED_ARG prefixes, and the operator enumerations shared by the
//! interpreter and the inline-cache rewriter.
//!
//! # Features
//!
//! - Standard opcode numbering plus specialized cached opcodes
//! - Decoding that folds EXTENDED_ARG prefixes into one argument
//! - An assembler with forward labels
//! - A disassembler for debugging and the command line
//!
//! # Example
//!
//! ```
//! use bytecode_system::{next_bytecode_op, Bytecode, BytecodeWriter};
//!
//! let mut writer = BytecodeWriter::new();
//! writer.emit(Bytecode::LoadConst, 0);
//! writer.emit(Bytecode::ReturnValue, 0);
//! let code = writer.finish();
//!
//! let mut index = 0;
//! let op = next_bytecode_op(&code, &mut index);
//! assert_eq!(op.bytecode(), Some(Bytecode::LoadConst));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod instruction;
pub mod opcode;

// Re-export main types at crate root
pub use chunk::{disassemble, BytecodeWriter, Label};
pub use instruction::{next_bytecode_op, BytecodeOp, BytecodeOps, CODE_UNIT_SIZE};
pub use opcode::{BinaryOp, Bytecode, CompareOp};
