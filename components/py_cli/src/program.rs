//! Program descriptions
//!
//! A program is the JSON form of a module code object:
//!
//! ```json
//! {
//!   "name": "<module>",
//!   "bytecode": [["LOAD_CONST", 0], ["RETURN_VALUE", 0]],
//!   "consts": [42]
//! }
//! ```
//!
//! Constants are `null`, booleans, integers, floats and strings, plus the
//! objects `{"bigint": "<digits>"}`, `{"bytes": [..]}`, `{"tuple": [..]}`
//! and nested code descriptions. Opcode names and big integers are checked
//! while the JSON is read, so building a checked program only fails when
//! the heap does.

use std::path::Path;
use std::str::FromStr;

use bytecode_system::{Bytecode, BytecodeWriter};
use core_types::{RawObject, VmResult};
use interpreter::Runtime;
use memory_manager::{CodeFields, Handle};
use num_bigint::BigInt;
use serde::{Deserialize, Deserializer};

use crate::error::{CliError, CliResult};

/// First opcode number of the forms only the cache rewriter produces.
const FIRST_SPECIALIZED_OPCODE: u8 = 200;

/// One instruction, written `[opname, arg]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "(String, u32)")]
pub struct Instruction {
    /// The opcode
    pub bytecode: Bytecode,
    /// Its argument; values above 255 get EXTENDED_ARG prefixes
    pub arg: u32,
}

impl TryFrom<(String, u32)> for Instruction {
    type Error = String;

    fn try_from((name, arg): (String, u32)) -> Result<Self, Self::Error> {
        let bytecode = Bytecode::from_name(&name).ok_or_else(|| format!("unknown opcode '{}'", name))?;
        if bytecode.byte() >= FIRST_SPECIALIZED_OPCODE {
            return Err(format!("{} is only produced by the cache rewriter", name));
        }
        Ok(Instruction { bytecode, arg })
    }
}

/// A constant of a code object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    /// `null`
    None(()),
    /// `true` or `false`
    Bool(bool),
    /// An integer that fits 64 bits
    Int(i64),
    /// A float
    Float(f64),
    /// A str
    Str(String),
    /// An integer of any size, given as decimal digits
    BigInt {
        /// The value
        #[serde(deserialize_with = "decimal_bigint")]
        bigint: BigInt,
    },
    /// A bytes object
    Bytes {
        /// The contents
        bytes: Vec<u8>,
    },
    /// A tuple of constants
    Tuple {
        /// The elements
        tuple: Vec<Constant>,
    },
    /// A nested code object, e.g. a function body
    Code(Box<CodeSpec>),
}

fn decimal_bigint<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
    let text = String::deserialize(deserializer)?;
    BigInt::from_str(&text).map_err(|e| serde::de::Error::custom(format!("invalid bigint '{}': {}", text, e)))
}

fn module_name() -> String {
    "<module>".to_string()
}

/// A code object description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeSpec {
    /// Code name; also the qualname of functions made from it
    #[serde(default = "module_name")]
    pub name: String,
    /// Positional parameters
    #[serde(default)]
    pub argcount: i64,
    /// Positional-only parameters
    #[serde(default)]
    pub posonlyargcount: i64,
    /// Keyword-only parameters
    #[serde(default)]
    pub kwonlyargcount: i64,
    /// Local slots; defaults to the number of varnames
    #[serde(default)]
    pub nlocals: Option<i64>,
    /// Value stack size hint
    #[serde(default)]
    pub stacksize: i64,
    /// Code flags
    #[serde(default)]
    pub flags: i64,
    /// Instructions
    pub bytecode: Vec<Instruction>,
    /// Constants
    #[serde(default)]
    pub consts: Vec<Constant>,
    /// Attribute and global names
    #[serde(default)]
    pub names: Vec<String>,
    /// Local variable names, parameters first
    #[serde(default)]
    pub varnames: Vec<String>,
    /// Free variable names
    #[serde(default)]
    pub freevars: Vec<String>,
    /// Cell variable names
    #[serde(default)]
    pub cellvars: Vec<String>,
    /// Source file name
    #[serde(default)]
    pub filename: Option<String>,
    /// First source line
    #[serde(default)]
    pub firstlineno: i64,
}

impl CodeSpec {
    /// Encode the instructions into two-byte code units.
    pub fn assemble(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        for instruction in &self.bytecode {
            writer.emit(instruction.bytecode, instruction.arg);
        }
        writer.finish()
    }

    /// This code and every code constant below it, depth first.
    pub fn code_objects(&self) -> Vec<&CodeSpec> {
        let mut out = vec![self];
        for constant in &self.consts {
            collect_code(constant, &mut out);
        }
        out
    }

    /// Create the code object on the heap of `rt`.
    pub fn build(&self, rt: &mut Runtime) -> VmResult<RawObject> {
        rt.with_handles(|rt| {
            let bytecode = rt.new_bytes(&self.assemble())?;
            let bytecode = rt.new_handle(bytecode);
            let consts = constant_tuple(rt, &self.consts)?;
            let consts = rt.new_handle(consts);
            let names = name_tuple(rt, &self.names)?;
            let names = rt.new_handle(names);
            let varnames = name_tuple(rt, &self.varnames)?;
            let varnames = rt.new_handle(varnames);
            let freevars = name_tuple(rt, &self.freevars)?;
            let freevars = rt.new_handle(freevars);
            let cellvars = name_tuple(rt, &self.cellvars)?;
            let cellvars = rt.new_handle(cellvars);
            let filename = match &self.filename {
                Some(filename) => rt.new_str(filename)?,
                None => RawObject::none(),
            };
            let filename = rt.new_handle(filename);
            let name = rt.intern(&self.name)?;
            rt.new_code(&CodeFields {
                argcount: self.argcount,
                posonlyargcount: self.posonlyargcount,
                kwonlyargcount: self.kwonlyargcount,
                nlocals: self.nlocals.unwrap_or(self.varnames.len() as i64),
                stacksize: self.stacksize,
                flags: self.flags,
                code: rt.handle(bytecode),
                consts: rt.handle(consts),
                names: rt.handle(names),
                varnames: rt.handle(varnames),
                freevars: rt.handle(freevars),
                cellvars: rt.handle(cellvars),
                filename: rt.handle(filename),
                name,
                firstlineno: self.firstlineno,
                lnotab: RawObject::none(),
            })
        })
    }
}

fn collect_code<'a>(constant: &'a Constant, out: &mut Vec<&'a CodeSpec>) {
    match constant {
        Constant::Code(code) => out.extend(code.code_objects()),
        Constant::Tuple { tuple } => tuple.iter().for_each(|element| collect_code(element, out)),
        _ => {}
    }
}

/// Tuple of the values held by `handles`.
fn tuple_of(rt: &mut Runtime, handles: &[Handle]) -> VmResult<RawObject> {
    let values: Vec<RawObject> = handles.iter().map(|handle| rt.handle(*handle)).collect();
    rt.new_tuple_from(&values)
}

fn name_tuple(rt: &mut Runtime, names: &[String]) -> VmResult<RawObject> {
    let mut handles = Vec::with_capacity(names.len());
    for name in names {
        let name = rt.intern(name)?;
        handles.push(rt.new_handle(name));
    }
    tuple_of(rt, &handles)
}

fn constant_tuple(rt: &mut Runtime, constants: &[Constant]) -> VmResult<RawObject> {
    let mut handles = Vec::with_capacity(constants.len());
    for constant in constants {
        let value = constant_object(rt, constant)?;
        handles.push(rt.new_handle(value));
    }
    tuple_of(rt, &handles)
}

fn constant_object(rt: &mut Runtime, constant: &Constant) -> VmResult<RawObject> {
    match constant {
        Constant::None(()) => Ok(RawObject::none()),
        Constant::Bool(value) => Ok(RawObject::bool(*value)),
        Constant::Int(value) => rt.new_int(&BigInt::from(*value)),
        Constant::Float(value) => rt.new_float(*value),
        Constant::Str(value) => rt.new_str(value),
        Constant::BigInt { bigint } => rt.new_int(bigint),
        Constant::Bytes { bytes } => rt.new_bytes(bytes),
        Constant::Tuple { tuple } => rt.with_handles(|rt| constant_tuple(rt, tuple)),
        Constant::Code(code) => code.build(rt),
    }
}

/// A loaded program: the module code description.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Module body
    pub module: CodeSpec,
}

impl Program {
    /// Parse a program from JSON text.
    pub fn from_json_str(text: &str) -> CliResult<Self> {
        let module = serde_json::from_str(text)?;
        Ok(Program { module })
    }

    /// Read a program file.
    pub fn from_file(path: impl AsRef<Path>) -> CliResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
