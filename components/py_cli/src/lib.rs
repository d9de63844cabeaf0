//! Corten Python CLI Library
//!
//! Loads JSON program descriptions, builds them on an interpreter runtime
//! and runs or disassembles them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod program;
pub mod runner;

pub use cli::{Cli, Command};
pub use error::{CliError, CliResult};
pub use program::{CodeSpec, Constant, Instruction, Program};
pub use runner::{format_error, Runner};
