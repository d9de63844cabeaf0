//! Program execution for the command line
//!
//! The Runner owns one interpreter runtime and drives it:
//! - building a program's code objects on the runtime heap
//! - running the module body, then an optional entry function
//! - rendering results, tracebacks and disassembly as text

use std::fmt::Write as _;
use std::io::Write;

use bytecode_system::disassemble;
use core_types::{ErrorKind, VmError};
use interpreter::{repr, Interpreter, Runtime, RuntimeConfig};
use log::{debug, info};
use memory_manager::{Function, MutableBytes};

use crate::error::{CliError, CliResult};
use crate::program::{CodeSpec, Program};

/// Runs programs on one runtime.
pub struct Runner {
    runtime: Runtime,
}

impl Runner {
    /// Create a runner with a fresh runtime.
    ///
    /// # Example
    /// ```
    /// use interpreter::RuntimeConfig;
    /// use py_cli::{Program, Runner};
    ///
    /// let program = Program::from_json_str(
    ///     r#"{ "bytecode": [["LOAD_CONST", 0], ["RETURN_VALUE", 0]], "consts": [6] }"#,
    /// )
    /// .unwrap();
    /// let mut runner = Runner::new(RuntimeConfig::default()).unwrap();
    /// assert_eq!(runner.run(&program, None).unwrap(), Some("6".to_string()));
    /// ```
    pub fn new(config: RuntimeConfig) -> CliResult<Self> {
        Ok(Self {
            runtime: Runtime::new(config)?,
        })
    }

    /// Send output of `print` to `stdout` instead of the process stdout.
    pub fn with_stdout(mut self, stdout: Box<dyn Write>) -> Self {
        self.runtime.set_stdout(stdout);
        self
    }

    /// Run the module body of `program`, then call the global `entry` with
    /// no arguments if one is named.
    ///
    /// # Returns
    /// The repr of the final result, or None when the result is None
    ///
    /// # Errors
    /// Returns `CliError::Vm` for uncaught exceptions
    pub fn run(&mut self, program: &Program, entry: Option<&str>) -> CliResult<Option<String>> {
        let output = self.runtime.with_handles(|rt| {
            let code = program.module.build(rt)?;
            let code = rt.new_handle(code);
            let globals = rt.new_dict()?;
            let globals = rt.new_handle(globals);
            info!("running {}", program.module.name);
            let (code, globals_dict) = (rt.handle(code), rt.handle(globals));
            let mut result = Interpreter.run_code(rt, code, globals_dict)?;
            if let Some(entry) = entry {
                let globals = rt.handle(globals);
                let function = rt.get_global(globals, entry)?.ok_or_else(|| {
                    VmError::new(ErrorKind::NameError, format!("name '{}' is not defined", entry))
                })?;
                debug!("calling entry point {}", entry);
                result = Interpreter.call(rt, function, &[])?;
            }
            if result.is_none() {
                return Ok(None);
            }
            repr(rt, result).map(Some)
        })?;
        Ok(output)
    }

    /// Disassemble every code object of `program`.
    ///
    /// With `rewritten` the bytecode is shown as functions execute it,
    /// after the inline cache rewrite of the runtime's configuration.
    pub fn disassemble(&mut self, program: &Program, rewritten: bool) -> CliResult<String> {
        let mut out = String::new();
        for (index, code) in program.module.code_objects().into_iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let bytecode = if rewritten {
                self.rewritten_bytecode(code)?
            } else {
                code.assemble()
            };
            let _ = writeln!(out, "Disassembly of {}:", code.name);
            out.push_str(&disassemble(&bytecode));
        }
        Ok(out)
    }

    fn rewritten_bytecode(&mut self, code: &CodeSpec) -> CliResult<Vec<u8>> {
        let bytecode = self.runtime.with_handles(|rt| {
            let code_object = code.build(rt)?;
            let code_object = rt.new_handle(code_object);
            let qualname = rt.intern(&code.name)?;
            let qualname = rt.new_handle(qualname);
            let globals = rt.new_dict()?;
            let function = rt.new_function(rt.handle(code_object), rt.handle(qualname), globals)?;
            let bytecode = Function::from_raw(function).rewritten_bytecode(rt.heap());
            Ok(MutableBytes::from_raw(bytecode).bytes(rt.heap()))
        })?;
        Ok(bytecode)
    }
}

/// Render an uncaught error the way the command line reports it.
///
/// The traceback is printed outermost frame first.
pub fn format_error(error: &CliError) -> String {
    let CliError::Vm(error) = error else {
        return format!("error: {}", error);
    };
    let mut out = String::new();
    if !error.traceback.is_empty() {
        out.push_str("Traceback (most recent call last):\n");
        for entry in error.traceback.iter().rev() {
            let _ = writeln!(out, "  in {} at offset {}", entry.function, entry.pc);
        }
    }
    out.push_str(&error.to_string());
    out
}
