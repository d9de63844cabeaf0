//! Bytecode interpreter for the Python runtime
//!
//! This crate provides:
//! - The [`Runtime`]: heap roots, layouts, types, interning and builtins
//! - A dispatch loop over a two-byte stack bytecode with try blocks
//! - The calling convention, attribute resolution and operator protocols
//! - Inline caches for attributes, operators and globals, with dependency
//!   tracking that invalidates them when types or globals change
//! - The rewrite pass that assigns cache lines to bytecode sites
//! - A mutex primitive for embedding code
//!
//! # Example
//!
//! ```
//! use core_types::RawObject;
//! use interpreter::{Runtime, RuntimeConfig};
//!
//! let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
//! let globals = rt.new_dict().unwrap();
//! let abs = rt.intern("abs").unwrap();
//! let abs = rt.builtin_at(abs).unwrap().unwrap();
//! let result = rt.call(abs, &[RawObject::small_int(-7)]).unwrap();
//! assert_eq!(result, RawObject::small_int(7));
//! rt.set_global(globals, "answer", result).unwrap();
//! assert_eq!(rt.get_global(globals, "answer").unwrap(), Some(result));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod builtins;
pub mod call;
pub mod config;
pub mod exceptions;
pub mod frame;
pub mod ic;
pub mod interpreter;
pub mod layout;
pub mod mutex;
pub mod operators;
pub mod rewrite;
pub mod runtime;
pub mod thread;
pub mod types;

// Re-export main types at crate root
pub use attributes::Method;
pub use builtins::{float_repr, repr, str_text};
pub use config::RuntimeConfig;
pub use core_types::{ErrorKind, VmError, VmResult};
pub use frame::{BlockKind, Frame, TryBlock, MAX_BLOCK_DEPTH};
pub use ic::{BinaryOpFlags, IC_ENTRIES_PER_CACHE, IC_POINTERS_PER_CACHE};
pub use interpreter::Interpreter;
pub use layout::{AttributeLocation, LayoutInfo};
pub use mutex::{Mutex, MutexId, MutexTable};
pub use rewrite::{rewrite_bytecode, RewriteResult};
pub use runtime::{BuiltinFunction, Runtime};
pub use thread::Thread;
