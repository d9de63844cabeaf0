//! Runtime error types.
//!
//! Errors are returned, never unwound through the host stack. Python-level
//! exceptions are heap objects owned by the interpreter; [`VmError`] is the
//! host-side description that crosses crate boundaries and reaches the
//! embedder when nothing handles the exception.

use std::fmt;

use thiserror::Error;

/// The class of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong argument arity or type, calling a non-callable
    TypeError,
    /// Malformed encoded data, out-of-range sizes
    ValueError,
    /// A value does not fit a machine size or configured limit
    OverflowError,
    /// Out-of-bounds sequence access
    IndexError,
    /// Missing mapping key
    KeyError,
    /// Malformed external module data
    ImportError,
    /// Truncated external module data
    EOFError,
    /// Missing attribute
    AttributeError,
    /// Missing global or local name
    NameError,
    /// Division or modulo by zero
    ZeroDivisionError,
    /// A deliberately unimplemented capability
    NotImplementedError,
    /// Call depth exceeded
    RecursionError,
    /// Error detected at run time that fits no other class
    RuntimeError,
    /// A program-defined exception with no more specific builtin base
    Exception,
    /// Internal error the program can still observe
    SystemError,
    /// Heap exhaustion; aborts the allocation only
    OutOfMemory,
    /// Unrecoverable invariant violation
    Fatal,
}

impl ErrorKind {
    /// Python-visible name of the error class.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::EOFError => "EOFError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::NameError => "NameError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::NotImplementedError => "NotImplementedError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::Exception => "Exception",
            ErrorKind::SystemError => "SystemError",
            ErrorKind::OutOfMemory => "MemoryError",
            ErrorKind::Fatal => "FatalError",
        }
    }

    /// Whether bytecode exception handlers may observe this error.
    ///
    /// Heap exhaustion and invariant violations go straight to the embedder.
    pub fn is_catchable(self) -> bool {
        !matches!(self, ErrorKind::OutOfMemory | ErrorKind::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One interpreter frame active when an error escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracebackEntry {
    /// Qualified name of the executing function
    pub function: String,
    /// Byte offset of the failing instruction
    pub pc: usize,
}

/// An error with its class, message and the frames it passed through.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, VmError};
///
/// let error = VmError::new(ErrorKind::IndexError, "tuple index out of range");
/// assert_eq!(error.kind, ErrorKind::IndexError);
/// assert!(error.traceback.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct VmError {
    /// The class of error
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Frames the error unwound through, innermost first
    pub traceback: Vec<TracebackEntry>,
}

impl VmError {
    /// Create an error without traceback.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        VmError {
            kind,
            message: message.into(),
            traceback: Vec::new(),
        }
    }

    /// A TypeError.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// A ValueError.
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    /// An OutOfMemory error for a request of `size` bytes.
    pub fn out_of_memory(size: usize) -> Self {
        Self::new(
            ErrorKind::OutOfMemory,
            format!("failed to allocate {} bytes", size),
        )
    }

    /// A fatal invariant violation.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// A capability that is deliberately not implemented.
    pub fn unimplemented(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplementedError, what)
    }

    /// Record a frame the error is passing through.
    pub fn push_frame(&mut self, function: impl Into<String>, pc: usize) {
        self.traceback.push(TracebackEntry {
            function: function.into(),
            pc,
        });
    }
}

/// Result alias used across the runtime.
pub type VmResult<T> = Result<T, VmError>;
