//! Error types for the CLI

use std::path::PathBuf;

use core_types::VmError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// The program raised or the runtime failed
    #[error("{0}")]
    Vm(#[from] VmError),

    /// A file could not be read
    #[error("could not read '{}': {source}", path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The program description is malformed
    #[error("invalid program: {0}")]
    Program(String),
}

impl CliError {
    /// Exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Vm(_) => 1,
            CliError::Io { .. } | CliError::Program(_) => 2,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Program(err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
