//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Corten Python bytecode runtime
#[derive(Debug, Parser)]
#[command(name = "corten-py", version, about = "Run Python bytecode programs described in JSON")]
pub struct Cli {
    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of `corten-py`.
#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Execute a program and print the repr of its result
    Run {
        /// Program description (JSON)
        program: PathBuf,

        /// Runtime configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run without inline caches
        #[arg(long)]
        no_cache: bool,

        /// Global function to call after the module body ran
        #[arg(short, long)]
        entry: Option<String>,
    },
    /// Print the bytecode of a program and its nested code objects
    Dis {
        /// Program description (JSON)
        program: PathBuf,

        /// Show the bytecode after the inline cache rewrite
        #[arg(short, long)]
        rewritten: bool,
    },
}
