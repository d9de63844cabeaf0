//! Corten Python Runtime CLI
//!
//! Entry point for the bytecode runtime. Parses CLI arguments and
//! delegates to the Runner for execution.

use std::path::Path;

use clap::Parser as ClapParser;
use interpreter::RuntimeConfig;
use py_cli::{format_error, Cli, CliResult, Command, Program, Runner};

fn load_config(path: Option<&Path>, no_cache: bool) -> CliResult<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if no_cache {
        config.cache_enabled = false;
    }
    Ok(config)
}

fn execute(command: Command) -> CliResult<()> {
    match command {
        Command::Run {
            program,
            config,
            no_cache,
            entry,
        } => {
            let config = load_config(config.as_deref(), no_cache)?;
            let program = Program::from_file(&program)?;
            let mut runner = Runner::new(config)?;
            if let Some(result) = runner.run(&program, entry.as_deref())? {
                println!("{}", result);
            }
        }
        Command::Dis { program, rewritten } => {
            let program = Program::from_file(&program)?;
            let mut runner = Runner::new(RuntimeConfig::default())?;
            print!("{}", runner.disassemble(&program, rewritten)?);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = execute(cli.command) {
        eprintln!("{}", format_error(&err));
        std::process::exit(err.exit_code());
    }
}
