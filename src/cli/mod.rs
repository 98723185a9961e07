//! CLI module for filekeep
//!
//! - init: write a default config and create directories
//! - serve: run the file service

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{init, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};

/// Parse arguments and run the selected command.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}
