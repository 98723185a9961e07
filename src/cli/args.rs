//! CLI argument definitions using clap
//!
//! Commands:
//! - filekeep init --config <path>
//! - filekeep serve --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// filekeep - a guarded file storage service
#[derive(Parser, Debug)]
#[command(name = "filekeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file and create the storage directories
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./filekeep.json")]
        config: PathBuf,
    },

    /// Start the file service
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./filekeep.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
