//! CLI command implementations

use std::fs;
use std::path::Path;

use super::args::Command;
use super::errors::{CliError, CliResult};
use crate::config::{config_dir, ServiceConfig};
use crate::http_server::HttpServer;
use crate::observability::Logger;

/// Dispatch a parsed command.
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Init { config } => init(&config),
        Command::Serve { config } => serve(&config),
    }
}

/// Write a default config file next to fresh storage and log directories.
///
/// The written file has an empty `api_key`; set it in the file or through
/// `FILEKEEP_API_KEY` before serving.
pub fn init(config_path: &Path) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::already_initialized(config_path));
    }

    let config = ServiceConfig::default();

    // Same anchoring `serve` applies when it loads this file.
    let mut resolved = config.clone();
    resolved.rebase(config_dir(config_path));
    fs::create_dir_all(&resolved.storage_root)?;
    if let Some(log_dir) = resolved.log_file.parent() {
        fs::create_dir_all(log_dir)?;
    }

    let json = serde_json::to_string_pretty(&config)?;
    fs::write(config_path, json + "\n")?;

    Logger::info(
        "CONFIG_WRITTEN",
        &[("path", &config_path.display().to_string())],
    );
    Ok(())
}

/// Load the config and serve until a shutdown signal arrives.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load(config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::start_failed(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(async {
        let server = HttpServer::bootstrap(&config)
            .map_err(|e| CliError::start_failed(format!("Startup failed: {}", e)))?;
        server.start().await.map_err(CliError::from)
    })
}
