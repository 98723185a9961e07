//! Service configuration
//!
//! Loaded once at startup from a JSON file, then overridden from the
//! environment:
//!
//! - `FILEKEEP_HOST`, `FILEKEEP_PORT`
//! - `FILEKEEP_STORAGE_ROOT`, `FILEKEEP_LOG_FILE`
//! - `FILEKEEP_API_KEY`
//! - `FILEKEEP_SMTP_PASSWORD` (only when an `alert` section exists)
//!
//! Relative `storage_root` and `log_file` values in the file are relative
//! to the file's own directory. Paths from the environment are used as given.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::IdentityMode;
use crate::alert::EmailConfig;
use crate::file_store::ListMode;
use crate::http_server::HttpServerConfig;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How callers are identified and which ones are recognized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub mode: IdentityMode,

    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,
}

fn default_allow_list() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            mode: IdentityMode::default(),
            allow_list: default_allow_list(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(flatten)]
    pub http: HttpServerConfig,

    /// Directory holding stored files (created if absent)
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Durable audit log file
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Shared secret expected in `X-Api-Key`
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub identity: IdentityConfig,

    /// Listing shape; defaults per identity mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_mode: Option<ListMode>,

    /// SMTP alerting; alerts go to the console when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<EmailConfig>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("ServerLogs").join("server_logs.txt")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http: HttpServerConfig::default(),
            storage_root: default_storage_root(),
            log_file: default_log_file(),
            api_key: String::new(),
            identity: IdentityConfig::default(),
            list_mode: None,
            alert: None,
        }
    }
}

impl ServiceConfig {
    /// Load, apply environment overrides, validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`ServiceConfig::load`] with an explicit variable lookup.
    pub fn load_with<F>(path: &Path, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let mut config = Self::from_json(&content)?;
        config.rebase(config_dir(path));
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Anchor relative file paths at `base`.
    pub fn rebase(&mut self, base: &Path) {
        if self.storage_root.is_relative() {
            self.storage_root = base.join(&self.storage_root);
        }
        if self.log_file.is_relative() {
            self.log_file = base.join(&self.log_file);
        }
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `FILEKEEP_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FILEKEEP_HOST") {
            self.http.host = host;
        }
        if let Some(port) = lookup("FILEKEEP_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("FILEKEEP_PORT: '{}'", port)))?;
        }
        if let Some(root) = lookup("FILEKEEP_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(log_file) = lookup("FILEKEEP_LOG_FILE") {
            self.log_file = PathBuf::from(log_file);
        }
        if let Some(key) = lookup("FILEKEEP_API_KEY") {
            self.api_key = key;
        }
        if let Some(password) = lookup("FILEKEEP_SMTP_PASSWORD") {
            if let Some(alert) = self.alert.as_mut() {
                alert.smtp_password = password;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Invalid(
                "api_key must be set (config file or FILEKEEP_API_KEY)".to_string(),
            ));
        }
        if self.http.port == 0 {
            return Err(ConfigError::Invalid("port must be > 0".to_string()));
        }
        if self.http.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be > 0".to_string()));
        }
        if self.identity.allow_list.is_empty() {
            return Err(ConfigError::Invalid(
                "identity.allow_list must name at least one caller".to_string(),
            ));
        }
        if let Some(alert) = &self.alert {
            if alert.to_email.is_empty() || alert.smtp_host.is_empty() {
                return Err(ConfigError::Invalid(
                    "alert requires smtp_host and to_email".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Effective listing shape.
    pub fn list_mode(&self) -> ListMode {
        self.list_mode.unwrap_or(match self.identity.mode {
            IdentityMode::Address => ListMode::Recursive,
            IdentityMode::Token => ListMode::Shallow,
        })
    }

    /// Operator address for alerts.
    pub fn alert_recipient(&self) -> String {
        self.alert
            .as_ref()
            .map(|a| a.to_email.clone())
            .unwrap_or_else(|| "operator".to_string())
    }
}

/// Directory a config file's relative paths are anchored at.
pub fn config_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}
