//! # Alert Errors

use thiserror::Error;

/// Result type for alert delivery
pub type AlertResult<T> = Result<T, AlertError>;

/// Outbound notification failures.
///
/// None of these ever reach a client; the dispatcher swallows them.
#[derive(Debug, Clone, Error)]
pub enum AlertError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}
