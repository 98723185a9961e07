//! # Access Errors

use thiserror::Error;

use super::identity::CallerIdentity;

/// Result type for access checks
pub type AccessResult<T> = Result<T, AccessError>;

/// Request rejections raised before any route work happens.
#[derive(Debug, Clone, Error)]
pub enum AccessError {
    /// Shared secret missing or wrong
    #[error("Unauthorized")]
    Unauthorized,

    /// Token deployments require an `X-Device-ID` header
    #[error("Device identity not provided")]
    MissingIdentity,

    /// Secret matched but the caller is not on the allow-list
    #[error("{} {} unknown", .0.kind_label(), .0)]
    UnknownCaller(CallerIdentity),
}

impl AccessError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Unauthorized => 401,
            AccessError::MissingIdentity => 400,
            AccessError::UnknownCaller(_) => 403,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AccessError::Unauthorized.status_code(), 401);
        assert_eq!(AccessError::MissingIdentity.status_code(), 400);
        let unknown = AccessError::UnknownCaller(CallerIdentity::Address("10.0.0.9".into()));
        assert_eq!(unknown.status_code(), 403);
        assert_eq!(unknown.to_string(), "IP 10.0.0.9 unknown");
    }
}
