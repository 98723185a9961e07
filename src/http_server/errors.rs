//! HTTP error mapping.
//!
//! Every failure leaves as `{"error": ..., "code": ...}` with the matching
//! status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::access::AccessError;
use crate::file_store::StoreError;
use crate::variable::VariableError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    /// Body could not be decoded
    #[error("{1}")]
    Rejected(StatusCode, String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let code = match self {
            ApiError::Access(e) => e.status_code(),
            ApiError::Store(e) => e.status_code(),
            ApiError::Variable(e) => e.status_code(),
            ApiError::Rejected(status, _) => return *status,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
