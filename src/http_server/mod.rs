//! # filekeep HTTP Server
//!
//! The guarded file service API on axum.

pub mod config;
pub mod errors;
pub mod routes;
pub mod server;
pub mod state;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ErrorResponse};
pub use routes::{API_KEY_HEADER, DEVICE_ID_HEADER};
pub use server::{shutdown_signal, HttpServer};
pub use state::AppState;
