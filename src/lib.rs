//! filekeep - a single-node authenticated file storage service
//!
//! - `access`: shared-secret check and caller allow-list
//! - `file_store`: confined file operations under one storage root
//! - `observability`: console logger and the durable audit log
//! - `alert`: operator notification for unknown callers
//! - `variable`: the process-wide server variable
//! - `http_server`: HTTP routes, startup and shutdown

pub mod access;
pub mod alert;
pub mod cli;
pub mod config;
pub mod file_store;
pub mod http_server;
pub mod observability;
pub mod variable;
